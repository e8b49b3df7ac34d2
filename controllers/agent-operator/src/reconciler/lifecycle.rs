//! Component lifecycle
//!
//! Drives one component Deployment towards its desired form: create when
//! absent, replace when the recorded spec hash differs, delete when disabled.
//! The outcome lands in the component's reconcile condition and summary.

use super::Reconciler;
use crate::component::{deployment_summary, recorded_hash, stamp_hash};
use crate::conditions::{remove_condition, set_bool};
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use cluster_client::{ClusterError, ClusterEvent};
use crds::{AgentStatus, ComponentName};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::ResourceExt;
use tracing::{debug, error, info};

/// What a lifecycle pass did to the Deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Absent,
}

impl Reconciler {
    /// Create or update the desired Deployment of an enabled component
    pub(crate) async fn apply_component(
        &self,
        namespace: &str,
        mut desired: Deployment,
        component: ComponentName,
        reference: &ObjectReference,
        status: &mut AgentStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, ControllerError> {
        let condition = component.reconcile_condition();
        let name = desired.name_any();
        let hash = stamp_hash(&mut desired).map_err(ClusterError::from)?;

        let live = match self.client.get_deployment(namespace, &name).await {
            Ok(live) => live,
            Err(e) => {
                set_bool(&mut status.conditions, condition, false, "GetFailed", &e.to_string(), now);
                return Err(e.into());
            }
        };

        let (transition, result) = match live {
            None => {
                info!("Creating {} Deployment {}/{}", component, namespace, name);
                (Transition::Created, self.client.create_deployment(namespace, &desired).await)
            }
            Some(live) if recorded_hash(&live) == Some(hash.as_str()) => {
                debug!("{} Deployment {}/{} is up to date", component, namespace, name);
                (Transition::Unchanged, Ok(live))
            }
            Some(live) => {
                info!("Updating {} Deployment {}/{}", component, namespace, name);
                desired.metadata.resource_version = live.metadata.resource_version.clone();
                (Transition::Updated, self.client.update_deployment(namespace, &desired).await)
            }
        };

        let (action, verb) = match transition {
            Transition::Created => ("Create", "Created"),
            _ => ("Update", "Updated"),
        };
        let deployment = match result {
            Ok(deployment) => deployment,
            Err(e) => {
                error!("Failed to {} {} Deployment {}/{}: {}", action.to_lowercase(), component, namespace, name, e);
                let reason = format!("{action}Failed");
                set_bool(&mut status.conditions, condition, false, &reason, &e.to_string(), now);
                self.record_event(
                    reference,
                    ClusterEvent::warning(action, format!("{action}DeploymentFailed"), e.to_string()),
                )
                .await;
                return Err(e.into());
            }
        };

        if transition != Transition::Unchanged {
            self.record_event(
                reference,
                ClusterEvent::normal(
                    action,
                    format!("{action}Deployment"),
                    format!("{verb} {component} Deployment {namespace}/{name}"),
                ),
            )
            .await;
        }

        set_bool(&mut status.conditions, condition, true, "", "", now);
        let summary = deployment_summary(&deployment, status.summary(component), now);
        *status.summary_mut(component) = Some(summary);
        Ok(transition)
    }

    /// Tear down the Deployment of a disabled component, if it exists
    pub(crate) async fn disable_component(
        &self,
        namespace: &str,
        agent_name: &str,
        deployment_name: &str,
        component: ComponentName,
        reference: &ObjectReference,
        status: &mut AgentStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, ControllerError> {
        let condition = component.reconcile_condition();
        let transition = match self.client.get_deployment(namespace, deployment_name).await {
            Ok(None) => Transition::Absent,
            Ok(Some(_)) => {
                match self
                    .delete_component(namespace, agent_name, component, deployment_name, reference)
                    .await
                {
                    Ok(true) => Transition::Deleted,
                    Ok(false) => Transition::Absent,
                    Err(e) => {
                        set_bool(&mut status.conditions, condition, false, "DeleteFailed", &e.to_string(), now);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                set_bool(&mut status.conditions, condition, false, "GetFailed", &e.to_string(), now);
                return Err(e.into());
            }
        };

        *status.summary_mut(component) = None;
        remove_condition(&mut status.conditions, condition);
        Ok(transition)
    }
}
