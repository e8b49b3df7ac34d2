//! Component teardown
//!
//! A component Deployment is removed together with the RBAC objects created
//! for it, always in the same order. Objects already gone are skipped.

use super::Reconciler;
use crate::component::{expected_name, rbac_selector, selector_labels};
use crate::error::ControllerError;
use cluster_client::{ClusterError, ClusterEvent, RbacKind};
use crds::{Agent, ComponentName};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::ResourceExt;
use tracing::{debug, info};

/// One step of the teardown of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    Deployment,
    Rbac(RbacKind),
}

/// Teardown order of a component
pub const DELETE_PLAN: [DeleteStep; 4] = [
    DeleteStep::Deployment,
    DeleteStep::Rbac(RbacKind::ServiceAccount),
    DeleteStep::Rbac(RbacKind::Role),
    DeleteStep::Rbac(RbacKind::ClusterRole),
];

impl Reconciler {
    /// Delete the Deployment `deployment_name` of a component and its RBAC objects
    ///
    /// Returns whether the Deployment itself was deleted by this call.
    pub(crate) async fn delete_component(
        &self,
        namespace: &str,
        agent_name: &str,
        component: ComponentName,
        deployment_name: &str,
        reference: &ObjectReference,
    ) -> Result<bool, ControllerError> {
        let selector = rbac_selector(agent_name, component, deployment_name);
        let mut deleted = false;

        for step in DELETE_PLAN {
            let result = match step {
                DeleteStep::Deployment => self.client.delete_deployment(namespace, deployment_name).await,
                DeleteStep::Rbac(kind) => self.client.delete_rbac(kind, namespace, &selector).await,
            };
            match result {
                Ok(()) => {
                    if step == DeleteStep::Deployment {
                        deleted = true;
                    }
                }
                Err(ClusterError::NotFound(_)) => {
                    debug!("{:?} of {}/{} already gone", step, namespace, deployment_name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if deleted {
            info!("Deleted {} Deployment {}/{}", component, namespace, deployment_name);
            self.record_event(
                reference,
                ClusterEvent::normal(
                    "Delete",
                    "DeleteDeployment",
                    format!("Deleted {component} Deployment {namespace}/{deployment_name}"),
                ),
            )
            .await;
        }
        Ok(deleted)
    }

    /// Delete every Deployment of a component that no longer has the expected name
    ///
    /// Returns the names of the deleted Deployments.
    pub(crate) async fn cleanup_stale(
        &self,
        agent: &Agent,
        namespace: &str,
        component: ComponentName,
        reference: &ObjectReference,
    ) -> Result<Vec<String>, ControllerError> {
        let agent_name = agent.name_any();
        let expected = expected_name(agent, component);
        let live = self
            .client
            .list_deployments(namespace, &selector_labels(&agent_name, component))
            .await?;

        let mut removed = Vec::new();
        for deployment in live {
            let name = deployment.name_any();
            if name == expected {
                continue;
            }
            info!(
                "Removing stale {} Deployment {}/{} (expected {})",
                component, namespace, name, expected
            );
            if self
                .delete_component(namespace, &agent_name, component, &name, reference)
                .await?
            {
                removed.push(name);
            }
        }
        Ok(removed)
    }
}
