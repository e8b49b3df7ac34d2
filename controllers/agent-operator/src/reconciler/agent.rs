//! Agent reconciler
//!
//! One pass walks every component in order: the default Deployment is shaped
//! by the feature modules, the override decides whether the component exists
//! and patches it, then the lifecycle and the stale scanner run. A failing
//! component never stops the others.

use super::Reconciler;
use crate::component::{DEFAULT_REGISTRY, new_default_deployment};
use crate::conditions::{remove_condition, set_bool};
use crate::error::ControllerError;
use crate::feature::{self, FeatureModule, PodTemplateManager, RequiredComponents};
use crate::override_resolver::{CONFLICT_REASON, apply_override, resolve};
use chrono::{DateTime, Utc};
use crds::{Agent, AgentStatus, ComponentName, ConditionType};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, warn};

/// Inputs shared by every component of one pass
struct Pass<'a> {
    agent: &'a Agent,
    namespace: &'a str,
    features: &'a [FeatureModule],
    required: RequiredComponents,
    reference: &'a ObjectReference,
    now: DateTime<Utc>,
}

impl Reconciler {
    /// Reconcile an Agent
    pub async fn reconcile_agent(&self, agent: &Agent) -> Result<(), ControllerError> {
        self.reconcile_agent_at(agent, Utc::now()).await
    }

    pub(crate) async fn reconcile_agent_at(&self, agent: &Agent, now: DateTime<Utc>) -> Result<(), ControllerError> {
        let name = agent.name_any();
        let namespace = agent
            .namespace()
            .ok_or_else(|| ControllerError::InvalidConfig(format!("Agent {name} has no namespace")))?;
        info!("Reconciling Agent {}/{}", namespace, name);

        let original = agent.status.clone().unwrap_or_default();
        let mut status = original.clone();

        let features = feature::build_features(&agent.spec);
        let required = feature::required_components(&agent.spec, &features);
        debug!(
            "Agent {}/{}: {} feature(s), required components {:?}",
            namespace,
            name,
            features.len(),
            required
        );
        let reference = agent.object_ref(&());
        let pass = Pass {
            agent,
            namespace: &namespace,
            features: &features,
            required,
            reference: &reference,
            now,
        };

        let mut errors = Vec::new();
        let mut conflicts = Vec::new();
        for component in ComponentName::ALL {
            if let Err(e) = self.reconcile_component(&pass, component, &mut status, &mut conflicts).await {
                error!("Agent {}/{}: {} reconcile failed: {}", namespace, name, component, e);
                errors.push(e);
            }
            match self.cleanup_stale(agent, &namespace, component, &reference).await {
                Ok(removed) if !removed.is_empty() => {
                    info!("Agent {}/{}: removed stale {} Deployment(s) {:?}", namespace, name, component, removed);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Agent {}/{}: {} cleanup failed: {}", namespace, name, component, e);
                    errors.push(e);
                }
            }
        }

        if conflicts.is_empty() {
            remove_condition(&mut status.conditions, ConditionType::OverrideReconcileConflict);
        } else {
            set_bool(
                &mut status.conditions,
                ConditionType::OverrideReconcileConflict,
                true,
                CONFLICT_REASON,
                &conflicts.join("; "),
                now,
            );
        }

        if status != original {
            debug!("Agent {}/{}: writing status", namespace, name);
            self.client
                .patch_agent_status(&namespace, &name, agent.resource_version().as_deref(), &status)
                .await?;
        }

        match errors.iter().position(ControllerError::is_transient) {
            Some(i) => Err(errors.swap_remove(i)),
            None => errors.into_iter().next().map_or(Ok(()), Err),
        }
    }

    async fn reconcile_component(
        &self,
        pass: &Pass<'_>,
        component: ComponentName,
        status: &mut AgentStatus,
        conflicts: &mut Vec<String>,
    ) -> Result<(), ControllerError> {
        let mut desired = new_default_deployment(pass.agent, component);

        if let Some(spec) = desired.spec.as_mut() {
            let mut manager = PodTemplateManager::new(std::mem::take(&mut spec.template));
            let failures = feature::apply(pass.features, component, &mut manager);
            spec.template = manager.into_inner();
            if !failures.is_empty() {
                let err = ControllerError::FeatureAggregate(failures);
                set_bool(
                    &mut status.conditions,
                    component.reconcile_condition(),
                    false,
                    &format!("{component} feature error"),
                    &err.to_string(),
                    pass.now,
                );
                return Err(err);
            }
        }

        let override_ = pass.agent.spec.overrides.get(component);
        let decision = resolve(pass.required.get(component), override_, component);
        if let Some(conflict) = decision.conflict {
            warn!("Agent {}/{}: {}", pass.namespace, pass.agent.name_any(), conflict);
            conflicts.push(conflict);
        }

        if !decision.enabled {
            let deployment_name = desired.name_any();
            let transition = self
                .disable_component(
                    pass.namespace,
                    &pass.agent.name_any(),
                    &deployment_name,
                    component,
                    pass.reference,
                    status,
                    pass.now,
                )
                .await?;
            debug!("{} disabled: {:?}", component, transition);
            return Ok(());
        }

        if let Some(o) = override_ {
            let registry = pass.agent.spec.global.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
            apply_override(&mut desired, o, component, registry);
        }

        let transition = self
            .apply_component(pass.namespace, desired, component, pass.reference, status, pass.now)
            .await?;
        debug!("{} enabled: {:?}", component, transition);
        Ok(())
    }
}
