//! PodAutoscaler reconciler
//!
//! A pass validates the policy, observes the target Deployment, fetches the
//! latest recommendation and bounds it. Bounded targets are always recorded in
//! the status; they only reach the Deployment in `Apply` mode.

use super::Reconciler;
use crate::autoscaling::history::{
    append_horizontal_action, record_horizontal_target, record_vertical_action, record_vertical_target,
};
use crate::autoscaling::{bound, bound_containers};
use crate::conditions::{set_bool, set_condition};
use crate::error::ControllerError;
use crate::recommender::{HorizontalRecommendation, Recommendation, VerticalRecommendation};
use chrono::{DateTime, Utc};
use cluster_client::ClusterEvent;
use crds::{
    ApplyMode, ConditionStatus, ConditionType, HorizontalAction, HorizontalTargetStatus, PodAutoscaler,
    PodAutoscalerStatus, UpdateStrategy, VerticalAction, VerticalActionType, VerticalTargetStatus,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Pod template annotation carrying the rolled out recommendation version
pub const ROLLOUT_VERSION_ANNOTATION: &str = "agents.microscaler.io/rollout-version";

/// Recommendation version the pod template was last rolled out with
#[must_use]
pub fn rolled_out_version(deployment: &Deployment) -> Option<&str> {
    deployment
        .spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(ROLLOUT_VERSION_ANNOTATION)
        .map(String::as_str)
}

/// Whether the pod template of `deployment` has a container named `name`
fn has_container(deployment: &Deployment, name: &str) -> bool {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .is_some_and(|pod| pod.containers.iter().any(|c| c.name == name))
}

/// What one autoscaler pass works on
struct Target<'a> {
    autoscaler: &'a PodAutoscaler,
    namespace: &'a str,
    deployment: Deployment,
    reference: ObjectReference,
    now: DateTime<Utc>,
}

impl Target<'_> {
    fn name(&self) -> &str {
        &self.autoscaler.spec.target_ref.name
    }

    fn applies(&self) -> bool {
        self.autoscaler.spec.apply_policy.mode == ApplyMode::Apply
    }
}

impl Reconciler {
    /// Reconcile a PodAutoscaler
    pub async fn reconcile_pod_autoscaler(&self, autoscaler: &PodAutoscaler) -> Result<(), ControllerError> {
        self.reconcile_pod_autoscaler_at(autoscaler, Utc::now()).await
    }

    pub(crate) async fn reconcile_pod_autoscaler_at(
        &self,
        autoscaler: &PodAutoscaler,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let name = autoscaler.name_any();
        let namespace = autoscaler
            .namespace()
            .ok_or_else(|| ControllerError::InvalidConfig(format!("PodAutoscaler {name} has no namespace")))?;
        info!("Reconciling PodAutoscaler {}/{}", namespace, name);

        let original = autoscaler.status.clone().unwrap_or_default();
        let mut status = original.clone();
        let result = self.autoscale(autoscaler, &namespace, &mut status, now).await;

        if status != original {
            debug!("PodAutoscaler {}/{}: writing status", namespace, name);
            self.client
                .patch_pod_autoscaler_status(&namespace, &name, autoscaler.resource_version().as_deref(), &status)
                .await?;
        }
        result
    }

    async fn autoscale(
        &self,
        autoscaler: &PodAutoscaler,
        namespace: &str,
        status: &mut PodAutoscalerStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let name = autoscaler.name_any();

        if let Err(e) = autoscaler.spec.validate() {
            warn!("PodAutoscaler {}/{} has an invalid spec: {}", namespace, name, e);
            let message = e.to_string();
            set_bool(&mut status.conditions, ConditionType::Active, false, "InvalidSpec", &message, now);
            set_bool(
                &mut status.conditions,
                ConditionType::HorizontalAbleToRecommend,
                false,
                "InvalidSpec",
                &message,
                now,
            );
            return Ok(());
        }

        let target_name = &autoscaler.spec.target_ref.name;
        let deployment = match self.client.get_deployment(namespace, target_name).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) => {
                warn!("PodAutoscaler {}/{}: target Deployment {} not found", namespace, name, target_name);
                let message = format!("Deployment {namespace}/{target_name} not found");
                set_bool(&mut status.conditions, ConditionType::Error, true, "TargetNotFound", &message, now);
                set_bool(&mut status.conditions, ConditionType::Active, false, "TargetNotFound", &message, now);
                return Ok(());
            }
            Err(e) => {
                set_bool(&mut status.conditions, ConditionType::Error, true, "TargetUnavailable", &e.to_string(), now);
                return Err(e.into());
            }
        };
        set_condition(&mut status.conditions, ConditionType::Error, ConditionStatus::False, "", "", now, false);
        set_bool(&mut status.conditions, ConditionType::Active, true, "", "", now);

        let current = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        status.current_replicas = Some(current);

        let recommendation = match self.recommender.fetch(namespace, &name).await {
            Ok(Some(recommendation)) => recommendation,
            Ok(None) => {
                debug!("PodAutoscaler {}/{}: no recommendation yet", namespace, name);
                return Ok(());
            }
            Err(e) => {
                error!("PodAutoscaler {}/{}: recommendation fetch failed: {}", namespace, name, e);
                let message = e.to_string();
                for condition in [ConditionType::HorizontalAbleToRecommend, ConditionType::VerticalAbleToRecommend] {
                    set_bool(&mut status.conditions, condition, false, "RecommendationUnavailable", &message, now);
                }
                return if e.is_transient() { Err(e.into()) } else { Ok(()) };
            }
        };

        let target = Target {
            autoscaler,
            namespace,
            deployment,
            reference: autoscaler.object_ref(&()),
            now,
        };
        if let Some(horizontal) = &recommendation.horizontal {
            self.scale_horizontally(&target, &recommendation, horizontal, current, status)
                .await?;
        }
        if let Some(vertical) = &recommendation.vertical {
            self.scale_vertically(&target, &recommendation, vertical, status).await?;
        }
        Ok(())
    }

    async fn scale_horizontally(
        &self,
        target: &Target<'_>,
        recommendation: &Recommendation,
        horizontal: &HorizontalRecommendation,
        current: i32,
        status: &mut PodAutoscalerStatus,
    ) -> Result<(), ControllerError> {
        let now = target.now;
        let spec = &target.autoscaler.spec;
        set_bool(&mut status.conditions, ConditionType::HorizontalAbleToRecommend, true, "", "", now);

        let history = status.horizontal.get_or_insert_with(Default::default);
        let decision = bound(
            horizontal.replicas,
            current,
            &spec.apply_policy,
            spec.constraints.as_ref(),
            &history.last_actions,
            now,
        );
        let recorded = record_horizontal_target(
            history,
            HorizontalTargetStatus {
                source: recommendation.source,
                generated_at: recommendation.generated_at,
                replicas: decision.target,
            },
        );
        if let Err(e) = recorded {
            warn!("{}/{}: ignoring horizontal recommendation: {}", target.namespace, target.name(), e);
            return Ok(());
        }

        match &decision.limited_reason {
            Some(reason) => {
                set_bool(
                    &mut status.conditions,
                    ConditionType::HorizontalScalingLimited,
                    true,
                    "ScalingLimited",
                    reason,
                    now,
                );
            }
            None => {
                set_condition(
                    &mut status.conditions,
                    ConditionType::HorizontalScalingLimited,
                    ConditionStatus::False,
                    "",
                    "",
                    now,
                    false,
                );
            }
        }

        if !target.applies() || decision.target == current {
            debug!(
                "{}/{}: horizontal target {} (current {}), nothing to apply",
                target.namespace,
                target.name(),
                decision.target,
                current
            );
            return Ok(());
        }

        if let Err(e) = self
            .client
            .scale_deployment(target.namespace, target.name(), decision.target)
            .await
        {
            error!("Failed to scale {}/{}: {}", target.namespace, target.name(), e);
            set_bool(
                &mut status.conditions,
                ConditionType::HorizontalAbleToScale,
                false,
                "ScaleFailed",
                &e.to_string(),
                now,
            );
            self.record_event(&target.reference, ClusterEvent::warning("Scale", "ScaleFailed", e.to_string()))
                .await;
            return Err(e.into());
        }

        info!(
            "Scaled {}/{} from {} to {} replicas",
            target.namespace,
            target.name(),
            current,
            decision.target
        );
        status.current_replicas = Some(decision.target);
        let history = status.horizontal.get_or_insert_with(Default::default);
        append_horizontal_action(
            history,
            HorizontalAction {
                time: now,
                from_replicas: current,
                to_replicas: decision.target,
                recommended_replicas: Some(decision.recommended),
                limited_reason: decision.limited_reason.clone(),
            },
        );
        set_bool(&mut status.conditions, ConditionType::HorizontalAbleToScale, true, "", "", now);
        self.record_event(
            &target.reference,
            ClusterEvent::normal(
                "Scale",
                "ScaledTarget",
                format!("Scaled Deployment {} from {current} to {} replicas", target.name(), decision.target),
            ),
        )
        .await;
        Ok(())
    }

    async fn scale_vertically(
        &self,
        target: &Target<'_>,
        recommendation: &Recommendation,
        vertical: &VerticalRecommendation,
        status: &mut PodAutoscalerStatus,
    ) -> Result<(), ControllerError> {
        let now = target.now;
        let spec = &target.autoscaler.spec;
        set_bool(&mut status.conditions, ConditionType::VerticalAbleToRecommend, true, "", "", now);

        let (known, unknown): (Vec<_>, Vec<_>) = vertical
            .containers
            .iter()
            .cloned()
            .partition(|c| has_container(&target.deployment, &c.name));
        if !unknown.is_empty() {
            warn!(
                "{}/{}: recommended containers not in the pod template: {:?}",
                target.namespace,
                target.name(),
                unknown.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
            );
        }

        let decision = bound_containers(&known, spec.constraints.as_ref());
        if !decision.excluded.is_empty() {
            debug!(
                "{}/{}: containers left out of the resize: {:?}",
                target.namespace,
                target.name(),
                decision.excluded
            );
        }

        let rolled_out = rolled_out_version(&target.deployment) == Some(vertical.version.as_str());
        let scaled = target
            .deployment
            .status
            .as_ref()
            .filter(|_| rolled_out)
            .map(|s| s.updated_replicas.unwrap_or(0));

        let history = status.vertical.get_or_insert_with(Default::default);
        let recorded = record_vertical_target(
            history,
            VerticalTargetStatus {
                source: recommendation.source,
                generated_at: recommendation.generated_at,
                version: vertical.version.clone(),
                scaled,
                desired_resources: decision.containers.clone(),
                pod_cpu_request: decision.pod_cpu_request.clone(),
                pod_memory_request: decision.pod_memory_request.clone(),
            },
        );
        if let Err(e) = recorded {
            warn!("{}/{}: ignoring vertical recommendation: {}", target.namespace, target.name(), e);
            return Ok(());
        }

        if !target.applies() {
            return Ok(());
        }
        if spec.apply_policy.update.strategy == UpdateStrategy::Disabled {
            set_bool(
                &mut status.conditions,
                ConditionType::VerticalAbleToApply,
                false,
                "UpdateDisabled",
                "update strategy is Disabled",
                now,
            );
            return Ok(());
        }
        if rolled_out || decision.containers.is_empty() {
            debug!(
                "{}/{}: version {} needs no rollout",
                target.namespace,
                target.name(),
                vertical.version
            );
            return Ok(());
        }

        let annotations = BTreeMap::from([(ROLLOUT_VERSION_ANNOTATION.to_string(), vertical.version.clone())]);
        if let Err(e) = self
            .client
            .patch_deployment_resources(target.namespace, target.name(), &decision.containers, &annotations)
            .await
        {
            error!("Failed to roll out {}/{}: {}", target.namespace, target.name(), e);
            set_bool(
                &mut status.conditions,
                ConditionType::VerticalAbleToApply,
                false,
                "RolloutFailed",
                &e.to_string(),
                now,
            );
            self.record_event(&target.reference, ClusterEvent::warning("Rollout", "RolloutFailed", e.to_string()))
                .await;
            return Err(e.into());
        }

        info!(
            "Triggered rollout of {}/{} for version {}",
            target.namespace,
            target.name(),
            vertical.version
        );
        let history = status.vertical.get_or_insert_with(Default::default);
        record_vertical_action(
            history,
            VerticalAction {
                time: now,
                version: vertical.version.clone(),
                r#type: VerticalActionType::RolloutTriggered,
            },
        );
        set_bool(&mut status.conditions, ConditionType::VerticalAbleToApply, true, "", "", now);
        self.record_event(
            &target.reference,
            ClusterEvent::normal(
                "Rollout",
                "RolloutTriggered",
                format!("Rolled out Deployment {} with version {}", target.name(), vertical.version),
            ),
        )
        .await;
        Ok(())
    }
}
