//! PodAutoscaler spec validation
//!
//! An invalid policy is discarded as a whole, never applied partially.

use crate::pod_autoscaler::{
    Constraints, Objective, ObjectiveType, PodAutoscalerSpec, ScalingPolicy, ScalingStrategy, TargetValue,
    TargetValueType,
};
use crate::quantity;
use std::collections::HashSet;
use thiserror::Error;

/// Longest allowed rule period and stabilization window
pub const MAX_POLICY_SECONDS: i32 = 1800;

/// Validation errors for PodAutoscaler specs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The target reference is unusable
    #[error("invalid targetRef: {0}")]
    TargetRef(String),

    /// A scaling policy is invalid
    #[error("invalid {direction} policy: {reason}")]
    ScalingPolicy {
        /// "scaleUp" or "scaleDown"
        direction: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Constraints are invalid
    #[error("invalid constraints: {0}")]
    Constraints(String),

    /// An objective is invalid
    #[error("invalid objective #{index}: {reason}")]
    Objective {
        /// Position in the objectives list
        index: usize,
        /// What is wrong
        reason: String,
    },
}

impl ScalingPolicy {
    /// Validate the policy for one direction
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ScalingPolicy` when the rule list is empty
    /// (unless the direction is disabled) or a value is out of range.
    pub fn validate(&self, direction: &'static str) -> Result<(), ValidationError> {
        let fail = |reason: String| ValidationError::ScalingPolicy { direction, reason };

        if !(0..=MAX_POLICY_SECONDS).contains(&self.stabilization_window_seconds) {
            return Err(fail(format!(
                "stabilizationWindowSeconds must be within [0, {MAX_POLICY_SECONDS}], got {}",
                self.stabilization_window_seconds
            )));
        }

        if self.rules.is_empty() && self.strategy() != ScalingStrategy::Disabled {
            return Err(fail("at least one rule is required".to_string()));
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.value < 0 {
                return Err(fail(format!("rule #{i}: value must be >= 0, got {}", rule.value)));
            }
            if !(1..=MAX_POLICY_SECONDS).contains(&rule.period_seconds) {
                return Err(fail(format!(
                    "rule #{i}: periodSeconds must be within [1, {MAX_POLICY_SECONDS}], got {}",
                    rule.period_seconds
                )));
            }
        }
        Ok(())
    }
}

impl Constraints {
    /// Validate replica bounds and container constraints
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Constraints` for inverted bounds, duplicate
    /// container entries or unparsable quantities.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let min = self.min_replicas();
        if min < 1 {
            return Err(ValidationError::Constraints(format!("minReplicas must be >= 1, got {min}")));
        }
        if self.max_replicas < min {
            return Err(ValidationError::Constraints(format!(
                "maxReplicas ({}) must be >= minReplicas ({min})",
                self.max_replicas
            )));
        }

        let mut seen = HashSet::new();
        for container in &self.containers {
            if container.name.is_empty() {
                return Err(ValidationError::Constraints("container name must not be empty".to_string()));
            }
            if !seen.insert(container.name.as_str()) {
                return Err(ValidationError::Constraints(format!(
                    "duplicate constraints for container {:?}",
                    container.name
                )));
            }
            let Some(requests) = &container.requests else {
                continue;
            };
            for (resource, min_q) in &requests.min_allowed {
                let min_v = parse(&container.name, min_q)?;
                if let Some(max_q) = requests.max_allowed.get(resource) {
                    let max_v = parse(&container.name, max_q)?;
                    if max_v < min_v {
                        return Err(ValidationError::Constraints(format!(
                            "container {:?}: {resource} maxAllowed ({max_q}) is below minAllowed ({min_q})",
                            container.name
                        )));
                    }
                }
            }
            for max_q in requests.max_allowed.values() {
                parse(&container.name, max_q)?;
            }
        }
        Ok(())
    }
}

fn parse(container: &str, q: &str) -> Result<f64, ValidationError> {
    quantity::parse(q).map_err(|e| ValidationError::Constraints(format!("container {container:?}: {e}")))
}

impl Objective {
    /// Validate that exactly the payload matching the type is set
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Objective` for mismatched payloads or target values.
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        let fail = |reason: &str| ValidationError::Objective {
            index,
            reason: reason.to_string(),
        };
        match (self.r#type, &self.pod_resource, &self.container_resource) {
            (ObjectiveType::PodResource, Some(target), None) => {
                validate_target_value(&target.value).map_err(fail)
            }
            (ObjectiveType::ContainerResource, None, Some(target)) => {
                if target.container.is_empty() {
                    return Err(fail("containerResource.container must not be empty"));
                }
                validate_target_value(&target.value).map_err(fail)
            }
            (ObjectiveType::PodResource, _, _) => Err(fail("type PodResource requires only podResource to be set")),
            (ObjectiveType::ContainerResource, _, _) => {
                Err(fail("type ContainerResource requires only containerResource to be set"))
            }
        }
    }
}

fn validate_target_value(value: &TargetValue) -> Result<(), &'static str> {
    match value.r#type {
        TargetValueType::Utilization => match value.utilization {
            Some(u) if (0..=100).contains(&u) => Ok(()),
            Some(_) => Err("utilization must be within [0, 100]"),
            None => Err("utilization is required for type Utilization"),
        },
    }
}

impl PodAutoscalerSpec {
    /// Validate the whole spec
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_ref.name.is_empty() {
            return Err(ValidationError::TargetRef("name must not be empty".to_string()));
        }
        if self.target_ref.kind != "Deployment" {
            return Err(ValidationError::TargetRef(format!(
                "kind {:?} is not supported, only Deployment",
                self.target_ref.kind
            )));
        }
        if let Some(constraints) = &self.constraints {
            constraints.validate()?;
        }
        if let Some(policy) = &self.apply_policy.scale_up {
            policy.validate("scaleUp")?;
        }
        if let Some(policy) = &self.apply_policy.scale_down {
            policy.validate("scaleDown")?;
        }
        for (i, objective) in self.objectives.iter().enumerate() {
            objective.validate(i)?;
        }
        Ok(())
    }
}
