//! Status conditions shared by the Agent and PodAutoscaler CRDs
//!
//! The condition type set is closed: producers pick one of the
//! `ConditionType` variants, they never invent new identifiers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type identifiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// A global error was encountered while processing the resource
    Error,
    /// The PodAutoscaler can be used for autoscaling
    Active,
    /// A horizontal recommendation can be received
    HorizontalAbleToRecommend,
    /// Horizontal scaling is working correctly
    HorizontalAbleToScale,
    /// Horizontal scaling is limited by constraints
    HorizontalScalingLimited,
    /// A vertical recommendation can be received
    VerticalAbleToRecommend,
    /// The target can be rolled out to pick up new resources
    VerticalAbleToApply,
    /// Outcome of the last cluster-agent reconcile
    ClusterAgentReconcile,
    /// Outcome of the last cluster-checks-runner reconcile
    ClusterChecksRunnerReconcile,
    /// A user override superseded the computed component requirements
    OverrideReconcileConflict,
}

impl ConditionType {
    /// Wire representation of the condition type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Active => "Active",
            Self::HorizontalAbleToRecommend => "HorizontalAbleToRecommend",
            Self::HorizontalAbleToScale => "HorizontalAbleToScale",
            Self::HorizontalScalingLimited => "HorizontalScalingLimited",
            Self::VerticalAbleToRecommend => "VerticalAbleToRecommend",
            Self::VerticalAbleToApply => "VerticalAbleToApply",
            Self::ClusterAgentReconcile => "ClusterAgentReconcile",
            Self::ClusterChecksRunnerReconcile => "ClusterChecksRunnerReconcile",
            Self::OverrideReconcileConflict => "OverrideReconcileConflict",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a condition: True, False or Unknown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The controller cannot tell
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// A single observation about the resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Last time the condition transitioned from one status to another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// The reason for the condition's last transition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// A human readable message indicating details about the transition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}
