//! PodAutoscaler CRD
//!
//! Declares an autoscaling policy for a target workload. Recommendations are
//! produced upstream; the operator bounds them by the policy below and keeps an
//! auditable history of what it applied in the status.

use crate::conditions::Condition;
use crate::ResourceList;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of horizontal actions kept in the status
pub const MAX_HORIZONTAL_ACTIONS: usize = 20;

/// Wildcard container name in container constraints
pub const WILDCARD_CONTAINER: &str = "*";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "agents.microscaler.io",
    version = "v1alpha1",
    kind = "PodAutoscaler",
    namespaced,
    status = "PodAutoscalerStatus",
    shortname = "dpa"
)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerSpec {
    /// Workload to scale
    pub target_ref: TargetRef,

    /// Source of truth for this object
    #[serde(default)]
    pub owner: Owner,

    /// How recommendations are applied to the target
    #[serde(default)]
    pub apply_policy: ApplyPolicy,

    /// Bounds that must always be respected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,

    /// Objectives to reach and maintain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
}

/// Reference to the scaled workload
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// API version of the target (e.g. "apps/v1")
    #[serde(default)]
    pub api_version: String,

    /// Kind of the target, only "Deployment" is handled
    pub kind: String,

    /// Name of the target in the autoscaler namespace
    pub name: String,
}

/// Owner of the PodAutoscaler object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum Owner {
    /// Managed in the cluster
    #[default]
    Local,
    /// Managed by the remote backend
    Remote,
}

/// Apply mode of recommendations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Recommendations are applied to the target
    #[default]
    Apply,
    /// Recommendations are only recorded in the status
    Preview,
}

/// Update strategy for resource changes requiring a rollout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
    /// Roll out the target when resources change
    #[default]
    Auto,
    /// Never roll out the target
    Disabled,
}

/// Update policy of the target
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    /// Update strategy
    #[serde(default)]
    pub strategy: UpdateStrategy,
}

/// How recommendations are applied
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPolicy {
    /// Apply or only preview
    #[serde(default)]
    pub mode: ApplyMode,

    /// Update policy for vertical changes
    #[serde(default)]
    pub update: UpdatePolicy,

    /// Policy when scaling up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_up: Option<ScalingPolicy>,

    /// Policy when scaling down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down: Option<ScalingPolicy>,
}

/// Selects which rule wins when several are eligible
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ScalingStrategy {
    /// Rule allowing the largest change
    #[default]
    Max,
    /// Rule allowing the smallest change
    Min,
    /// No scaling in this direction
    Disabled,
}

impl fmt::Display for ScalingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("Max"),
            Self::Min => f.write_str("Min"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Rate limiting policy for one scaling direction
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingPolicy {
    /// Strategy, Max when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ScalingStrategy>,

    /// Candidate rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ScalingRule>,

    /// Lookback at previous recommendations before applying a new one (0..=1800)
    #[serde(default)]
    pub stabilization_window_seconds: i32,
}

impl ScalingPolicy {
    /// Effective strategy
    #[must_use]
    pub fn strategy(&self) -> ScalingStrategy {
        self.strategy.unwrap_or_default()
    }
}

/// Interpretation of a rule value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ScalingRuleType {
    /// Absolute number of pods
    Pods,
    /// Percentage of the current replicas
    Percent,
}

impl fmt::Display for ScalingRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pods => f.write_str("Pods"),
            Self::Percent => f.write_str("Percent"),
        }
    }
}

/// A permitted change over a period
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRule {
    /// Rule type
    pub r#type: ScalingRuleType,

    /// Amount of change permitted, 0 prevents scaling
    pub value: i32,

    /// Period the rule holds for (1..=1800)
    pub period_seconds: i32,
}

/// Objective kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ObjectiveType {
    /// Pod level resource target
    PodResource,
    /// Container level resource target
    ContainerResource,
}

/// An objective to reach for the target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    /// Objective kind
    pub r#type: ObjectiveType,

    /// Set when type is PodResource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_resource: Option<ResourceTarget>,

    /// Set when type is ContainerResource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_resource: Option<ContainerResourceTarget>,
}

/// Pod level resource target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTarget {
    /// Resource name (cpu, memory)
    pub name: String,

    /// Target value
    pub value: TargetValue,
}

/// Container level resource target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourceTarget {
    /// Resource name (cpu, memory)
    pub name: String,

    /// Target value
    pub value: TargetValue,

    /// Container name
    pub container: String,
}

/// How a target value is expressed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum TargetValueType {
    /// Percentage of the requested resource
    Utilization,
}

/// Target value
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetValue {
    /// Value kind
    pub r#type: TargetValueType,

    /// Utilization percentage (0..=100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<i32>,
}

/// Constraints that must always be respected
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    /// Lower replica bound, at least 1 (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Upper replica bound
    pub max_replicas: i32,

    /// Per-container resource bounds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerConstraints>,
}

impl Constraints {
    /// Effective lower replica bound
    #[must_use]
    pub fn min_replicas(&self) -> i32 {
        self.min_replicas.unwrap_or(1)
    }
}

/// Resource bounds of one container, or of every container for "*"
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConstraints {
    /// Container name, "*" matches any container
    pub name: String,

    /// Whether the container may be resized (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Request bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ContainerResourceConstraints>,
}

impl ContainerConstraints {
    /// Whether resizing is enabled for the matched containers
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Request bounds
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourceConstraints {
    /// Lower bound per resource
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub min_allowed: ResourceList,

    /// Upper bound per resource
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub max_allowed: ResourceList,
}

/// Observed state of the PodAutoscaler
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerStatus {
    /// Vertical scaling state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<VerticalStatus>,

    /// Horizontal scaling state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HorizontalStatus>,

    /// Replicas of the target observed during the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_replicas: Option<i32>,

    /// Conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Origin of a target value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ValueSource {
    /// Produced by the autoscaling backend
    #[default]
    Autoscaling,
    /// Set manually by a user
    Manual,
    /// Computed locally in the cluster
    Local,
}

/// Horizontal scaling state
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalStatus {
    /// Last recorded target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<HorizontalTargetStatus>,

    /// Most recent actions, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_actions: Vec<HorizontalAction>,
}

/// Recorded horizontal target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalTargetStatus {
    /// Origin of the value
    pub source: ValueSource,

    /// When the recommendation was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    /// Desired replicas
    #[serde(rename = "desiredReplicas")]
    pub replicas: i32,
}

/// One applied horizontal change
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalAction {
    /// When the action was taken
    pub time: DateTime<Utc>,

    /// Replicas before the action
    #[serde(rename = "replicas")]
    pub from_replicas: i32,

    /// Replicas after the action
    pub to_replicas: i32,

    /// Replicas allowed by the rules, before min/max clamping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_replicas: Option<i32>,

    /// Why the applied value differs from the raw recommendation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limited_reason: Option<String>,
}

/// Vertical scaling state
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalStatus {
    /// Last recorded target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<VerticalTargetStatus>,

    /// Last rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<VerticalAction>,
}

/// Recorded vertical target
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalTargetStatus {
    /// Origin of the value
    pub source: ValueSource,

    /// When the recommendation was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    /// Version of the recommendation
    pub version: String,

    /// Pods already running the version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaled: Option<i32>,

    /// Bounded resources per container
    #[serde(default)]
    pub desired_resources: Vec<ContainerResources>,

    /// Sum of the CPU requests of one pod
    #[serde(rename = "podCPURequest")]
    pub pod_cpu_request: String,

    /// Sum of the memory requests of one pod
    #[serde(rename = "podMemoryRequest")]
    pub pod_memory_request: String,
}

/// Vertical action kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum VerticalActionType {
    /// A rollout of the target was triggered
    RolloutTriggered,
}

/// One applied vertical change
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerticalAction {
    /// When the action was taken
    pub time: DateTime<Utc>,

    /// Version rolled out
    pub version: String,

    /// Action kind
    pub r#type: VerticalActionType,
}

/// Resources of one container
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    /// Container name
    pub name: String,

    /// Limits
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub limits: ResourceList,

    /// Requests
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub requests: ResourceList,
}
