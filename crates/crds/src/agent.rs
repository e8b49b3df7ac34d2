//! Agent Custom Resource Definition
//!
//! Declares the agent components managed by the operator, the features
//! that shape their pod templates, and per-component user overrides.

use crate::conditions::{Condition, ConditionType};
use crate::ResourceList;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// AgentSpec defines the desired state of the agent deployment
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "agents.microscaler.io",
    version = "v1alpha1",
    kind = "Agent",
    namespaced,
    status = "AgentStatus",
    shortname = "agent"
)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Settings applied to every component
    #[serde(default)]
    pub global: GlobalConfig,

    /// Optional features
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Per-component overrides, applied on top of feature output
    #[serde(default, rename = "override")]
    pub overrides: Overrides,
}

/// Settings applied to every component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Cluster name reported by the agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Intake site (e.g. "datadoghq.eu")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Image registry used for every component image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Log level of the agent processes (trace, debug, info, warn, error, critical, off)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Whether the cluster agent is wanted at all (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_agent_enabled: Option<bool>,
}

/// Optional features of the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesConfig {
    /// Log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection: Option<LogCollectionFeatureConfig>,

    /// External metrics server used by autoscaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_metrics_server: Option<ExternalMetricsFeatureConfig>,

    /// Cluster checks dispatching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks: Option<ClusterChecksFeatureConfig>,

    /// DogStatsD intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dogstatsd: Option<DogstatsdFeatureConfig>,
}

/// Log collection feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectionFeatureConfig {
    /// Enable log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Collect logs from every container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_collect_all: Option<bool>,
}

/// External metrics server feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricsFeatureConfig {
    /// Enable the external metrics server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Port served by the cluster agent (defaults to 8443)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Cluster checks feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterChecksFeatureConfig {
    /// Enable cluster checks dispatching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Run dispatched checks in dedicated cluster checks runners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cluster_checks_runners: Option<bool>,
}

/// DogStatsD feature
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DogstatsdFeatureConfig {
    /// Enable the DogStatsD port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Expose the port on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port_enabled: Option<bool>,

    /// Host port (defaults to 8125)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,
}

/// Components managed as independent workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentName {
    /// The cluster agent Deployment
    ClusterAgent,
    /// The cluster checks runner Deployment
    ClusterChecksRunner,
}

impl ComponentName {
    /// Every component, in reconcile order
    pub const ALL: [ComponentName; 2] = [ComponentName::ClusterAgent, ComponentName::ClusterChecksRunner];

    /// Value of the component label and workload name suffix
    #[must_use]
    pub fn label_value(self) -> &'static str {
        match self {
            Self::ClusterAgent => "cluster-agent",
            Self::ClusterChecksRunner => "cluster-checks-runner",
        }
    }

    /// Condition type carrying the outcome of this component's reconcile
    #[must_use]
    pub fn reconcile_condition(self) -> ConditionType {
        match self {
            Self::ClusterAgent => ConditionType::ClusterAgentReconcile,
            Self::ClusterChecksRunner => ConditionType::ClusterChecksRunnerReconcile,
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterAgent => f.write_str("ClusterAgent"),
            Self::ClusterChecksRunner => f.write_str("ClusterChecksRunner"),
        }
    }
}

/// One optional override slot per component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    /// Override for the cluster agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_agent: Option<ComponentOverride>,

    /// Override for the cluster checks runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks_runner: Option<ComponentOverride>,
}

impl Overrides {
    /// Override slot for a component
    #[must_use]
    pub fn get(&self, component: ComponentName) -> Option<&ComponentOverride> {
        match component {
            ComponentName::ClusterAgent => self.cluster_agent.as_ref(),
            ComponentName::ClusterChecksRunner => self.cluster_checks_runner.as_ref(),
        }
    }
}

/// User patch for one component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOverride {
    /// Disable the component regardless of feature requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Workload name (replaces the generated one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageOverride>,

    /// Environment variables added to every container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarOverride>,

    /// Extra pod labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Per-container patches, keyed by container name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, ContainerOverride>,

    /// Node selector of the pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Priority class of the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Service account of the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

impl ComponentOverride {
    /// Whether the override disables its component
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// Non-empty name override, if any
    #[must_use]
    pub fn name_override(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Image override
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverride {
    /// Image name, or full reference when it contains a ':'
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Environment variable
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarOverride {
    /// Variable name
    pub name: String,

    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// Patch for one container
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverride {
    /// Environment variables added to the container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarOverride>,

    /// Resource requirements of the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsOverride>,

    /// Container arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

/// Resource requirements
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsOverride {
    /// Resource limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: ResourceList,

    /// Resource requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: ResourceList,
}

/// AgentStatus defines the observed state of the agent deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Cluster agent workload summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_agent: Option<DeploymentSummary>,

    /// Cluster checks runner workload summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks_runner: Option<DeploymentSummary>,
}

impl AgentStatus {
    /// Mutable summary slot for a component
    pub fn summary_mut(&mut self, component: ComponentName) -> &mut Option<DeploymentSummary> {
        match component {
            ComponentName::ClusterAgent => &mut self.cluster_agent,
            ComponentName::ClusterChecksRunner => &mut self.cluster_checks_runner,
        }
    }

    /// Summary of a component, if it is deployed
    #[must_use]
    pub fn summary(&self, component: ComponentName) -> Option<&DeploymentSummary> {
        match component {
            ComponentName::ClusterAgent => self.cluster_agent.as_ref(),
            ComponentName::ClusterChecksRunner => self.cluster_checks_runner.as_ref(),
        }
    }
}

/// Observed state of a component Deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    /// Name of the Deployment
    pub deployment_name: String,

    /// Total number of pods targeted by the Deployment
    #[serde(default)]
    pub replicas: i32,

    /// Pods with a Ready condition
    #[serde(default)]
    pub ready_replicas: i32,

    /// Pods available for at least minReadySeconds
    #[serde(default)]
    pub available_replicas: i32,

    /// Pods running the latest template
    #[serde(default)]
    pub updated_replicas: i32,

    /// Pods still unavailable
    #[serde(default)]
    pub unavailable_replicas: i32,

    /// Coarse workload state
    #[serde(default)]
    pub state: DeploymentState,

    /// Human readable "State (desired/ready/updated)"
    #[serde(default)]
    pub status: String,

    /// Spec hash of the running template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,

    /// Last time the summary changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Coarse state of a component Deployment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum DeploymentState {
    /// Created, pods not yet scheduled
    #[default]
    Progressing,
    /// Pods rolling to a new template
    Updating,
    /// Every desired pod ready
    Running,
    /// No pod ready although some are desired
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_field_name_on_the_wire() {
        let spec: AgentSpec = serde_json::from_value(serde_json::json!({
            "override": {
                "clusterAgent": { "disabled": true, "name": "custom-dca" }
            }
        }))
        .unwrap();
        let dca = spec.overrides.get(ComponentName::ClusterAgent).unwrap();
        assert!(dca.is_disabled());
        assert_eq!(dca.name_override(), Some("custom-dca"));
        assert!(spec.overrides.get(ComponentName::ClusterChecksRunner).is_none());
    }

    #[test]
    fn test_empty_name_override_is_ignored() {
        let o = ComponentOverride {
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(o.name_override(), None);
        assert!(!o.is_disabled());
    }

    #[test]
    fn test_component_label_values() {
        assert_eq!(ComponentName::ClusterAgent.label_value(), "cluster-agent");
        assert_eq!(ComponentName::ClusterChecksRunner.label_value(), "cluster-checks-runner");
        assert_eq!(
            ComponentName::ClusterAgent.reconcile_condition(),
            ConditionType::ClusterAgentReconcile
        );
    }
}
