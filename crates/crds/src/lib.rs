//! Agent Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the agent operator:
//! - `Agent`: declares the agent components, their features and user overrides
//! - `PodAutoscaler`: declares an autoscaling policy for a target workload

pub mod agent;
pub mod conditions;
pub mod pod_autoscaler;
pub mod quantity;
pub mod validation;

pub use agent::*;
pub use conditions::*;
pub use pod_autoscaler::*;
pub use validation::ValidationError;

/// API group shared by every CRD of the operator
pub const API_GROUP: &str = "agents.microscaler.io";

/// Container resource list, keyed by resource name (`cpu`, `memory`) with quantity strings as values
pub type ResourceList = std::collections::BTreeMap<String, String>;
