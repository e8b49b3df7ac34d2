//! ClusterClient trait for mocking
//!
//! This trait abstracts the API server so that reconcile flows can run
//! against an in-memory store in unit tests. The concrete `ClusterClient`
//! implements it with kube, `MockClusterClient` (feature `test-util`) in memory.

use crate::error::ClusterError;
use crate::event::ClusterEvent;
use crds::{AgentStatus, ContainerResources, PodAutoscalerStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ObjectReference;
use std::collections::BTreeMap;
use std::fmt;

/// Label set used both as object labels and as an equality selector
pub type Labels = BTreeMap<String, String>;

/// RBAC object kinds deleted together with a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RbacKind {
    /// core/v1 ServiceAccount
    ServiceAccount,
    /// rbac/v1 Role
    Role,
    /// rbac/v1 ClusterRole
    ClusterRole,
}

impl fmt::Display for RbacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount => f.write_str("ServiceAccount"),
            Self::Role => f.write_str("Role"),
            Self::ClusterRole => f.write_str("ClusterRole"),
        }
    }
}

/// Trait for API server operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Every call is awaited in sequence within one reconcile; timeouts are the
/// implementation's concern.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Deployments
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError>;
    async fn list_deployments(&self, namespace: &str, selector: &Labels) -> Result<Vec<Deployment>, ClusterError>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    /// Replace a Deployment; `metadata.resourceVersion` must carry the observed version
    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    /// Delete a Deployment; absent objects yield `ClusterError::NotFound`
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<(), ClusterError>;
    /// Patch container resources of the pod template and merge template annotations
    async fn patch_deployment_resources(
        &self,
        namespace: &str,
        name: &str,
        resources: &[ContainerResources],
        template_annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError>;

    // RBAC
    /// Delete every object of `kind` matching `selector`; `namespace` is ignored for cluster scoped kinds
    async fn delete_rbac(&self, kind: RbacKind, namespace: &str, selector: &Labels) -> Result<(), ClusterError>;

    // Status
    /// Write an Agent status, conditioned on `resource_version` when given
    async fn patch_agent_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &AgentStatus,
    ) -> Result<(), ClusterError>;
    /// Write a PodAutoscaler status, conditioned on `resource_version` when given
    async fn patch_pod_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &PodAutoscalerStatus,
    ) -> Result<(), ClusterError>;

    // Events
    async fn publish_event(&self, reference: &ObjectReference, event: &ClusterEvent) -> Result<(), ClusterError>;
}

/// Render a label set as a Kubernetes equality selector (`a=b,c=d`)
#[must_use]
pub fn selector_string(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` carry every pair of `selector`
#[must_use]
pub fn matches_selector(labels: Option<&Labels>, selector: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}
