//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! that can be used in unit tests without a running API server. Deployments
//! carry a resource version that is bumped on every write, and updates with a
//! stale version fail with `ClusterError::Conflict` like the real API server.

use crate::cluster_trait::{ClusterClientTrait, Labels, RbacKind, matches_selector};
use crate::error::ClusterError;
use crate::event::ClusterEvent;
use crds::{AgentStatus, ContainerResources, PodAutoscalerStatus};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{ObjectReference, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Operations that can be failed on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetDeployment,
    ListDeployments,
    CreateDeployment,
    UpdateDeployment,
    DeleteDeployment,
    ScaleDeployment,
    PatchDeploymentResources,
    DeleteRbac,
    PatchAgentStatus,
    PatchPodAutoscalerStatus,
    PublishEvent,
}

type Key = (String, String);

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    // In-memory storage
    deployments: Arc<Mutex<HashMap<Key, Deployment>>>,
    agent_statuses: Arc<Mutex<HashMap<Key, AgentStatus>>>,
    pod_autoscaler_statuses: Arc<Mutex<HashMap<Key, PodAutoscalerStatus>>>,
    events: Arc<Mutex<Vec<(String, ClusterEvent)>>>,
    rbac_deletions: Arc<Mutex<Vec<(RbacKind, String, Labels)>>>,
    // Call log, in order
    calls: Arc<Mutex<Vec<(Operation, String)>>>,
    // One-shot failures: operation -> (status code, message)
    failures: Arc<Mutex<HashMap<Operation, Vec<(u16, String)>>>>,
    // Counter for resource versions
    next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create an empty mock client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Deployment to the mock store (for test setup)
    pub fn add_deployment(&self, namespace: &str, mut deployment: Deployment) {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        deployment.metadata.namespace = Some(namespace.to_string());
        deployment.metadata.resource_version = Some(self.next_version());
        self.deployments
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name), deployment);
    }

    /// Set the observed status of a stored Deployment (for test setup)
    pub fn set_deployment_status(&self, namespace: &str, name: &str, status: DeploymentStatus) {
        if let Some(d) = self
            .deployments
            .lock()
            .unwrap()
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            d.status = Some(status);
        }
    }

    /// Get a stored Deployment
    #[must_use]
    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of every stored Deployment in a namespace, sorted
    #[must_use]
    pub fn deployment_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .deployments
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Last Agent status written
    #[must_use]
    pub fn agent_status(&self, namespace: &str, name: &str) -> Option<AgentStatus> {
        self.agent_statuses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Last PodAutoscaler status written
    #[must_use]
    pub fn pod_autoscaler_status(&self, namespace: &str, name: &str) -> Option<PodAutoscalerStatus> {
        self.pod_autoscaler_statuses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Events published so far, with the name of the referenced object
    #[must_use]
    pub fn events(&self) -> Vec<(String, ClusterEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// RBAC deletions requested so far
    #[must_use]
    pub fn rbac_deletions(&self) -> Vec<(RbacKind, String, Labels)> {
        self.rbac_deletions.lock().unwrap().clone()
    }

    /// Number of calls made for an operation
    #[must_use]
    pub fn call_count(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().iter().filter(|(o, _)| *o == op).count()
    }

    /// Targets of the calls made for an operation, in order
    #[must_use]
    pub fn calls_for(&self, op: Operation) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Forget the call log, keeping stored objects
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        self.rbac_deletions.lock().unwrap().clear();
    }

    /// Make the next call of `op` fail with the given API status code
    pub fn fail_next(&self, op: Operation, code: u16, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push((code, message.to_string()));
    }

    /// Generate next resource version
    fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn record(&self, op: Operation, target: String) -> Result<(), ClusterError> {
        self.calls.lock().unwrap().push((op, target));
        let mut failures = self.failures.lock().unwrap();
        if let Some(queue) = failures.get_mut(&op) {
            if !queue.is_empty() {
                let (code, message) = queue.remove(0);
                return Err(ClusterError::from_status(code, message));
            }
        }
        Ok(())
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn to_quantities(list: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if list.is_empty() {
        return None;
    }
    Some(list.iter().map(|(k, v)| (k.clone(), Quantity(v.clone()))).collect())
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError> {
        self.record(Operation::GetDeployment, format!("{namespace}/{name}"))?;
        Ok(self.deployment(namespace, name))
    }

    async fn list_deployments(&self, namespace: &str, selector: &Labels) -> Result<Vec<Deployment>, ClusterError> {
        self.record(Operation::ListDeployments, namespace.to_string())?;
        let mut items: Vec<Deployment> = self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), d)| ns == namespace && matches_selector(d.metadata.labels.as_ref(), selector))
            .map(|(_, d)| d.clone())
            .collect();
        items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(items)
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.record(Operation::CreateDeployment, format!("{namespace}/{name}"))?;
        let mut store = self.deployments.lock().unwrap();
        if store.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::from_status(409, format!("deployments \"{name}\" already exists")));
        }
        let mut created = deployment.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(self.next_version());
        store.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.record(Operation::UpdateDeployment, format!("{namespace}/{name}"))?;
        let mut store = self.deployments.lock().unwrap();
        let Some(live) = store.get(&key(namespace, &name)) else {
            return Err(ClusterError::from_status(404, format!("deployments \"{name}\" not found")));
        };
        if deployment.metadata.resource_version.is_some()
            && deployment.metadata.resource_version != live.metadata.resource_version
        {
            return Err(ClusterError::from_status(
                409,
                format!("the object has been modified; please apply your changes to the latest version of \"{name}\""),
            ));
        }
        let mut updated = deployment.clone();
        updated.metadata.namespace = Some(namespace.to_string());
        updated.metadata.resource_version = Some(self.next_version());
        updated.status = live.status.clone();
        store.insert(key(namespace, &name), updated.clone());
        Ok(updated)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record(Operation::DeleteDeployment, format!("{namespace}/{name}"))?;
        match self.deployments.lock().unwrap().remove(&key(namespace, name)) {
            Some(_) => Ok(()),
            None => Err(ClusterError::from_status(404, format!("deployments \"{name}\" not found"))),
        }
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<(), ClusterError> {
        self.record(Operation::ScaleDeployment, format!("{namespace}/{name}={replicas}"))?;
        let version = self.next_version();
        let mut store = self.deployments.lock().unwrap();
        let Some(d) = store.get_mut(&key(namespace, name)) else {
            return Err(ClusterError::from_status(404, format!("deployments \"{name}\" not found")));
        };
        d.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        d.metadata.resource_version = Some(version);
        Ok(())
    }

    async fn patch_deployment_resources(
        &self,
        namespace: &str,
        name: &str,
        resources: &[ContainerResources],
        template_annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        self.record(Operation::PatchDeploymentResources, format!("{namespace}/{name}"))?;
        let version = self.next_version();
        let mut store = self.deployments.lock().unwrap();
        let Some(d) = store.get_mut(&key(namespace, name)) else {
            return Err(ClusterError::from_status(404, format!("deployments \"{name}\" not found")));
        };
        let template = &mut d.spec.get_or_insert_with(Default::default).template;
        // A strategic merge would insert unknown names as containers without an image
        let known = |n: &str| template.spec.as_ref().is_some_and(|s| s.containers.iter().any(|c| c.name == n));
        if let Some(unknown) = resources.iter().find(|r| !known(&r.name)) {
            return Err(ClusterError::from_status(
                422,
                format!("spec.template.spec.containers[{}].image: Required value", unknown.name),
            ));
        }
        template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(template_annotations.clone());
        if let Some(pod_spec) = template.spec.as_mut() {
            for container in &mut pod_spec.containers {
                if let Some(r) = resources.iter().find(|r| r.name == container.name) {
                    container.resources = Some(ResourceRequirements {
                        requests: to_quantities(&r.requests),
                        limits: to_quantities(&r.limits),
                        ..Default::default()
                    });
                }
            }
        }
        d.metadata.resource_version = Some(version);
        Ok(())
    }

    async fn delete_rbac(&self, kind: RbacKind, namespace: &str, selector: &Labels) -> Result<(), ClusterError> {
        self.record(Operation::DeleteRbac, format!("{kind}/{namespace}"))?;
        self.rbac_deletions
            .lock()
            .unwrap()
            .push((kind, namespace.to_string(), selector.clone()));
        Ok(())
    }

    async fn patch_agent_status(
        &self,
        namespace: &str,
        name: &str,
        _resource_version: Option<&str>,
        status: &AgentStatus,
    ) -> Result<(), ClusterError> {
        self.record(Operation::PatchAgentStatus, format!("{namespace}/{name}"))?;
        self.agent_statuses
            .lock()
            .unwrap()
            .insert(key(namespace, name), status.clone());
        Ok(())
    }

    async fn patch_pod_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        _resource_version: Option<&str>,
        status: &PodAutoscalerStatus,
    ) -> Result<(), ClusterError> {
        self.record(Operation::PatchPodAutoscalerStatus, format!("{namespace}/{name}"))?;
        self.pod_autoscaler_statuses
            .lock()
            .unwrap()
            .insert(key(namespace, name), status.clone());
        Ok(())
    }

    async fn publish_event(&self, reference: &ObjectReference, event: &ClusterEvent) -> Result<(), ClusterError> {
        let name = reference.name.clone().unwrap_or_default();
        self.record(Operation::PublishEvent, name.clone())?;
        self.events.lock().unwrap().push((name, event.clone()));
        Ok(())
    }
}
