//! Kubernetes-backed implementation of `ClusterClientTrait`

use crate::cluster_trait::{ClusterClientTrait, Labels, RbacKind, selector_string};
use crate::error::ClusterError;
use crate::event::{ClusterEvent, EventKind};
use crds::{Agent, AgentStatus, ContainerResources, PodAutoscaler, PodAutoscalerStatus};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ObjectReference, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, Role};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::debug;

/// API server client used by the operator
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Create a client publishing events as `controller_name`
    #[must_use]
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Build a merge patch for a status sub-document
///
/// Fields absent from the serialized status are sent as `null` so that
/// cleared sub-records are removed server side. The observed resource
/// version makes the write conditional.
fn status_patch(status: Value, clearable: &[&str], resource_version: Option<&str>) -> Value {
    let mut status = match status {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for key in clearable {
        status.entry((*key).to_string()).or_insert(Value::Null);
    }
    let mut patch = json!({ "status": Value::Object(status) });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

/// Strategic merge patch updating container resources by container name
fn resources_patch(resources: &[ContainerResources], template_annotations: &BTreeMap<String, String>) -> Value {
    let containers: Vec<Value> = resources
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "resources": {
                    "requests": c.requests,
                    "limits": c.limits,
                }
            })
        })
        .collect();
    json!({
        "spec": {
            "template": {
                "metadata": { "annotations": template_annotations },
                "spec": { "containers": containers }
            }
        }
    })
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    async fn list_deployments(&self, namespace: &str, selector: &Labels) -> Result<Vec<Deployment>, ClusterError> {
        let lp = ListParams::default().labels(&selector_string(selector));
        let list = self.deployments(namespace).list(&lp).await?;
        Ok(list.items)
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        Ok(self.deployments(namespace).create(&PostParams::default(), deployment).await?)
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        Ok(self
            .deployments(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await?)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.deployments(namespace).delete(name, &DeleteParams::foreground()).await?;
        Ok(())
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<(), ClusterError> {
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch_scale(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_deployment_resources(
        &self,
        namespace: &str,
        name: &str,
        resources: &[ContainerResources],
        template_annotations: &BTreeMap<String, String>,
    ) -> Result<(), ClusterError> {
        let patch = resources_patch(resources, template_annotations);
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await?;
        Ok(())
    }

    async fn delete_rbac(&self, kind: RbacKind, namespace: &str, selector: &Labels) -> Result<(), ClusterError> {
        let lp = ListParams::default().labels(&selector_string(selector));
        let dp = DeleteParams::default();
        debug!("Deleting {} objects matching {} in {}", kind, selector_string(selector), namespace);
        match kind {
            RbacKind::ServiceAccount => {
                let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
                api.delete_collection(&dp, &lp).await?;
            }
            RbacKind::Role => {
                let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
                api.delete_collection(&dp, &lp).await?;
            }
            RbacKind::ClusterRole => {
                let api: Api<ClusterRole> = Api::all(self.client.clone());
                api.delete_collection(&dp, &lp).await?;
            }
        }
        Ok(())
    }

    async fn patch_agent_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &AgentStatus,
    ) -> Result<(), ClusterError> {
        let api: Api<Agent> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(
            serde_json::to_value(status)?,
            &["conditions", "clusterAgent", "clusterChecksRunner"],
            resource_version,
        );
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn patch_pod_autoscaler_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &PodAutoscalerStatus,
    ) -> Result<(), ClusterError> {
        let api: Api<PodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(
            serde_json::to_value(status)?,
            &["conditions", "vertical", "horizontal", "currentReplicas"],
            resource_version,
        );
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn publish_event(&self, reference: &ObjectReference, event: &ClusterEvent) -> Result<(), ClusterError> {
        let ev = Event {
            type_: match event.kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: event.reason.clone(),
            note: Some(event.note.clone()),
            action: event.action.clone(),
            secondary: None,
        };
        self.recorder.publish(&ev, reference).await?;
        Ok(())
    }
}
