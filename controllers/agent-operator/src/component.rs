//! Generated component workloads
//!
//! Naming, labelling and hashing of the Deployments the operator owns, and
//! the summary written back to the Agent status.

use chrono::{DateTime, Utc};
use cluster_client::Labels;
use crds::{Agent, ComponentName, DeploymentState, DeploymentSummary};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Component label key
pub const COMPONENT_LABEL: &str = "agents.microscaler.io/component";
/// `app.kubernetes.io/managed-by` key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of the managed-by label on every generated object
pub const MANAGED_BY: &str = "agent-operator";
/// `app.kubernetes.io/instance` key, carries the Agent name
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
/// `app.kubernetes.io/part-of` key
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
/// `app.kubernetes.io/name` key, carries the workload name
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Hash of the desired template, compared to decide on updates
pub const SPEC_HASH_ANNOTATION: &str = "agents.microscaler.io/spec-hash";

/// Registry used when `global.registry` is unset
pub const DEFAULT_REGISTRY: &str = "gcr.io/datadoghq";
/// Default image tag of the components
pub const DEFAULT_TAG: &str = "7.60.0";

const AUTH_TOKEN_PATH: &str = "/etc/datadog-agent/auth/token";

/// Image name of a component, without registry or tag
#[must_use]
pub fn default_image_name(component: ComponentName) -> &'static str {
    match component {
        ComponentName::ClusterAgent => "cluster-agent",
        ComponentName::ClusterChecksRunner => "agent",
    }
}

/// Container name of a component
#[must_use]
pub fn container_name(component: ComponentName) -> &'static str {
    component.label_value()
}

/// Name of the Deployment a component should have right now
#[must_use]
pub fn expected_name(agent: &Agent, component: ComponentName) -> String {
    agent
        .spec
        .overrides
        .get(component)
        .and_then(|o| o.name_override())
        .map_or_else(
            || format!("{}-{}", agent.name_any(), component.label_value()),
            ToString::to_string,
        )
}

/// Labels shared by every Deployment ever generated for a component of an Agent
#[must_use]
pub fn selector_labels(agent_name: &str, component: ComponentName) -> Labels {
    Labels::from([
        (COMPONENT_LABEL.to_string(), component.label_value().to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
        (INSTANCE_LABEL.to_string(), agent_name.to_string()),
    ])
}

/// Selector of the RBAC objects belonging to one generated Deployment
#[must_use]
pub fn rbac_selector(agent_name: &str, component: ComponentName, deployment_name: &str) -> Labels {
    let mut labels = selector_labels(agent_name, component);
    labels.insert(NAME_LABEL.to_string(), deployment_name.to_string());
    labels
}

/// Build the Deployment of a component before features and overrides
#[must_use]
pub fn new_default_deployment(agent: &Agent, component: ComponentName) -> Deployment {
    let agent_name = agent.name_any();
    let namespace = agent.namespace().unwrap_or_default();
    let name = expected_name(agent, component);

    let mut labels = rbac_selector(&agent_name, component, &name);
    labels.insert(PART_OF_LABEL.to_string(), MANAGED_BY.to_string());
    let match_labels = rbac_selector(&agent_name, component, &name);

    let registry = agent.spec.global.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
    let image = format!("{registry}/{}:{DEFAULT_TAG}", default_image_name(component));

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: agent.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(match_labels),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(name),
                    containers: vec![Container {
                        name: container_name(component).to_string(),
                        image: Some(image),
                        env: Some(base_env(agent, component, &namespace)),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn base_env(agent: &Agent, component: ComponentName, namespace: &str) -> Vec<EnvVar> {
    let literal = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    };

    let mut env = Vec::new();
    if let Some(cluster_name) = &agent.spec.global.cluster_name {
        env.push(literal("DD_CLUSTER_NAME", cluster_name));
    }
    if let Some(site) = &agent.spec.global.site {
        env.push(literal("DD_SITE", site));
    }
    env.push(literal("DD_KUBE_RESOURCES_NAMESPACE", namespace));
    env.push(EnvVar {
        name: "DD_POD_NAME".to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: None,
                field_path: "metadata.name".to_string(),
            }),
            ..Default::default()
        }),
    });
    env.push(literal("DD_AUTH_TOKEN_FILE_PATH", AUTH_TOKEN_PATH));

    if component == ComponentName::ClusterChecksRunner {
        env.push(literal("DD_CLUSTER_AGENT_ENABLED", "true"));
        env.push(literal(
            "DD_CLUSTER_AGENT_KUBERNETES_SERVICE_NAME",
            &expected_name(agent, ComponentName::ClusterAgent),
        ));
    }
    env
}

/// SHA-256 of the Deployment spec, labels and annotations (hash annotation excluded)
///
/// # Errors
///
/// Returns a serialization error if the Deployment cannot be encoded.
pub fn spec_hash(deployment: &Deployment) -> Result<String, serde_json::Error> {
    let mut annotations = deployment.metadata.annotations.clone().unwrap_or_default();
    annotations.remove(SPEC_HASH_ANNOTATION);
    let input = serde_json::to_vec(&serde_json::json!({
        "spec": deployment.spec,
        "labels": deployment.metadata.labels,
        "annotations": annotations,
    }))?;
    Ok(format!("{:x}", Sha256::digest(&input)))
}

/// Compute the hash and store it in the hash annotation
///
/// # Errors
///
/// Returns a serialization error if the Deployment cannot be encoded.
pub fn stamp_hash(deployment: &mut Deployment) -> Result<String, serde_json::Error> {
    let hash = spec_hash(deployment)?;
    deployment
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(SPEC_HASH_ANNOTATION.to_string(), hash.clone());
    Ok(hash)
}

/// Hash recorded on a live Deployment
#[must_use]
pub fn recorded_hash(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()?
        .get(SPEC_HASH_ANNOTATION)
        .map(String::as_str)
}

/// Summarize a live Deployment for the Agent status
///
/// `last_update` only moves when the summary changed.
#[must_use]
pub fn deployment_summary(
    deployment: &Deployment,
    previous: Option<&DeploymentSummary>,
    now: DateTime<Utc>,
) -> DeploymentSummary {
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let status = deployment.status.clone().unwrap_or_default();
    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);

    let state = if status.replicas.unwrap_or(0) == 0 && ready == 0 {
        DeploymentState::Progressing
    } else if ready == 0 && desired > 0 {
        DeploymentState::Failed
    } else if updated < desired || ready < desired {
        DeploymentState::Updating
    } else {
        DeploymentState::Running
    };
    let state_name = match state {
        DeploymentState::Progressing => "Progressing",
        DeploymentState::Updating => "Updating",
        DeploymentState::Running => "Running",
        DeploymentState::Failed => "Failed",
    };

    let mut summary = DeploymentSummary {
        deployment_name: deployment.name_any(),
        replicas: status.replicas.unwrap_or(0),
        ready_replicas: ready,
        available_replicas: status.available_replicas.unwrap_or(0),
        updated_replicas: updated,
        unavailable_replicas: status.unavailable_replicas.unwrap_or(0),
        state,
        status: format!("{state_name} ({desired}/{ready}/{updated})"),
        current_hash: recorded_hash(deployment).map(ToString::to_string),
        last_update: None,
    };

    summary.last_update = previous.and_then(|prev| prev.last_update);
    if previous != Some(&summary) {
        summary.last_update = Some(now);
    }
    summary
}
