//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::config::ControllerConfig;
use crate::reconciler::Reconciler;
use crate::recommender::{HorizontalRecommendation, Recommendation, StaticRecommendationProvider, VerticalRecommendation};
use chrono::{DateTime, TimeZone, Utc};
use cluster_client::MockClusterClient;
use crds::*;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

/// Fixed reference time of the tests
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Pod template with one empty container
pub fn template_with_container(name: &str) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: None,
        spec: Some(PodSpec {
            containers: vec![Container {
                name: name.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

/// Helper to create test Agent CRD
pub fn create_test_agent(name: &str, namespace: &str) -> Agent {
    Agent {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: AgentSpec::default(),
        status: None,
    }
}

/// Helper to create test PodAutoscaler CRD targeting a Deployment
pub fn create_test_pod_autoscaler(name: &str, namespace: &str, target: &str) -> PodAutoscaler {
    PodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: PodAutoscalerSpec {
            target_ref: TargetRef {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: target.to_string(),
            },
            owner: Owner::Local,
            apply_policy: ApplyPolicy::default(),
            constraints: None,
            objectives: vec![],
        },
        status: None,
    }
}

/// Helper to create a plain workload Deployment with containers `app` and `sidecar`
pub fn create_test_deployment(name: &str, replicas: i32) -> Deployment {
    let container = |name: &str| Container {
        name: name.to_string(),
        image: Some(format!("registry.local/{name}:1")),
        ..Default::default()
    };
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container("app"), container("sidecar")],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Status of a Deployment whose pods are all ready
pub fn ready_status(replicas: i32) -> DeploymentStatus {
    DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: Some(replicas),
        available_replicas: Some(replicas),
        updated_replicas: Some(replicas),
        ..Default::default()
    }
}

/// Horizontal-only recommendation
pub fn horizontal_recommendation(replicas: i32, generated_at: DateTime<Utc>) -> Recommendation {
    Recommendation {
        source: ValueSource::Autoscaling,
        generated_at: Some(generated_at),
        horizontal: Some(HorizontalRecommendation { replicas }),
        vertical: None,
    }
}

/// Vertical-only recommendation
pub fn vertical_recommendation(version: &str, containers: Vec<ContainerResources>) -> Recommendation {
    Recommendation {
        source: ValueSource::Autoscaling,
        generated_at: Some(t0()),
        horizontal: None,
        vertical: Some(VerticalRecommendation {
            version: version.to_string(),
            containers,
        }),
    }
}

/// Container resources with cpu and memory requests
pub fn container_resources(name: &str, cpu: &str, memory: &str) -> ContainerResources {
    ContainerResources {
        name: name.to_string(),
        limits: ResourceList::new(),
        requests: ResourceList::from([
            ("cpu".to_string(), cpu.to_string()),
            ("memory".to_string(), memory.to_string()),
        ]),
    }
}

/// Reconciler wired to in-memory fakes; the returned handles share their state
pub fn create_test_reconciler() -> (Reconciler, MockClusterClient, Arc<StaticRecommendationProvider>) {
    let mock = MockClusterClient::new();
    let recommendations = Arc::new(StaticRecommendationProvider::new());
    let reconciler = Reconciler::new(mock.clone(), recommendations.clone(), ControllerConfig::default());
    (reconciler, mock, recommendations)
}
