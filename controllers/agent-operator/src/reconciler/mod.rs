//! Reconciliation logic for the operator's CRDs.
//!
//! - `agent`: per-component pass over an Agent (features, overrides, lifecycle)
//! - `lifecycle`: create/update/disable of one component Deployment
//! - `cleanup`: deletion plan and stale Deployment scanner
//! - `pod_autoscaler`: bounds recommendations and applies them to the target

pub mod agent;
pub mod cleanup;
pub mod lifecycle;
pub mod pod_autoscaler;
#[cfg(test)]
mod pod_autoscaler_test;

use crate::backoff::BackoffRegistry;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::recommender::RecommendationProvider;
use cluster_client::{ClusterClientTrait, ClusterEvent};
use k8s_openapi::api::core::v1::ObjectReference;
use std::time::Duration;
use tracing::{debug, warn};

/// Reconciles Agents and PodAutoscalers.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait + Send + Sync>,
    pub(crate) recommender: Box<dyn RecommendationProvider + Send + Sync>,
    pub(crate) config: ControllerConfig,
    /// Error count tracking per resource (kind/namespace/name)
    backoff: BackoffRegistry,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl ClusterClientTrait + Send + Sync + 'static,
        recommender: impl RecommendationProvider + Send + Sync + 'static,
        config: ControllerConfig,
    ) -> Self {
        Self {
            client: Box::new(client),
            recommender: Box::new(recommender),
            config,
            backoff: BackoffRegistry::default(),
        }
    }

    /// Requeue delay after a failed pass of `key`
    pub fn requeue_after_error(&self, key: &str, error: &ControllerError) -> Duration {
        let (delay, count) = self.backoff.on_error(key, error.is_transient());
        warn!(
            "Reconcile of {} failed {} time(s), retrying in {}s: {}",
            key,
            count,
            delay.as_secs(),
            error
        );
        delay
    }

    /// Forget past failures of `key`
    pub fn reset_backoff(&self, key: &str) {
        self.backoff.on_success(key);
    }

    /// Publish an event; failures are logged and otherwise ignored
    pub(crate) async fn record_event(&self, reference: &ObjectReference, event: ClusterEvent) {
        debug!("Event {} {} on {:?}: {}", event.kind, event.reason, reference.name, event.note);
        if let Err(e) = self.client.publish_event(reference, &event).await {
            warn!("Failed to publish event {}: {}", event.reason, e);
        }
    }
}
