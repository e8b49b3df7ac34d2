//! Kubernetes resource watchers.
//!
//! Both CRDs run through the generic `watch_resource()` helper on top of
//! `kube_runtime::Controller`, which owns reconnection and the work queue.
//! Successful passes requeue on the kind's resync interval; failed passes
//! requeue with the per-object backoff of the reconciler.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{Agent, PodAutoscaler};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span};

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<(), ControllerError>> + Send>>;

/// Queue key of an object, as used by the backoff registry
fn object_key<K: Resource>(kind: &str, obj: &K) -> String {
    format!("{}/{}/{}", kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Namespaced API when a namespace is given, cluster-wide otherwise
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Drive `controller` until its stream ends.
///
/// `reconcile_fn` matches the reconciler signature
/// `async fn reconcile(&self, resource: &K) -> Result<(), ControllerError>`.
async fn watch_resource<K, F>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
    resync: Duration,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    let concurrency = reconciler.config.max_concurrent_reconciles;
    info!("Starting {} watcher (concurrency {})", resource_name, concurrency);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = object_key(resource_name, obj.as_ref());
        Action::requeue(ctx.requeue_after_error(&key, error))
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let key = object_key(resource_name, obj.as_ref());
        let span = info_span!("reconcile", kind = resource_name, object = %key);
        async move {
            debug!("Reconciling {}", key);
            reconcile_fn(Arc::clone(&ctx), obj).await?;
            ctx.reset_backoff(&key);
            Ok::<_, ControllerError>(Action::requeue(resync))
        }
        .instrument(span)
    };

    // Debounce batches bursts of events on the same object
    let config = RuntimeConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(concurrency);

    controller
        .with_config(config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled {} {}", resource_name, obj.name),
                Err(e) => error!("Controller error for {}: {}", resource_name, e),
            }
        })
        .await;

    Err(ControllerError::Watch(format!("{resource_name} watch stream ended")))
}

/// Watches Agents, their Deployments and PodAutoscalers.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    agent_api: Api<Agent>,
    deployment_api: Api<Deployment>,
    pod_autoscaler_api: Api<PodAutoscaler>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a watcher scoped to `namespace`, or to the whole cluster
    pub fn new(reconciler: Arc<Reconciler>, client: &Client, namespace: Option<&str>) -> Self {
        Self {
            reconciler,
            agent_api: scoped_api(client.clone(), namespace),
            deployment_api: scoped_api(client.clone(), namespace),
            pod_autoscaler_api: scoped_api(client.clone(), namespace),
        }
    }

    /// Watches Agents; changes to owned Deployments requeue their Agent.
    pub async fn watch_agents(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.agent_api.clone(), watcher::Config::default())
            .owns(self.deployment_api.clone(), watcher::Config::default());
        watch_resource(
            controller,
            Arc::clone(&self.reconciler),
            |reconciler, agent| Box::pin(async move { reconciler.reconcile_agent(&agent).await }),
            "Agent",
            self.reconciler.config.resync_interval,
        )
        .await
    }

    /// Watches PodAutoscalers; recommendations are polled on every resync.
    pub async fn watch_pod_autoscalers(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.pod_autoscaler_api.clone(), watcher::Config::default());
        watch_resource(
            controller,
            Arc::clone(&self.reconciler),
            |reconciler, autoscaler| {
                Box::pin(async move { reconciler.reconcile_pod_autoscaler(&autoscaler).await })
            },
            "PodAutoscaler",
            self.reconciler.config.autoscaler_sync,
        )
        .await
    }
}
