//! Main controller implementation.
//!
//! Builds the cluster client, the recommendation provider and the shared
//! reconciler, then runs the Agent and PodAutoscaler watchers next to the
//! probe server until one of them stops.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::{self, HealthState};
use crate::reconciler::Reconciler;
use crate::recommender::{HttpRecommendationProvider, StaticRecommendationProvider};
use crate::watcher::Watcher;
use cluster_client::ClusterClient;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Field manager and event reporter name
const CONTROLLER_NAME: &str = "agent-operator";

/// Main controller for Agents and PodAutoscalers.
#[derive(Debug)]
pub struct Controller {
    agent_watcher: JoinHandle<Result<(), ControllerError>>,
    pod_autoscaler_watcher: JoinHandle<Result<(), ControllerError>>,
    health_server: JoinHandle<std::io::Result<()>>,
    health: HealthState,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing agent operator");

        let kube_client = Client::try_default().await?;
        let cluster_client = ClusterClient::new(kube_client.clone(), CONTROLLER_NAME);

        let reconciler = match config.recommender_url.as_deref() {
            Some(url) => {
                info!("Fetching recommendations from {}", url);
                Reconciler::new(cluster_client, HttpRecommendationProvider::new(url)?, config.clone())
            }
            None => {
                warn!("RECOMMENDER_URL is not set, PodAutoscalers will not receive recommendations");
                Reconciler::new(cluster_client, StaticRecommendationProvider::new(), config.clone())
            }
        };
        let reconciler = Arc::new(reconciler);

        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            &kube_client,
            config.watch_namespace.as_deref(),
        ));

        let agent_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_agents().await })
        };
        let pod_autoscaler_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_pod_autoscalers().await })
        };

        let health = HealthState::new();
        let health_server = tokio::spawn(health::serve(config.health_port, health.clone()));

        Ok(Self {
            agent_watcher,
            pod_autoscaler_watcher,
            health_server,
            health,
        })
    }

    /// Runs until a watcher or the probe server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        self.health.set_ready(true);
        info!("Agent operator running");

        let result = tokio::select! {
            result = &mut self.agent_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Agent watcher panicked: {e}")))?
            }
            result = &mut self.pod_autoscaler_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("PodAutoscaler watcher panicked: {e}")))?
            }
            result = &mut self.health_server => {
                result
                    .map_err(|e| ControllerError::Watch(format!("health server panicked: {e}")))?
                    .map_err(|e| ControllerError::InvalidConfig(format!("health server failed: {e}")))
            }
        };
        self.health.set_ready(false);
        result
    }
}
