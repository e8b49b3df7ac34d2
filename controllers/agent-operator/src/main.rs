//! Agent Operator
//!
//! Reconciles `Agent` objects into their component Deployments (cluster agent
//! and cluster checks runner) and bounds `PodAutoscaler` recommendations before
//! applying them to the target workload.

mod autoscaling;
mod backoff;
mod component;
mod conditions;
mod config;
mod controller;
mod error;
mod feature;
mod health;
mod override_resolver;
mod recommender;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Agent Operator");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Recommender: {}", config.recommender_url.as_deref().unwrap_or("none"));
    info!("  Resync: {}s (autoscalers {}s)", config.resync_interval.as_secs(), config.autoscaler_sync.as_secs());
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
