//! External metrics provider served by the cluster agent

use super::{FeatureError, PodTemplateManager, RequiredComponents};
use crds::{AgentSpec, ComponentName};
use k8s_openapi::api::core::v1::ContainerPort;

const ID: &str = "externalMetricsServer";

/// Default port of the external metrics provider
pub const DEFAULT_PORT: i32 = 8443;

/// Name of the container port
pub const PORT_NAME: &str = "metricsapi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMetricsFeature {
    port: i32,
}

impl ExternalMetricsFeature {
    #[must_use]
    pub fn configure(spec: &AgentSpec) -> Option<Self> {
        let config = spec.features.external_metrics_server.as_ref()?;
        if !config.enabled.unwrap_or(false) {
            return None;
        }
        Some(Self {
            port: config.port.unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn required_components(&self) -> RequiredComponents {
        RequiredComponents {
            cluster_agent: Some(true),
            cluster_checks_runner: None,
        }
    }

    pub fn manage(&self, component: ComponentName, manager: &mut PodTemplateManager) -> Result<(), FeatureError> {
        if component != ComponentName::ClusterAgent {
            return Ok(());
        }
        if !(1..=65535).contains(&self.port) {
            return Err(FeatureError::InvalidConfig {
                feature: ID,
                reason: format!("port {} is out of range", self.port),
            });
        }

        manager.add_env_var("DD_EXTERNAL_METRICS_PROVIDER_ENABLED", "true");
        manager.add_env_var("DD_EXTERNAL_METRICS_PROVIDER_PORT", self.port.to_string());
        manager
            .add_port(ContainerPort {
                name: Some(PORT_NAME.to_string()),
                container_port: self.port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            })
            .map_err(|e| FeatureError::PortConflict {
                feature: ID,
                port: e.port,
                owner: e.owner,
            })
    }
}
