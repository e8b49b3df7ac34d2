//! DogStatsD intake port on the cluster checks runner

use super::{FeatureError, PodTemplateManager, RequiredComponents};
use crds::{AgentSpec, ComponentName};
use k8s_openapi::api::core::v1::ContainerPort;

const ID: &str = "dogstatsd";

/// DogStatsD container port
pub const DOGSTATSD_PORT: i32 = 8125;

/// Name of the container port
pub const PORT_NAME: &str = "dogstatsdport";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DogstatsdFeature {
    host_port: Option<i32>,
}

impl DogstatsdFeature {
    #[must_use]
    pub fn configure(spec: &AgentSpec) -> Option<Self> {
        let config = spec.features.dogstatsd.as_ref()?;
        if !config.enabled.unwrap_or(false) {
            return None;
        }
        let host_port = config
            .host_port_enabled
            .unwrap_or(false)
            .then(|| config.host_port.unwrap_or(DOGSTATSD_PORT));
        Some(Self { host_port })
    }

    pub fn required_components(&self) -> RequiredComponents {
        RequiredComponents::default()
    }

    pub fn manage(&self, component: ComponentName, manager: &mut PodTemplateManager) -> Result<(), FeatureError> {
        if component != ComponentName::ClusterChecksRunner {
            return Ok(());
        }
        if let Some(port) = self.host_port.filter(|p| !(1..=65535).contains(p)) {
            return Err(FeatureError::InvalidConfig {
                feature: ID,
                reason: format!("host port {port} is out of range"),
            });
        }

        manager
            .add_port(ContainerPort {
                name: Some(PORT_NAME.to_string()),
                container_port: DOGSTATSD_PORT,
                host_port: self.host_port,
                protocol: Some("UDP".to_string()),
                ..Default::default()
            })
            .map_err(|e| FeatureError::PortConflict {
                feature: ID,
                port: e.port,
                owner: e.owner,
            })?;
        manager.add_env_var("DD_DOGSTATSD_PORT", DOGSTATSD_PORT.to_string());
        manager.add_env_var("DD_DOGSTATSD_NON_LOCAL_TRAFFIC", "true");
        Ok(())
    }
}
