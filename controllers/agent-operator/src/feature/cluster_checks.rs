//! Cluster checks dispatching

use super::{FeatureError, PodTemplateManager, RequiredComponents};
use crds::{AgentSpec, ComponentName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterChecksFeature {
    use_runners: bool,
}

impl ClusterChecksFeature {
    #[must_use]
    pub fn configure(spec: &AgentSpec) -> Option<Self> {
        let config = spec.features.cluster_checks.as_ref()?;
        if !config.enabled.unwrap_or(false) {
            return None;
        }
        Some(Self {
            use_runners: config.use_cluster_checks_runners.unwrap_or(false),
        })
    }

    pub fn required_components(&self) -> RequiredComponents {
        RequiredComponents {
            cluster_agent: Some(true),
            cluster_checks_runner: Some(self.use_runners),
        }
    }

    pub fn manage(&self, component: ComponentName, manager: &mut PodTemplateManager) -> Result<(), FeatureError> {
        match component {
            ComponentName::ClusterAgent => {
                manager.add_env_var("DD_CLUSTER_CHECKS_ENABLED", "true");
                manager.add_env_var("DD_EXTRA_CONFIG_PROVIDERS", "kube_endpoints kube_services");
                manager.add_env_var("DD_EXTRA_LISTENERS", "kube_endpoints kube_services");
            }
            ComponentName::ClusterChecksRunner => {
                manager.add_env_var("DD_CLUSTER_CHECKS_ENABLED", "true");
                manager.add_env_var("DD_EXTRA_CONFIG_PROVIDERS", "clusterchecks");
                manager.add_env_var("DD_ENABLE_METADATA_COLLECTION", "false");
            }
        }
        Ok(())
    }
}
