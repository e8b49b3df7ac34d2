//! Log level and log collection

use super::{FeatureError, PodTemplateManager, RequiredComponents};
use crds::{AgentSpec, ComponentName};

const ID: &str = "logging";

/// Accepted values of `global.logLevel`
pub const LOG_LEVELS: [&str; 7] = ["trace", "debug", "info", "warn", "error", "critical", "off"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingFeature {
    level: Option<String>,
    collect_logs: bool,
    container_collect_all: bool,
}

impl LoggingFeature {
    /// Build the feature when a log level or log collection is configured
    #[must_use]
    pub fn configure(spec: &AgentSpec) -> Option<Self> {
        let collection = spec.features.log_collection.as_ref();
        let collect_logs = collection.and_then(|c| c.enabled).unwrap_or(false);
        if spec.global.log_level.is_none() && !collect_logs {
            return None;
        }
        Some(Self {
            level: spec.global.log_level.clone(),
            collect_logs,
            container_collect_all: collection.and_then(|c| c.container_collect_all).unwrap_or(false),
        })
    }

    pub fn required_components(&self) -> RequiredComponents {
        RequiredComponents::default()
    }

    pub fn manage(&self, component: ComponentName, manager: &mut PodTemplateManager) -> Result<(), FeatureError> {
        if let Some(level) = &self.level {
            let normalized = level.to_ascii_lowercase();
            if !LOG_LEVELS.contains(&normalized.as_str()) {
                return Err(FeatureError::InvalidConfig {
                    feature: ID,
                    reason: format!("unknown log level {level:?}"),
                });
            }
            manager.add_env_var("DD_LOG_LEVEL", normalized);
        }

        if component == ComponentName::ClusterChecksRunner && self.collect_logs {
            manager.add_env_var("DD_LOGS_ENABLED", "true");
            manager.add_env_var(
                "DD_LOGS_CONFIG_CONTAINER_COLLECT_ALL",
                self.container_collect_all.to_string(),
            );
        }
        Ok(())
    }
}
