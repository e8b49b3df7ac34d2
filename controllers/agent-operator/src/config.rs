//! Operator configuration, read from environment variables.

use crate::error::ControllerError;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration of the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch (`WATCH_NAMESPACE`), all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Base URL of the recommendation service (`RECOMMENDER_URL`)
    pub recommender_url: Option<String>,
    /// Requeue interval after a successful Agent pass (`RESYNC_INTERVAL_SECONDS`)
    pub resync_interval: Duration,
    /// Requeue interval after a successful PodAutoscaler pass (`AUTOSCALER_SYNC_SECONDS`)
    pub autoscaler_sync: Duration,
    /// Concurrent reconciles per watcher (`MAX_CONCURRENT_RECONCILES`)
    pub max_concurrent_reconciles: u16,
    /// Port of the probe server (`HEALTH_PORT`)
    pub health_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            recommender_url: None,
            resync_interval: Duration::from_secs(300),
            autoscaler_sync: Duration::from_secs(30),
            max_concurrent_reconciles: 3,
            health_port: 8081,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidConfig` when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidConfig` when a numeric variable does not parse
    /// or a duration is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let resync_interval = seconds(&lookup, "RESYNC_INTERVAL_SECONDS", defaults.resync_interval)?;
        let autoscaler_sync = seconds(&lookup, "AUTOSCALER_SYNC_SECONDS", defaults.autoscaler_sync)?;

        Ok(Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            recommender_url: non_empty("RECOMMENDER_URL").map(|u| u.trim_end_matches('/').to_string()),
            resync_interval,
            autoscaler_sync,
            max_concurrent_reconciles: number(&lookup, "MAX_CONCURRENT_RECONCILES", defaults.max_concurrent_reconciles)?,
            health_port: number(&lookup, "HEALTH_PORT", defaults.health_port)?,
        })
    }
}

fn number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ControllerError::InvalidConfig(format!("{key} must be a number, got {raw:?}"))),
        _ => Ok(default),
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration, ControllerError> {
    let secs: u64 = number(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(ControllerError::InvalidConfig(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
