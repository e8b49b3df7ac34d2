//! Feature modules
//!
//! Each enabled feature contributes component requirements and mutates the
//! pod templates of the components it touches. The set is closed and always
//! applied in declaration order: logging, external metrics, cluster checks,
//! DogStatsD.

pub mod cluster_checks;
pub mod dogstatsd;
pub mod external_metrics;
pub mod logging;
pub mod pod_template;

pub use pod_template::PodTemplateManager;

use cluster_checks::ClusterChecksFeature;
use crds::{AgentSpec, ComponentName};
use dogstatsd::DogstatsdFeature;
use external_metrics::ExternalMetricsFeature;
use logging::LoggingFeature;
use thiserror::Error;

/// Errors raised by a feature module while mutating a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    /// The feature configuration cannot be applied
    #[error("{feature}: {reason}")]
    InvalidConfig { feature: &'static str, reason: String },

    /// A container port is already claimed under another name
    #[error("{feature}: port {port} already used by {owner:?}")]
    PortConflict {
        feature: &'static str,
        port: i32,
        owner: String,
    },
}

/// Which components the enabled features need
///
/// `None` means "no opinion". When merging, an explicit `false` wins over
/// `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredComponents {
    pub cluster_agent: Option<bool>,
    pub cluster_checks_runner: Option<bool>,
}

impl RequiredComponents {
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            cluster_agent: merge_one(self.cluster_agent, other.cluster_agent),
            cluster_checks_runner: merge_one(self.cluster_checks_runner, other.cluster_checks_runner),
        }
    }

    #[must_use]
    pub fn get(&self, component: ComponentName) -> Option<bool> {
        match component {
            ComponentName::ClusterAgent => self.cluster_agent,
            ComponentName::ClusterChecksRunner => self.cluster_checks_runner,
        }
    }

    /// Whether the component is explicitly required
    #[must_use]
    pub fn is_enabled(&self, component: ComponentName) -> bool {
        self.get(component) == Some(true)
    }
}

fn merge_one(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => Some(a && b),
    }
}

/// A configured feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureModule {
    Logging(LoggingFeature),
    ExternalMetrics(ExternalMetricsFeature),
    ClusterChecks(ClusterChecksFeature),
    Dogstatsd(DogstatsdFeature),
}

impl FeatureModule {
    /// Feature identifier used in logs
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::Logging(_) => "logging",
            Self::ExternalMetrics(_) => "externalMetricsServer",
            Self::ClusterChecks(_) => "clusterChecks",
            Self::Dogstatsd(_) => "dogstatsd",
        }
    }

    #[must_use]
    pub fn required_components(&self) -> RequiredComponents {
        match self {
            Self::Logging(f) => f.required_components(),
            Self::ExternalMetrics(f) => f.required_components(),
            Self::ClusterChecks(f) => f.required_components(),
            Self::Dogstatsd(f) => f.required_components(),
        }
    }

    /// Mutate the template of `component`
    ///
    /// # Errors
    ///
    /// Returns a `FeatureError` when the configuration cannot be applied.
    pub fn manage(&self, component: ComponentName, manager: &mut PodTemplateManager) -> Result<(), FeatureError> {
        match self {
            Self::Logging(f) => f.manage(component, manager),
            Self::ExternalMetrics(f) => f.manage(component, manager),
            Self::ClusterChecks(f) => f.manage(component, manager),
            Self::Dogstatsd(f) => f.manage(component, manager),
        }
    }
}

/// Enabled features of an Agent, in application order
#[must_use]
pub fn build_features(spec: &AgentSpec) -> Vec<FeatureModule> {
    let mut features = Vec::new();
    if let Some(f) = LoggingFeature::configure(spec) {
        features.push(FeatureModule::Logging(f));
    }
    if let Some(f) = ExternalMetricsFeature::configure(spec) {
        features.push(FeatureModule::ExternalMetrics(f));
    }
    if let Some(f) = ClusterChecksFeature::configure(spec) {
        features.push(FeatureModule::ClusterChecks(f));
    }
    if let Some(f) = DogstatsdFeature::configure(spec) {
        features.push(FeatureModule::Dogstatsd(f));
    }
    features
}

/// Merge the base requirements of the Agent with every feature's
///
/// The cluster agent is wanted unless `global.clusterAgentEnabled` is false.
/// The cluster checks runner cannot run without the cluster agent.
#[must_use]
pub fn required_components(spec: &AgentSpec, features: &[FeatureModule]) -> RequiredComponents {
    let base = RequiredComponents {
        cluster_agent: Some(spec.global.cluster_agent_enabled.unwrap_or(true)),
        cluster_checks_runner: None,
    };
    let mut required = features
        .iter()
        .fold(base, |acc, feature| acc.merge(feature.required_components()));

    if !required.is_enabled(ComponentName::ClusterAgent) && required.cluster_checks_runner == Some(true) {
        required.cluster_checks_runner = Some(false);
    }
    required
}

/// Run every module against the template of `component`
///
/// A failing module does not stop the ones after it; all errors are returned.
pub fn apply(
    features: &[FeatureModule],
    component: ComponentName,
    manager: &mut PodTemplateManager,
) -> Vec<FeatureError> {
    features
        .iter()
        .filter_map(|feature| feature.manage(component, manager).err())
        .collect()
}
