//! Controller-specific error types.
//!
//! Library errors (`ClusterError`, `ValidationError`, `RecommendationError`)
//! are wrapped here; `is_transient` decides how fast a failed pass is retried.

use crate::feature::FeatureError;
use crate::recommender::RecommendationError;
use cluster_client::ClusterError;
use crds::ValidationError;
use thiserror::Error;

/// Errors that can occur in the agent operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// API server error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client construction error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// One or more feature modules failed for a component
    #[error("{}", format_aggregate(.0))]
    FeatureAggregate(Vec<FeatureError>),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid PodAutoscaler spec
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Recommendation intake failed
    #[error("Recommendation error: {0}")]
    Recommendation(#[from] RecommendationError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether retrying soon may succeed (conflicts, throttling, 5xx)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cluster(e) => e.is_transient(),
            Self::Recommendation(e) => e.is_transient(),
            Self::Kube(_) | Self::Watch(_) => true,
            Self::FeatureAggregate(_) | Self::InvalidConfig(_) | Self::Validation(_) => false,
        }
    }
}

/// Render aggregated errors the way a single error reads: one message, or a bracketed list
fn format_aggregate(errors: &[FeatureError]) -> String {
    match errors {
        [single] => single.to_string(),
        _ => format!(
            "[{}]",
            errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ),
    }
}
