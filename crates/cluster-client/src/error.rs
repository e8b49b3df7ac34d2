//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the API server
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server asked us to slow down (HTTP 429)
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Any other API error response
    #[error("API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Message returned by the API server
        message: String,
    },

    /// Transport or client-side error
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Build an error from an API status code and message
    #[must_use]
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            429 => Self::Throttled(message),
            _ => Self::Api { code, message },
        }
    }

    /// Whether the object was absent
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the whole reconcile may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Conflict(_) | Self::Throttled(_) | Self::Kube(_) => true,
            Self::Api { code, .. } => *code >= 500 || *code == 408,
            Self::NotFound(_) | Self::Serialization(_) => false,
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => Self::from_status(response.code, response.message.clone()),
            other => Self::Kube(other),
        }
    }
}
