//! Recommendation intake
//!
//! Recommendations are computed outside the cluster. The operator only
//! fetches the latest one per PodAutoscaler and bounds it.

use chrono::{DateTime, Utc};
use crds::{ContainerResources, ValueSource};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Latest recommendation for one PodAutoscaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(default)]
    pub source: ValueSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HorizontalRecommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<VerticalRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalRecommendation {
    pub replicas: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerticalRecommendation {
    /// Opaque version of the recommended resources
    pub version: String,
    #[serde(default)]
    pub containers: Vec<ContainerResources>,
}

#[derive(Error, Debug)]
pub enum RecommendationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recommender returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid recommendation: {0}")]
    Decode(String),
}

impl RecommendationError {
    /// Whether retrying soon may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Decode(_) => false,
        }
    }
}

/// Source of recommendations
#[async_trait::async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// Latest recommendation for `namespace/name`, `None` when there is none yet
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<Recommendation>, RecommendationError>;
}

/// Recommendation service client
#[derive(Debug, Clone)]
pub struct HttpRecommendationProvider {
    client: Client,
    base_url: String,
}

impl HttpRecommendationProvider {
    /// # Errors
    ///
    /// Returns `RecommendationError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RecommendationError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RecommendationProvider for HttpRecommendationProvider {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<Recommendation>, RecommendationError> {
        let url = format!("{}/recommendations/{namespace}/{name}", self.base_url);
        debug!("Fetching recommendation: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecommendationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| RecommendationError::Decode(format!("{e} - body: {}", text.chars().take(200).collect::<String>())))
    }
}

/// In-memory recommendations, used when no recommender is configured
#[derive(Debug, Default)]
pub struct StaticRecommendationProvider {
    recommendations: Mutex<HashMap<(String, String), Recommendation>>,
}

impl StaticRecommendationProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recommendation of `namespace/name`
    pub fn insert(&self, namespace: &str, name: &str, recommendation: Recommendation) {
        self.recommendations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((namespace.to_string(), name.to_string()), recommendation);
    }

    /// Drop the recommendation of `namespace/name`
    pub fn remove(&self, namespace: &str, name: &str) {
        self.recommendations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait::async_trait]
impl RecommendationProvider for StaticRecommendationProvider {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<Recommendation>, RecommendationError> {
        Ok(self
            .recommendations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait::async_trait]
impl<P: RecommendationProvider + ?Sized> RecommendationProvider for std::sync::Arc<P> {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<Recommendation>, RecommendationError> {
        (**self).fetch(namespace, name).await
    }
}
