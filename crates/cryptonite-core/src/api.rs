//! Remote classification service client.
//!
//! The engine only depends on [`ClassificationApi`]; [`HttpClassifier`] is
//! the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ApiConfig;

/// Value of the `x-cryptonite-version` header.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors returned by the remote service client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No endpoint configured")]
    MissingEndpoint,
}

/// Result type for remote calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Body of a classification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl CheckRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            node_id: None,
            timestamp: None,
        }
    }

    /// Request for a single in-page link.
    pub fn for_node(url: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::new(url)
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Sets the send time unless the caller already did.
    fn stamped(self) -> Self {
        match self.timestamp {
            Some(_) => self,
            None => self.with_timestamp(Utc::now().timestamp_millis()),
        }
    }
}

/// One classification hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHit {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CategoryHit {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// Classification response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    #[serde(rename = "Domains", default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<CategoryHit>>,
    #[serde(rename = "Folders", default, skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<CategoryHit>>,
    #[serde(rename = "URLs", default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<CategoryHit>>,
}

impl ClassificationResponse {
    pub fn with_domains(mut self, kinds: &[&str]) -> Self {
        self.domains = Some(kinds.iter().map(|k| CategoryHit::new(*k)).collect());
        self
    }

    pub fn with_folders(mut self, kinds: &[&str]) -> Self {
        self.folders = Some(kinds.iter().map(|k| CategoryHit::new(*k)).collect());
        self
    }

    pub fn with_urls(mut self, kinds: &[&str]) -> Self {
        self.urls = Some(kinds.iter().map(|k| CategoryHit::new(*k)).collect());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseLookup<'a> {
    subscription_id: &'a str,
}

/// Contract with the remote classification service.
#[async_trait]
pub trait ClassificationApi: Send + Sync {
    /// Classifies a URL. `Ok(None)` means the service had nothing to say.
    async fn check_url(&self, request: CheckRequest) -> Result<Option<ClassificationResponse>>;

    /// Looks up a purchase. Returns true only for a 200 response.
    async fn check_extension_status(&self, subscription_id: &str) -> Result<bool>;
}

/// `reqwest`-backed [`ClassificationApi`].
pub struct HttpClassifier {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpClassifier {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Api-Key", &self.config.api_key)
            .header("Security-Token", &self.config.security_token)
    }
}

#[async_trait]
impl ClassificationApi for HttpClassifier {
    async fn check_url(&self, request: CheckRequest) -> Result<Option<ClassificationResponse>> {
        let endpoint = self.config.classification_endpoint();
        if endpoint.is_empty() {
            return Err(ApiError::MissingEndpoint);
        }
        let request = request.stamped();

        let response = self
            .post(endpoint)
            .header("x-cryptonite-version", CLIENT_VERSION)
            .header("x-cryptonite-browser", &self.config.browser_name)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let parsed = serde_json::from_slice(&body)?;
                Ok(Some(parsed))
            }
            StatusCode::NO_CONTENT => Ok(None),
            status => {
                debug!(status = status.as_u16(), url = %request.url, "Classification refused");
                Err(ApiError::Status(status.as_u16()))
            }
        }
    }

    async fn check_extension_status(&self, subscription_id: &str) -> Result<bool> {
        let endpoint = &self.config.purchase_lookup_endpoint;
        if endpoint.is_empty() {
            return Err(ApiError::MissingEndpoint);
        }

        let response = self
            .post(endpoint)
            .json(&PurchaseLookup { subscription_id })
            .send()
            .await?;

        Ok(response.status() == StatusCode::OK)
    }
}
