//! HTTP client for the downstream records (system-of-record) API.
//!
//! Maps response statuses onto the pipeline's error taxonomy so the invoker
//! and coordinator can classify without touching HTTP details: 429 becomes a
//! rate-limit with the parsed `Retry-After` hint, 5xx and network failures
//! are transient, auth failures are configuration errors, and remaining 4xx
//! are permanent business-rule rejections flagged for manual review.
//!
//! # Configuration
//!
//! - `INFLOW_RECORDS_BASE_URL`: base URL of the records API.
//! - `INFLOW_RECORDS_API_KEY`: bearer token, when the API requires one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use inflow_core::defaults;
use inflow_core::{
    CorrelationContext, DownstreamApi, DownstreamIds, Error, Result, StructuredResult,
};
use inflow_extract::parse_retry_after;

/// Logical resource name for cooldown tracking.
pub const RECORDS_RESOURCE: &str = "records-api";

/// Configuration for the records API client.
#[derive(Debug, Clone)]
pub struct HttpRecordsConfig {
    /// Base URL of the records API.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

impl HttpRecordsConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// HTTP implementation of [`DownstreamApi`].
pub struct HttpRecordsClient {
    config: HttpRecordsConfig,
    client: reqwest::Client,
}

impl HttpRecordsClient {
    pub fn new(config: HttpRecordsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    /// Returns None if `INFLOW_RECORDS_BASE_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_RECORDS_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let mut config = HttpRecordsConfig::new(base_url);
        if let Ok(key) = std::env::var(defaults::ENV_RECORDS_API_KEY) {
            if !key.is_empty() {
                config = config.with_api_key(key);
            }
        }
        Some(Self::new(config))
    }

    /// Check if the records API is reachable.
    pub async fn ping(&self) -> Result<bool> {
        let url = format!("{}/health", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Request payload for the records `create-or-update` endpoint.
#[derive(Serialize)]
struct UpsertRecordRequest<'a> {
    external_id: &'a str,
    correlation_id: &'a str,
    #[serde(flatten)]
    fields: &'a StructuredResult,
}

/// Response payload from the records API.
#[derive(Deserialize)]
struct UpsertRecordResponse {
    id: String,
    #[serde(default)]
    related_ids: Vec<String>,
}

#[async_trait]
impl DownstreamApi for HttpRecordsClient {
    async fn create_or_update(
        &self,
        external_id: &str,
        result: &StructuredResult,
        ctx: &CorrelationContext,
    ) -> Result<DownstreamIds> {
        let url = format!("{}/records", self.config.base_url);
        let correlation_id = ctx.correlation_id.to_string();

        let request = UpsertRecordRequest {
            external_id,
            correlation_id: &correlation_id,
            fields: result,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::TransientDownstream(format!("records request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_http_status(
                status.as_u16(),
                RECORDS_RESOURCE,
                retry_after,
                &body,
            ));
        }

        let parsed: UpsertRecordResponse = response.json().await.map_err(|e| {
            Error::Serialization(format!("malformed records response: {}", e))
        })?;

        debug!(
            event_id = external_id,
            correlation_id = %ctx.correlation_id,
            downstream_id = %parsed.id,
            "Records API upsert succeeded"
        );

        Ok(DownstreamIds {
            primary: parsed.id,
            related: parsed.related_ids,
        })
    }
}
