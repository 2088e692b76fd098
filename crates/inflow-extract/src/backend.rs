//! Adaptive extraction backend abstraction.
//!
//! The adaptive path calls a structured-extraction sidecar service over
//! HTTP. The prompt/schema content lives in the sidecar; this module only
//! carries text in and structured fields out. Each tier maps to a model slug
//! and a timeout, and the tier's model name doubles as the logical resource
//! key for rate-limit cooldown tracking.
//!
//! # Configuration
//!
//! - `INFLOW_EXTRACT_BASE_URL`: base URL of the sidecar. Set to the empty
//!   string to disable the adaptive path.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use inflow_core::defaults;
use inflow_core::{CorrelationContext, Error, ExtractionTier, Result, StructuredResult};

/// Backend trait for adaptive structured extraction.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Extract structured fields from `text` at the given tier.
    async fn extract(
        &self,
        text: &str,
        tier: ExtractionTier,
        ctx: &CorrelationContext,
    ) -> Result<StructuredResult>;

    /// Logical resource name for cooldown tracking, per tier.
    fn resource_key(&self, tier: ExtractionTier) -> String;

    /// Per-tier call timeout, bounded below the overall process deadline.
    fn timeout_for(&self, tier: ExtractionTier) -> Duration {
        let secs = match tier {
            ExtractionTier::Lite => defaults::EXTRACT_TIMEOUT_LITE_SECS,
            ExtractionTier::Standard => defaults::EXTRACT_TIMEOUT_STANDARD_SECS,
            ExtractionTier::Deep => defaults::EXTRACT_TIMEOUT_DEEP_SECS,
        };
        Duration::from_secs(secs)
    }
}

/// Configuration for the HTTP extraction sidecar.
#[derive(Debug, Clone)]
pub struct HttpExtractionConfig {
    /// Base URL of the sidecar service.
    pub base_url: String,
    /// Model slug used for lite-tier calls.
    pub lite_model: String,
    /// Model slug used for standard-tier calls.
    pub standard_model: String,
    /// Model slug used for deep-tier calls.
    pub deep_model: String,
}

impl Default for HttpExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8091".to_string(),
            lite_model: "intake-lite".to_string(),
            standard_model: "intake-standard".to_string(),
            deep_model: "intake-deep".to_string(),
        }
    }
}

/// HTTP client for the structured-extraction sidecar.
pub struct HttpExtractionBackend {
    config: HttpExtractionConfig,
    client: reqwest::Client,
}

impl HttpExtractionBackend {
    pub fn new(config: HttpExtractionConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    /// Returns None if `INFLOW_EXTRACT_BASE_URL` is explicitly set to empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_EXTRACT_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        Some(Self::new(HttpExtractionConfig {
            base_url,
            ..HttpExtractionConfig::default()
        }))
    }

    fn model_for(&self, tier: ExtractionTier) -> &str {
        match tier {
            ExtractionTier::Lite => &self.config.lite_model,
            ExtractionTier::Standard => &self.config.standard_model,
            ExtractionTier::Deep => &self.config.deep_model,
        }
    }
}

/// Request payload for the sidecar `/extract` endpoint.
#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    model: &'a str,
    correlation_id: &'a str,
}

/// Parse a `Retry-After` header value (delta-seconds form only).
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ExtractionBackend for HttpExtractionBackend {
    async fn extract(
        &self,
        text: &str,
        tier: ExtractionTier,
        ctx: &CorrelationContext,
    ) -> Result<StructuredResult> {
        let url = format!("{}/extract", self.config.base_url);
        let model = self.model_for(tier);
        let correlation_id = ctx.correlation_id.to_string();
        let resource = self.resource_key(tier);

        let request = ExtractRequest {
            text,
            model,
            correlation_id: &correlation_id,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout_for(tier))
            .send()
            .await
            .map_err(|e| Error::TransientDownstream(format!("extraction request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let err = Error::from_http_status(status.as_u16(), &resource, retry_after, &body);
            // The shared classifier labels non-auth 4xx as downstream payload
            // rejections; from the extraction sidecar that is an extraction
            // failure, not a system-of-record verdict.
            return Err(match err {
                Error::PermanentDownstream(msg) => Error::Extraction(msg),
                other => other,
            });
        }

        let parsed: StructuredResult = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("malformed extraction response: {}", e)))?;

        Ok(parsed)
    }

    fn resource_key(&self, tier: ExtractionTier) -> String {
        format!("extract:{}", self.model_for(tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(base_url: String) -> HttpExtractionBackend {
        HttpExtractionBackend::new(HttpExtractionConfig {
            base_url,
            ..HttpExtractionConfig::default()
        })
    }

    fn ctx() -> CorrelationContext {
        CorrelationContext::new("evt-1")
    }

    #[test]
    fn test_resource_key_is_tier_scoped() {
        let backend = backend("http://localhost:1".into());
        assert_eq!(
            backend.resource_key(ExtractionTier::Lite),
            "extract:intake-lite"
        );
        assert_eq!(
            backend.resource_key(ExtractionTier::Deep),
            "extract:intake-deep"
        );
    }

    #[test]
    fn test_timeouts_increase_with_tier() {
        let backend = backend("http://localhost:1".into());
        assert!(
            backend.timeout_for(ExtractionTier::Lite) < backend.timeout_for(ExtractionTier::Deep)
        );
    }

    #[tokio::test]
    async fn test_extract_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_partial_json(json!({ "model": "intake-standard" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "role": "Backend Engineer"
            })))
            .mount(&server)
            .await;

        let result = backend(server.uri())
            .extract("Jane applied", ExtractionTier::Standard, &ctx())
            .await
            .unwrap();

        assert_eq!(result.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.email.as_deref(), Some("jane@example.com"));
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn test_extract_429_maps_to_rate_limited_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .extract("text", ExtractionTier::Lite, &ctx())
            .await
            .unwrap_err();

        match err {
            Error::RateLimited {
                resource,
                retry_after,
            } => {
                assert_eq!(resource, "extract:intake-lite");
                assert_eq!(retry_after, Some(Duration::from_secs(5)));
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_500_maps_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .extract("text", ExtractionTier::Lite, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransientDownstream(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_extract_422_maps_to_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unsupported input"))
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .extract("text", ExtractionTier::Lite, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_extract_malformed_body_is_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .extract("text", ExtractionTier::Lite, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
