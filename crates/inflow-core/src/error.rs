//! Error types for the inflow ingestion core.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using inflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ingestion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete inbound event. Never retried, never recorded
    /// in the ledger.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An upstream resource refused the call due to rate limiting. Carries
    /// the logical resource name and an optional machine-readable hint.
    #[error("Rate limited on {resource}")]
    RateLimited {
        resource: String,
        retry_after: Option<Duration>,
    },

    /// Network / 5xx class downstream failure, safe to retry.
    #[error("Transient downstream error: {0}")]
    TransientDownstream(String),

    /// The downstream system-of-record rejected the payload. Not retried.
    #[error("Permanent downstream error: {0}")]
    PermanentDownstream(String),

    /// Adaptive extraction failed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// The caller-supplied deadline elapsed before processing finished.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable snake_case label for logs, telemetry, and ledger rows.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::RateLimited { .. } => "rate_limited",
            Error::TransientDownstream(_) => "transient_downstream",
            Error::PermanentDownstream(_) => "permanent_downstream",
            Error::Extraction(_) => "extraction",
            Error::Database(_) => "database",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Request(_) => "request",
            Error::DeadlineExceeded(_) => "deadline_exceeded",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the invoker may retry a call that failed with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::TransientDownstream(_)
        )
    }

    /// Whether a failed downstream write should be flagged for manual review.
    pub fn needs_manual_review(&self) -> bool {
        matches!(self, Error::PermanentDownstream(_))
    }

    /// Classify an HTTP response from a capacity-limited upstream.
    ///
    /// `retry_after` is the parsed `Retry-After` header, when present.
    pub fn from_http_status(
        status: u16,
        resource: &str,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        match status {
            401 | 403 => Error::Config(format!("{} auth rejected: {}", resource, body)),
            429 => Error::RateLimited {
                resource: resource.to_string(),
                retry_after,
            },
            400..=499 => {
                Error::PermanentDownstream(format!("{} returned {}: {}", resource, status, body))
            }
            500..=599 => {
                Error::TransientDownstream(format!("{} returned {}: {}", resource, status, body))
            }
            _ => Error::Request(format!("{} returned {}: {}", resource, status, body)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::TransientDownstream(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

/// Caller-facing processing failure.
///
/// Carries the correlation id as a typed field so downstream log correlation
/// never depends on parsing message strings.
#[derive(Error, Debug)]
#[error("{kind} (correlation_id={correlation_id})")]
pub struct ProcessError {
    /// Correlation id generated at ingress for the failing event.
    pub correlation_id: Uuid,
    /// External event id, when known at failure time.
    pub event_id: Option<String>,
    /// Underlying failure.
    #[source]
    pub kind: Error,
}

impl ProcessError {
    /// Wrap an error with the event's correlation context.
    pub fn new(correlation_id: Uuid, event_id: impl Into<String>, kind: Error) -> Self {
        Self {
            correlation_id,
            event_id: Some(event_id.into()),
            kind,
        }
    }

    /// Stable class label of the underlying error.
    pub fn class(&self) -> &'static str {
        self.kind.class()
    }
}
