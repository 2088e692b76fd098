//! Data model for the ingestion transaction core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::uuid_utils::new_v7;

/// One logical inbound event.
///
/// The external id is the idempotency key: every retry or replay of the same
/// logical event carries the same external id. The correlation id is
/// generated at ingress and never changes for the event's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeEvent {
    /// Unique external identifier (e.g., a message id).
    pub external_id: String,
    /// Raw inbound payload text.
    pub payload: String,
    /// Optional subject/title line accompanying the payload.
    pub subject: Option<String>,
    /// Optional sender ("Display Name <addr@example.com>" or bare address).
    pub sender: Option<String>,
    /// Arrival timestamp.
    pub received_at: DateTime<Utc>,
    /// Correlation id, immutable for the event's lifetime.
    pub correlation_id: Uuid,
}

impl IntakeEvent {
    /// Create a new event, stamping arrival time and a fresh correlation id.
    pub fn new(external_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            payload: payload.into(),
            subject: None,
            sender: None,
            received_at: Utc::now(),
            correlation_id: new_v7(),
        }
    }

    /// Set the subject line.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Reject malformed events before any ledger write.
    pub fn validate(&self) -> Result<()> {
        if self.external_id.trim().is_empty() {
            return Err(Error::Validation("missing external id".into()));
        }
        if self.payload.trim().is_empty() {
            return Err(Error::Validation("empty payload".into()));
        }
        if self.payload.len() > defaults::PAYLOAD_MAX_BYTES {
            return Err(Error::Validation(format!(
                "payload exceeds {} bytes",
                defaults::PAYLOAD_MAX_BYTES
            )));
        }
        Ok(())
    }
}

/// Ledger record lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// First sight recorded; no downstream side effect confirmed yet.
    Pending,
    /// Durable store and downstream write both succeeded.
    Complete,
    /// Durable write succeeded but the downstream write did not.
    PartialFailed,
}

impl LedgerStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Complete => "complete",
            LedgerStatus::PartialFailed => "partial_failed",
        }
    }

    /// Parse a database string. Unknown values fall back to `Pending`,
    /// the safest state to re-enter processing from.
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "complete" => LedgerStatus::Complete,
            "partial_failed" => LedgerStatus::PartialFailed,
            _ => LedgerStatus::Pending,
        }
    }
}

/// Keys created in the downstream system-of-record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamIds {
    /// Primary record key (e.g., the CRM person id).
    pub primary: String,
    /// Related record keys created in the same call (deals, notes).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl DownstreamIds {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            related: Vec::new(),
        }
    }
}

/// Durable processing outcome for one external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub external_id: String,
    pub status: LedgerStatus,
    /// Present once the downstream write has succeeded.
    pub downstream_ids: Option<DownstreamIds>,
    /// Stable error class of the last failure, if any.
    pub error_class: Option<String>,
    /// Human-readable summary of the last failure, if any.
    pub error_summary: Option<String>,
    /// Set when the downstream rejected the payload permanently.
    pub manual_review: bool,
    /// Whether the committed result came from the fallback path.
    pub degraded: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub attempt_count: i32,
}

/// Structured data extracted from an inbound payload.
///
/// Fields the extractor cannot determine are explicitly `None` — absent,
/// never guessed. This contract is what lets the fallback extractor produce
/// a usable subset of the adaptive path's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// True when this result came from the fallback path.
    #[serde(default)]
    pub degraded: bool,
}

impl StructuredResult {
    /// Whether no field was determined at all.
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.role.is_none()
            && self.company.is_none()
            && self.location.is_none()
            && self.links.is_empty()
            && self.summary.is_none()
    }

    /// Fill absent fields from `other`, leaving determined fields untouched.
    ///
    /// `degraded` is not merged; it describes how `self` was produced.
    pub fn fill_missing_from(&mut self, other: &StructuredResult) {
        if self.full_name.is_none() {
            self.full_name = other.full_name.clone();
        }
        if self.email.is_none() {
            self.email = other.email.clone();
        }
        if self.phone.is_none() {
            self.phone = other.phone.clone();
        }
        if self.role.is_none() {
            self.role = other.role.clone();
        }
        if self.company.is_none() {
            self.company = other.company.clone();
        }
        if self.location.is_none() {
            self.location = other.location.clone();
        }
        if self.links.is_empty() {
            self.links = other.links.clone();
        }
        if self.summary.is_none() {
            self.summary = other.summary.clone();
        }
    }

    /// Count of determined fields, for logging.
    pub fn field_count(&self) -> usize {
        [
            self.full_name.is_some(),
            self.email.is_some(),
            self.phone.is_some(),
            self.role.is_some(),
            self.company.is_some(),
            self.location.is_some(),
            !self.links.is_empty(),
            self.summary.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

/// Discrete extraction cost/quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// Cheapest, fastest, least capable.
    Lite,
    /// Default mid tier.
    Standard,
    /// Most capable, most expensive.
    Deep,
}

impl ExtractionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionTier::Lite => "lite",
            ExtractionTier::Standard => "standard",
            ExtractionTier::Deep => "deep",
        }
    }

    /// Next cheaper tier, saturating at `Lite`.
    pub fn demote(self) -> Self {
        match self {
            ExtractionTier::Deep => ExtractionTier::Standard,
            _ => ExtractionTier::Lite,
        }
    }

    /// Next more capable tier, saturating at `Deep`.
    pub fn promote(self) -> Self {
        match self {
            ExtractionTier::Lite => ExtractionTier::Standard,
            _ => ExtractionTier::Deep,
        }
    }
}

impl std::fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of tier selection for one input.
///
/// Recorded alongside the cached result for auditability; not required for
/// correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDecision {
    /// Chosen tier.
    pub tier: ExtractionTier,
    /// Complexity signal the decision was based on (input length in chars).
    pub complexity: usize,
    /// Worst-case estimated cost of running the chosen tier, in dollars.
    pub estimated_cost: f64,
    /// Quality target the caller asked for (0.0–1.0).
    pub quality_target: f32,
    /// True when the nominal tier was downgraded (or the cheapest tier still
    /// exceeds the budget).
    pub budget_constrained: bool,
}

/// How `process` resolved the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Downstream record created (or completed on a resumed attempt).
    Created,
    /// The event had already completed; the stored outcome was returned.
    Replayed,
    /// Durably recorded but the downstream write did not succeed; safe to
    /// retry with the same external id.
    Partial,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Created => "created",
            ProcessStatus::Replayed => "replayed",
            ProcessStatus::Partial => "partial",
        }
    }
}

/// Caller-facing result of `process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    /// Downstream keys; present for `Created` and `Replayed`.
    pub downstream_ids: Option<DownstreamIds>,
    pub correlation_id: Uuid,
    /// True when the committed result came from the fallback extractor.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_validate_ok() {
        let event = IntakeEvent::new("evt-1", "Jane Doe applied for the backend role");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_event_validate_missing_external_id() {
        let event = IntakeEvent::new("   ", "body");
        let err = event.validate().unwrap_err();
        assert_eq!(err.class(), "validation");
    }

    #[test]
    fn test_event_validate_empty_payload() {
        let event = IntakeEvent::new("evt-1", "  \n ");
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_event_validate_oversized_payload() {
        let event = IntakeEvent::new("evt-1", "x".repeat(defaults::PAYLOAD_MAX_BYTES + 1));
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_event_correlation_id_is_stable() {
        let event = IntakeEvent::new("evt-1", "body").with_subject("Re: role");
        let id = event.correlation_id;
        let event = event.with_sender("Jane <jane@example.com>");
        assert_eq!(event.correlation_id, id);
    }

    #[test]
    fn test_ledger_status_round_trip() {
        for status in [
            LedgerStatus::Pending,
            LedgerStatus::Complete,
            LedgerStatus::PartialFailed,
        ] {
            assert_eq!(LedgerStatus::from_str_loose(status.as_str()), status);
        }
    }

    #[test]
    fn test_ledger_status_unknown_falls_back_to_pending() {
        assert_eq!(
            LedgerStatus::from_str_loose("garbage"),
            LedgerStatus::Pending
        );
    }

    #[test]
    fn test_structured_result_empty() {
        let result = StructuredResult::default();
        assert!(result.is_empty());
        assert_eq!(result.field_count(), 0);
    }

    #[test]
    fn test_structured_result_field_count() {
        let result = StructuredResult {
            email: Some("jane@example.com".into()),
            phone: Some("+1 555 0100".into()),
            links: vec!["https://example.com/jane".into()],
            ..Default::default()
        };
        assert!(!result.is_empty());
        assert_eq!(result.field_count(), 3);
    }

    #[test]
    fn test_fill_missing_from_only_fills_gaps() {
        let mut result = StructuredResult {
            email: Some("extracted@example.com".into()),
            degraded: false,
            ..Default::default()
        };
        let candidates = StructuredResult {
            email: Some("candidate@example.com".into()),
            full_name: Some("Jane Doe".into()),
            degraded: true,
            ..Default::default()
        };

        result.fill_missing_from(&candidates);
        assert_eq!(result.email.as_deref(), Some("extracted@example.com"));
        assert_eq!(result.full_name.as_deref(), Some("Jane Doe"));
        assert!(!result.degraded);
    }

    #[test]
    fn test_structured_result_serde_omits_absent_fields() {
        let result = StructuredResult {
            email: Some("jane@example.com".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("email"));
        assert!(!json.contains("full_name"));
        assert!(!json.contains("phone"));
    }

    #[test]
    fn test_tier_ordering_and_saturation() {
        assert!(ExtractionTier::Lite < ExtractionTier::Standard);
        assert!(ExtractionTier::Standard < ExtractionTier::Deep);

        assert_eq!(ExtractionTier::Lite.demote(), ExtractionTier::Lite);
        assert_eq!(ExtractionTier::Deep.demote(), ExtractionTier::Standard);
        assert_eq!(ExtractionTier::Deep.promote(), ExtractionTier::Deep);
        assert_eq!(ExtractionTier::Lite.promote(), ExtractionTier::Standard);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(ExtractionTier::Lite.to_string(), "lite");
        assert_eq!(ExtractionTier::Standard.to_string(), "standard");
        assert_eq!(ExtractionTier::Deep.to_string(), "deep");
    }

    #[test]
    fn test_downstream_ids_serde_round_trip() {
        let ids = DownstreamIds {
            primary: "person-42".into(),
            related: vec!["deal-7".into()],
        };
        let json = serde_json::to_value(&ids).unwrap();
        let back: DownstreamIds = serde_json::from_value(json).unwrap();
        assert_eq!(back, ids);
    }

    #[test]
    fn test_process_status_labels() {
        assert_eq!(ProcessStatus::Created.as_str(), "created");
        assert_eq!(ProcessStatus::Replayed.as_str(), "replayed");
        assert_eq!(ProcessStatus::Partial.as_str(), "partial");
    }
}
