//! Stage-level telemetry contract.
//!
//! The pipeline emits one [`StageEvent`] per stage per attempt. Emission is
//! fire-and-forget: a sink that drops, buffers, or fails must never fail the
//! transaction it is observing.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Pipeline stages, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LedgerLookup,
    Normalize,
    SelectTier,
    Extract,
    PersistResult,
    DownstreamWrite,
    LedgerFinalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LedgerLookup => "ledger_lookup",
            Stage::Normalize => "normalize",
            Stage::SelectTier => "select_tier",
            Stage::Extract => "extract",
            Stage::PersistResult => "persist_result",
            Stage::DownstreamWrite => "downstream_write",
            Stage::LedgerFinalize => "ledger_finalize",
        }
    }
}

/// One stage-level observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub event_id: String,
    pub correlation_id: Uuid,
    pub duration_ms: u64,
    pub success: bool,
    /// Stable error class when `success` is false.
    pub error_class: Option<String>,
}

/// Narrow fire-and-forget telemetry interface.
pub trait TelemetrySink: Send + Sync {
    /// Record one stage event. Must not panic or block meaningfully.
    fn record(&self, event: StageEvent);
}

/// Sink that forwards stage events to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: StageEvent) {
        // Field names follow the schema in crate::logging.
        if event.success {
            info!(
                stage = event.stage.as_str(),
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                duration_ms = event.duration_ms,
                success = true,
                "Stage completed"
            );
        } else {
            warn!(
                stage = event.stage.as_str(),
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                duration_ms = event.duration_ms,
                success = false,
                error_class = event.error_class.as_deref().unwrap_or("unknown"),
                "Stage failed"
            );
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&self, _event: StageEvent) {}
}

/// Sink that captures events in memory, for test assertions.
#[derive(Debug, Default)]
pub struct CapturingTelemetry {
    events: Mutex<Vec<StageEvent>>,
}

impl CapturingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events recorded for a given stage.
    pub fn for_stage(&self, stage: Stage) -> Vec<StageEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for CapturingTelemetry {
    fn record(&self, event: StageEvent) {
        // A poisoned lock means a test already panicked; swallow rather than
        // double-panic from the observability path.
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid_utils::new_v7;

    fn sample(stage: Stage, success: bool) -> StageEvent {
        StageEvent {
            stage,
            event_id: "evt-1".to_string(),
            correlation_id: new_v7(),
            duration_ms: 12,
            success,
            error_class: (!success).then(|| "transient_downstream".to_string()),
        }
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::LedgerLookup.as_str(), "ledger_lookup");
        assert_eq!(Stage::Extract.as_str(), "extract");
        assert_eq!(Stage::DownstreamWrite.as_str(), "downstream_write");
        assert_eq!(Stage::LedgerFinalize.as_str(), "ledger_finalize");
    }

    #[test]
    fn test_capturing_sink_records_in_order() {
        let sink = CapturingTelemetry::new();
        sink.record(sample(Stage::LedgerLookup, true));
        sink.record(sample(Stage::Extract, false));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, Stage::LedgerLookup);
        assert_eq!(events[1].stage, Stage::Extract);
        assert_eq!(
            events[1].error_class.as_deref(),
            Some("transient_downstream")
        );
    }

    #[test]
    fn test_for_stage_filters() {
        let sink = CapturingTelemetry::new();
        sink.record(sample(Stage::Extract, true));
        sink.record(sample(Stage::DownstreamWrite, true));
        sink.record(sample(Stage::Extract, false));

        assert_eq!(sink.for_stage(Stage::Extract).len(), 2);
        assert_eq!(sink.for_stage(Stage::DownstreamWrite).len(), 1);
        assert!(sink.for_stage(Stage::Normalize).is_empty());
    }

    #[test]
    fn test_tracing_sink_never_panics() {
        let sink = TracingTelemetry;
        sink.record(sample(Stage::Normalize, true));
        sink.record(sample(Stage::Normalize, false));
    }

    #[test]
    fn test_null_sink_drops() {
        let sink = NullTelemetry;
        sink.record(sample(Stage::SelectTier, true));
    }
}
