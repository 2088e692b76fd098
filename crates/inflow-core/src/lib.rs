//! # inflow-core
//!
//! Core types, traits, and abstractions for the inflow ingestion pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other inflow crates depend on: the error taxonomy, the event and
//! ledger models, the correlation context, the telemetry contract, and the
//! seams for the durable store, downstream system-of-record, and normalizer.

pub mod correlation;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod telemetry;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use correlation::CorrelationContext;
pub use error::{Error, ProcessError, Result};
pub use models::{
    DownstreamIds, ExtractionTier, IdempotencyRecord, IntakeEvent, LedgerStatus, ProcessOutcome,
    ProcessStatus, StructuredResult, TierDecision,
};
pub use telemetry::{
    CapturingTelemetry, NullTelemetry, Stage, StageEvent, TelemetrySink, TracingTelemetry,
};
pub use traits::{DownstreamApi, IdentityNormalizer, LedgerRepository, Normalizer, ResultStore};
pub use uuid_utils::{extract_timestamp, new_v7};
