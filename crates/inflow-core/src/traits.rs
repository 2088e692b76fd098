//! Core traits for the ingestion transaction seams.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and deterministic test fakes for the
//! durable store, the downstream system-of-record, and the normalizer.

use async_trait::async_trait;

use crate::correlation::CorrelationContext;
use crate::error::Result;
use crate::models::{DownstreamIds, IdempotencyRecord, StructuredResult, TierDecision};

/// Durable idempotency ledger keyed by external event id.
///
/// The `pending` row is the cross-process concurrency guard: `insert_pending`
/// must be atomic insert-if-absent, and only one caller may win it per
/// external id. Records are never deleted by the core; reconciliation tooling
/// may purge them.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Insert a `pending` record if no record exists for `external_id`.
    ///
    /// Returns `true` when this caller won the insert (the linearization
    /// point for the event), `false` when a record already exists.
    async fn insert_pending(&self, external_id: &str) -> Result<bool>;

    /// Fetch the record for an external id.
    async fn get(&self, external_id: &str) -> Result<Option<IdempotencyRecord>>;

    /// Bump `attempt_count` and `last_attempt_at` for a resumed record.
    async fn record_attempt(&self, external_id: &str) -> Result<()>;

    /// Transition to `complete`, storing the downstream keys.
    ///
    /// Must never demote a record that is already `complete`.
    async fn mark_complete(
        &self,
        external_id: &str,
        ids: &DownstreamIds,
        degraded: bool,
    ) -> Result<()>;

    /// Transition to `partial_failed`, recording the failure for later
    /// resumption. Must never demote a `complete` record.
    async fn mark_partial_failed(
        &self,
        external_id: &str,
        error_class: &str,
        error_summary: &str,
        manual_review: bool,
    ) -> Result<()>;
}

/// Durable cache of extracted results, written before any downstream side
/// effect so resumption never re-runs extraction.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the cached result for an external id.
    async fn upsert(
        &self,
        external_id: &str,
        result: &StructuredResult,
        decision: Option<&TierDecision>,
    ) -> Result<()>;

    /// Fetch the cached result for an external id.
    async fn get(&self, external_id: &str) -> Result<Option<StructuredResult>>;
}

/// Downstream system-of-record (CRM-shaped) write interface.
///
/// Assumed network-fallible and rate-limited; callers wrap it with the
/// invoker.
#[async_trait]
pub trait DownstreamApi: Send + Sync {
    /// Create or update the record(s) for one event. Idempotent on the
    /// downstream side only if the downstream makes it so; the ledger is what
    /// guarantees at-most-once invocation per external id.
    async fn create_or_update(
        &self,
        external_id: &str,
        result: &StructuredResult,
        ctx: &CorrelationContext,
    ) -> Result<DownstreamIds>;
}

/// Pure field-normalization transform, supplied by the surrounding system.
///
/// Business formatting rules live behind this seam and are out of scope for
/// the core.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, result: StructuredResult) -> StructuredResult;
}

/// Normalizer that returns its input untouched.
#[derive(Debug, Default, Clone)]
pub struct IdentityNormalizer;

impl Normalizer for IdentityNormalizer {
    fn normalize(&self, result: StructuredResult) -> StructuredResult {
        result
    }
}
