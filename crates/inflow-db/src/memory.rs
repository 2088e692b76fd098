//! In-memory ledger and result store.
//!
//! Always compiled (not test-gated) so integration tests across the
//! workspace can exercise the full transaction without a live database.
//! Both stores reproduce the Postgres implementations' atomic semantics:
//! `insert_pending` is insert-if-absent under one lock, and `complete`
//! records are never demoted.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use inflow_core::{
    DownstreamIds, Error, IdempotencyRecord, LedgerRepository, LedgerStatus, Result, ResultStore,
    StructuredResult, TierDecision,
};

/// In-memory [`LedgerRepository`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, for assertions.
    pub fn records(&self) -> Vec<IdempotencyRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Number of records in the ledger.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    /// Overwrite a record's last_attempt_at, for takeover/staleness tests.
    pub fn set_last_attempt_at(&self, external_id: &str, at: chrono::DateTime<Utc>) {
        if let Some(record) = self.records.lock().unwrap().get_mut(external_id) {
            record.last_attempt_at = at;
        }
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedger {
    async fn insert_pending(&self, external_id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(external_id) {
            return Ok(false);
        }
        let now = Utc::now();
        records.insert(
            external_id.to_string(),
            IdempotencyRecord {
                external_id: external_id.to_string(),
                status: LedgerStatus::Pending,
                downstream_ids: None,
                error_class: None,
                error_summary: None,
                manual_review: false,
                degraded: false,
                first_seen_at: now,
                last_attempt_at: now,
                attempt_count: 1,
            },
        );
        Ok(true)
    }

    async fn get(&self, external_id: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.records.lock().unwrap().get(external_id).cloned())
    }

    async fn record_attempt(&self, external_id: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(external_id) {
            record.last_attempt_at = Utc::now();
            record.attempt_count += 1;
        }
        Ok(())
    }

    async fn mark_complete(
        &self,
        external_id: &str,
        ids: &DownstreamIds,
        degraded: bool,
    ) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(external_id) {
            Some(record) if record.status == LedgerStatus::Complete => Ok(()),
            Some(record) => {
                record.status = LedgerStatus::Complete;
                record.downstream_ids = Some(ids.clone());
                record.degraded = degraded;
                record.error_class = None;
                record.error_summary = None;
                record.manual_review = false;
                record.last_attempt_at = Utc::now();
                Ok(())
            }
            None => Err(Error::Internal(format!(
                "no ledger record for {} at finalize",
                external_id
            ))),
        }
    }

    async fn mark_partial_failed(
        &self,
        external_id: &str,
        error_class: &str,
        error_summary: &str,
        manual_review: bool,
    ) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(external_id) {
            Some(record) if record.status == LedgerStatus::Complete => {
                warn!(
                    event_id = external_id,
                    "Ignoring partial_failed transition for complete ledger record"
                );
                Ok(())
            }
            Some(record) => {
                record.status = LedgerStatus::PartialFailed;
                record.error_class = Some(error_class.to_string());
                record.error_summary = Some(error_summary.to_string());
                record.manual_review = manual_review;
                record.last_attempt_at = Utc::now();
                Ok(())
            }
            None => Err(Error::Internal(format!(
                "no ledger record for {} at partial finalize",
                external_id
            ))),
        }
    }
}

/// In-memory [`ResultStore`].
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<String, (StructuredResult, Option<TierDecision>)>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored tier decision for an external id, for assertions.
    pub fn decision(&self, external_id: &str) -> Option<TierDecision> {
        self.results
            .lock()
            .unwrap()
            .get(external_id)
            .and_then(|(_, d)| d.clone())
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    /// Whether the store holds no results.
    pub fn is_empty(&self) -> bool {
        self.results.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn upsert(
        &self,
        external_id: &str,
        result: &StructuredResult,
        decision: Option<&TierDecision>,
    ) -> Result<()> {
        self.results.lock().unwrap().insert(
            external_id.to_string(),
            (result.clone(), decision.cloned()),
        );
        Ok(())
    }

    async fn get(&self, external_id: &str) -> Result<Option<StructuredResult>> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(external_id)
            .map(|(r, _)| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_pending_is_insert_if_absent() {
        let ledger = MemoryLedger::new();
        assert!(ledger.insert_pending("evt-1").await.unwrap());
        assert!(!ledger.insert_pending("evt-1").await.unwrap());
        assert_eq!(ledger.len(), 1);

        let record = ledger.get("evt-1").await.unwrap().unwrap();
        assert_eq!(record.status, LedgerStatus::Pending);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_mark_complete_stores_ids() {
        let ledger = MemoryLedger::new();
        ledger.insert_pending("evt-1").await.unwrap();

        let ids = DownstreamIds::new("person-1");
        ledger.mark_complete("evt-1", &ids, false).await.unwrap();

        let record = ledger.get("evt-1").await.unwrap().unwrap();
        assert_eq!(record.status, LedgerStatus::Complete);
        assert_eq!(record.downstream_ids, Some(ids));
        assert!(!record.manual_review);
    }

    #[tokio::test]
    async fn test_complete_is_never_demoted() {
        let ledger = MemoryLedger::new();
        ledger.insert_pending("evt-1").await.unwrap();
        ledger
            .mark_complete("evt-1", &DownstreamIds::new("person-1"), false)
            .await
            .unwrap();

        ledger
            .mark_partial_failed("evt-1", "transient_downstream", "late failure", false)
            .await
            .unwrap();

        let record = ledger.get("evt-1").await.unwrap().unwrap();
        assert_eq!(record.status, LedgerStatus::Complete);
        assert!(record.downstream_ids.is_some());
    }

    #[tokio::test]
    async fn test_mark_partial_failed_records_error() {
        let ledger = MemoryLedger::new();
        ledger.insert_pending("evt-1").await.unwrap();
        ledger
            .mark_partial_failed("evt-1", "permanent_downstream", "rejected", true)
            .await
            .unwrap();

        let record = ledger.get("evt-1").await.unwrap().unwrap();
        assert_eq!(record.status, LedgerStatus::PartialFailed);
        assert_eq!(record.error_class.as_deref(), Some("permanent_downstream"));
        assert!(record.manual_review);
    }

    #[tokio::test]
    async fn test_finalize_without_record_is_an_error() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .mark_complete("missing", &DownstreamIds::new("x"), false)
            .await
            .unwrap_err();
        assert_eq!(err.class(), "internal");
    }

    #[tokio::test]
    async fn test_record_attempt_bumps_count() {
        let ledger = MemoryLedger::new();
        ledger.insert_pending("evt-1").await.unwrap();
        ledger.record_attempt("evt-1").await.unwrap();
        ledger.record_attempt("evt-1").await.unwrap();

        let record = ledger.get("evt-1").await.unwrap().unwrap();
        assert_eq!(record.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_result_store_round_trip() {
        let store = MemoryResultStore::new();
        let result = StructuredResult {
            email: Some("jane@example.com".into()),
            ..Default::default()
        };
        store.upsert("evt-1", &result, None).await.unwrap();

        let cached = store.get("evt-1").await.unwrap().unwrap();
        assert_eq!(cached, result);
        assert!(store.get("evt-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_result_store_upsert_replaces() {
        let store = MemoryResultStore::new();
        store
            .upsert("evt-1", &StructuredResult::default(), None)
            .await
            .unwrap();

        let newer = StructuredResult {
            phone: Some("+1 555 0100".into()),
            ..Default::default()
        };
        store.upsert("evt-1", &newer, None).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("evt-1").await.unwrap().unwrap(), newer);
    }
}
