//! Idempotency ledger repository (PostgreSQL).
//!
//! The `pending` insert is the linearization point for one external id: it
//! uses `INSERT ... ON CONFLICT DO NOTHING ... RETURNING`, so exactly one
//! caller wins and every other caller observes the existing row. Status
//! transitions are guarded UPDATEs — a `complete` record is never demoted.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;

use inflow_core::{
    DownstreamIds, Error, IdempotencyRecord, LedgerRepository, LedgerStatus, Result,
};

/// PostgreSQL implementation of [`LedgerRepository`].
pub struct PgLedgerRepository {
    pool: Pool<Postgres>,
}

impl PgLedgerRepository {
    /// Create a new repository over the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a ledger row into an IdempotencyRecord.
    fn parse_row(row: sqlx::postgres::PgRow) -> Result<IdempotencyRecord> {
        let status: String = row.get("status");
        let downstream_ids: Option<serde_json::Value> = row.get("downstream_ids");
        let downstream_ids = downstream_ids
            .map(serde_json::from_value::<DownstreamIds>)
            .transpose()?;

        Ok(IdempotencyRecord {
            external_id: row.get("external_id"),
            status: LedgerStatus::from_str_loose(&status),
            downstream_ids,
            error_class: row.get("error_class"),
            error_summary: row.get("error_summary"),
            manual_review: row.get("manual_review"),
            degraded: row.get("degraded"),
            first_seen_at: row.get("first_seen_at"),
            last_attempt_at: row.get("last_attempt_at"),
            attempt_count: row.get("attempt_count"),
        })
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn insert_pending(&self, external_id: &str) -> Result<bool> {
        let now = Utc::now();

        // Atomic insert-if-absent: only one caller per external id gets a
        // row back. Losers see the existing record via get().
        let inserted = sqlx::query_scalar::<_, String>(
            "INSERT INTO intake_ledger
                 (external_id, status, first_seen_at, last_attempt_at, attempt_count)
             VALUES ($1, 'pending', $2, $2, 1)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING external_id",
        )
        .bind(external_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(inserted.is_some())
    }

    async fn get(&self, external_id: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            "SELECT external_id, status, downstream_ids, error_class, error_summary,
                    manual_review, degraded, first_seen_at, last_attempt_at, attempt_count
             FROM intake_ledger
             WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn record_attempt(&self, external_id: &str) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE intake_ledger
             SET last_attempt_at = $2, attempt_count = attempt_count + 1
             WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn mark_complete(
        &self,
        external_id: &str,
        ids: &DownstreamIds,
        degraded: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let ids_json = serde_json::to_value(ids)?;

        let result = sqlx::query(
            "UPDATE intake_ledger
             SET status = 'complete', downstream_ids = $2, degraded = $3,
                 error_class = NULL, error_summary = NULL, manual_review = FALSE,
                 last_attempt_at = $4
             WHERE external_id = $1 AND status <> 'complete'",
        )
        .bind(external_id)
        .bind(&ids_json)
        .bind(degraded)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            // Either the record is already complete (an idempotent no-op) or
            // it never existed, which is a pipeline ordering bug.
            match self.get(external_id).await? {
                Some(record) if record.status == LedgerStatus::Complete => Ok(()),
                Some(_) => Err(Error::Internal(format!(
                    "ledger record for {} not updatable to complete",
                    external_id
                ))),
                None => Err(Error::Internal(format!(
                    "no ledger record for {} at finalize",
                    external_id
                ))),
            }
        } else {
            Ok(())
        }
    }

    async fn mark_partial_failed(
        &self,
        external_id: &str,
        error_class: &str,
        error_summary: &str,
        manual_review: bool,
    ) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE intake_ledger
             SET status = 'partial_failed', error_class = $2, error_summary = $3,
                 manual_review = $4, last_attempt_at = $5
             WHERE external_id = $1 AND status <> 'complete'",
        )
        .bind(external_id)
        .bind(error_class)
        .bind(error_summary)
        .bind(manual_review)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            match self.get(external_id).await? {
                Some(record) if record.status == LedgerStatus::Complete => {
                    // Never demote a complete record.
                    warn!(
                        event_id = external_id,
                        "Ignoring partial_failed transition for complete ledger record"
                    );
                    Ok(())
                }
                _ => Err(Error::Internal(format!(
                    "no ledger record for {} at partial finalize",
                    external_id
                ))),
            }
        } else {
            Ok(())
        }
    }
}
