//! Cached structured-result store (PostgreSQL).
//!
//! The coordinator persists the extracted result here before any downstream
//! side effect, so a resumed `partial_failed` event can re-run only the
//! downstream write. The tier decision is stored beside the result for
//! auditability.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};

use inflow_core::{Error, Result, ResultStore, StructuredResult, TierDecision};

/// PostgreSQL implementation of [`ResultStore`].
pub struct PgResultStore {
    pool: Pool<Postgres>,
}

impl PgResultStore {
    /// Create a new store over the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn upsert(
        &self,
        external_id: &str,
        result: &StructuredResult,
        decision: Option<&TierDecision>,
    ) -> Result<()> {
        let now = Utc::now();
        let result_json = serde_json::to_value(result)?;
        let decision_json = decision.map(serde_json::to_value).transpose()?;

        sqlx::query(
            "INSERT INTO intake_results (external_id, result, tier_decision, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (external_id) DO UPDATE
             SET result = EXCLUDED.result,
                 tier_decision = EXCLUDED.tier_decision,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(external_id)
        .bind(&result_json)
        .bind(&decision_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn get(&self, external_id: &str) -> Result<Option<StructuredResult>> {
        let row = sqlx::query("SELECT result FROM intake_results WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(|r| {
            let value: serde_json::Value = r.get("result");
            serde_json::from_value(value).map_err(Into::into)
        })
        .transpose()
    }
}
