//! # inflow-db
//!
//! PostgreSQL durable store for the inflow ingestion pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The idempotency ledger repository (atomic insert-if-absent pending rows,
//!   guarded status transitions)
//! - The cached structured-result store
//! - In-memory implementations of both stores for tests and embedders
//!
//! Schema DDL lives in `migrations/`; consumers manage migration execution.
//!
//! ## Example
//!
//! ```rust,ignore
//! use inflow_db::Database;
//! use inflow_core::LedgerRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/inflow").await?;
//!     let won = db.ledger.insert_pending("evt-1").await?;
//!     println!("won the pending insert: {}", won);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use sqlx::PgPool;

use inflow_core::Result;

pub mod ledger;
pub mod memory;
pub mod pool;
pub mod results;

// Re-export core types
pub use inflow_core::*;

pub use ledger::PgLedgerRepository;
pub use memory::{MemoryLedger, MemoryResultStore};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use results::PgResultStore;

/// Bundle of the durable stores over one connection pool.
#[derive(Clone)]
pub struct Database {
    pub ledger: Arc<PgLedgerRepository>,
    pub results: Arc<PgResultStore>,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build the store bundle over an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(PgLedgerRepository::new(pool.clone())),
            results: Arc::new(PgResultStore::new(pool)),
        }
    }
}
