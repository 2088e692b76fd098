//! # inflow-pipeline
//!
//! The resilient ingestion transaction for inflow:
//!
//! - [`Invoker`]: generic rate-limit-aware call wrapper with exponential
//!   backoff, jitter, per-resource cooldowns, and a fallback hook
//! - [`TransactionCoordinator`]: idempotent multi-system commit driving
//!   ledger lookup → normalization → tier selection → invoked extraction →
//!   durable write → downstream write → ledger finalize
//! - HTTP adapter for the downstream records API
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inflow_core::IntakeEvent;
//! use inflow_db::Database;
//! use inflow_extract::HttpExtractionBackend;
//! use inflow_pipeline::{HttpRecordsClient, TransactionCoordinator};
//!
//! let db = Database::connect("postgres://...").await?;
//! let coordinator = TransactionCoordinator::new(
//!     db.ledger.clone(),
//!     db.results.clone(),
//!     Arc::new(HttpRecordsClient::from_env().expect("records api configured")),
//!     Arc::new(HttpExtractionBackend::from_env().expect("extraction configured")),
//! );
//!
//! let event = IntakeEvent::new("msg-123", "raw inbound text")
//!     .with_sender("Jane Doe <jane@example.com>");
//! let outcome = coordinator.process(event).await?;
//! println!("{:?} -> {:?}", outcome.status, outcome.downstream_ids);
//! ```

pub mod adapters;
pub mod coordinator;
pub mod invoker;

// Re-export core types
pub use inflow_core::*;

pub use adapters::{HttpRecordsClient, HttpRecordsConfig};
pub use coordinator::{CoordinatorConfig, TransactionCoordinator};
pub use invoker::{CooldownStore, Invoked, Invoker, MemoryCooldownStore, RetryPolicy};
