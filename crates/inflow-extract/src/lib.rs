//! # inflow-extract
//!
//! Extraction side of the inflow pipeline:
//!
//! - Cost-bounded tier selection ([`TierSelector`])
//! - Adaptive extraction backend abstraction ([`ExtractionBackend`]) with an
//!   HTTP sidecar client
//! - Deterministic fallback extraction ([`PatternExtractor`]) for when the
//!   adaptive path is unavailable
//! - A scripted mock backend for tests

pub mod backend;
pub mod fallback;
pub mod mock;
pub mod selector;

// Re-export core types
pub use inflow_core::{ExtractionTier, StructuredResult, TierDecision};

pub use backend::{
    parse_retry_after, ExtractionBackend, HttpExtractionBackend, HttpExtractionConfig,
};
pub use fallback::{ExtractionHints, PatternExtractor};
pub use mock::{MockExtractCall, MockExtractionBackend, MockOutcome};
pub use selector::{TierCosts, TierSelector, TierThresholds};
