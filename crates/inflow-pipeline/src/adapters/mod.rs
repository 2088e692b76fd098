//! Adapters binding the pipeline's trait seams to concrete services.

pub mod records;

pub use records::{HttpRecordsClient, HttpRecordsConfig};
