//! Correlation context threaded through one event's processing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::IntakeEvent;
use crate::uuid_utils::new_v7;

/// Identity pair carried through every log, telemetry, and error surface for
/// one event: the ingress-generated correlation id plus the external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub correlation_id: Uuid,
    pub external_id: String,
}

impl CorrelationContext {
    /// Create a fresh context (generates a new correlation id).
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            correlation_id: new_v7(),
            external_id: external_id.into(),
        }
    }

    /// Context for an event whose correlation id was stamped at ingress.
    pub fn for_event(event: &IntakeEvent) -> Self {
        Self {
            correlation_id: event.correlation_id,
            external_id: event.external_id.clone(),
        }
    }
}
