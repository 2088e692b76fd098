//! Mock extraction backend for deterministic testing.
//!
//! Outcomes are scripted per call rather than sampled from a failure rate,
//! so retry and fallback paths can be exercised exactly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use inflow_core::{CorrelationContext, Error, ExtractionTier, Result, StructuredResult};

use crate::backend::ExtractionBackend;

/// Scripted outcome for one extraction call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this result.
    Success(StructuredResult),
    /// Fail with a rate-limit error, optionally carrying a retry-after hint.
    RateLimited(Option<Duration>),
    /// Fail with a retryable transient error.
    Transient,
    /// Fail with a non-retryable extraction error.
    Permanent,
}

/// One observed call, for assertions.
#[derive(Debug, Clone)]
pub struct MockExtractCall {
    pub text_chars: usize,
    pub tier: ExtractionTier,
    pub external_id: String,
}

/// Mock extraction backend with a scripted outcome queue and a call log.
#[derive(Clone, Default)]
pub struct MockExtractionBackend {
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    calls: Arc<Mutex<Vec<MockExtractCall>>>,
    default_result: Arc<Mutex<StructuredResult>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result returned when the script queue is empty.
    pub fn with_default_result(self, result: StructuredResult) -> Self {
        *self.default_result.lock().unwrap() = result;
        self
    }

    /// Queue one scripted outcome (consumed in FIFO order).
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Queue the same outcome `n` times.
    pub fn push_outcomes(&self, outcome: MockOutcome, n: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..n {
            script.push_back(outcome.clone());
        }
    }

    /// All observed calls.
    pub fn calls(&self) -> Vec<MockExtractCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of extraction calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn extract(
        &self,
        text: &str,
        tier: ExtractionTier,
        ctx: &CorrelationContext,
    ) -> Result<StructuredResult> {
        self.calls.lock().unwrap().push(MockExtractCall {
            text_chars: text.chars().count(),
            tier,
            external_id: ctx.external_id.clone(),
        });

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            None => Ok(self.default_result.lock().unwrap().clone()),
            Some(MockOutcome::Success(result)) => Ok(result),
            Some(MockOutcome::RateLimited(retry_after)) => Err(Error::RateLimited {
                resource: self.resource_key(tier),
                retry_after,
            }),
            Some(MockOutcome::Transient) => {
                Err(Error::TransientDownstream("mock transient failure".into()))
            }
            Some(MockOutcome::Permanent) => {
                Err(Error::Extraction("mock permanent failure".into()))
            }
        }
    }

    fn resource_key(&self, tier: ExtractionTier) -> String {
        format!("mock-extract:{}", tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CorrelationContext {
        CorrelationContext::new("evt-1")
    }

    #[tokio::test]
    async fn test_default_success_when_script_empty() {
        let backend = MockExtractionBackend::new().with_default_result(StructuredResult {
            email: Some("jane@example.com".into()),
            ..Default::default()
        });

        let result = backend
            .extract("text", ExtractionTier::Lite, &ctx())
            .await
            .unwrap();
        assert_eq!(result.email.as_deref(), Some("jane@example.com"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_outcomes_consumed_in_order() {
        let backend = MockExtractionBackend::new();
        backend.push_outcome(MockOutcome::RateLimited(Some(Duration::from_secs(2))));
        backend.push_outcome(MockOutcome::Success(StructuredResult::default()));

        let err = backend
            .extract("a", ExtractionTier::Standard, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));

        let ok = backend.extract("a", ExtractionTier::Standard, &ctx()).await;
        assert!(ok.is_ok());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_call_log_records_tier_and_id() {
        let backend = MockExtractionBackend::new();
        backend
            .extract("hello", ExtractionTier::Deep, &ctx())
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tier, ExtractionTier::Deep);
        assert_eq!(calls[0].text_chars, 5);
        assert_eq!(calls[0].external_id, "evt-1");
    }
}
