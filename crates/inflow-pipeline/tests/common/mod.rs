//! Shared fixtures for transaction tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use inflow_core::{
    CorrelationContext, DownstreamApi, DownstreamIds, Error, Result, StructuredResult,
};

/// Scripted outcome for one downstream call.
#[derive(Debug, Clone)]
pub enum DownstreamOutcome {
    /// Succeed with these ids.
    Success(DownstreamIds),
    /// Fail with a retryable transient error.
    Transient,
    /// Fail with a permanent business-rule rejection.
    Permanent,
    /// Fail with a rate-limit error carrying an optional hint.
    RateLimited(Option<Duration>),
    /// Sleep, then succeed (for deadline and race tests).
    SleepThenSuccess(Duration),
}

/// Scripted [`DownstreamApi`] with call accounting.
#[derive(Default)]
pub struct ScriptedDownstream {
    script: Mutex<VecDeque<DownstreamOutcome>>,
    calls: AtomicUsize,
    successes: AtomicUsize,
    last_payload: Mutex<Option<StructuredResult>>,
}

impl ScriptedDownstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: DownstreamOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn push_n(&self, outcome: DownstreamOutcome, n: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..n {
            script.push_back(outcome.clone());
        }
    }

    /// Total create-or-update invocations.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Invocations that returned success (i.e., records actually created).
    pub fn success_count(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    /// The payload of the most recent call.
    pub fn last_payload(&self) -> Option<StructuredResult> {
        self.last_payload.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamApi for ScriptedDownstream {
    async fn create_or_update(
        &self,
        external_id: &str,
        result: &StructuredResult,
        _ctx: &CorrelationContext,
    ) -> Result<DownstreamIds> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = Some(result.clone());

        let outcome = self.script.lock().unwrap().pop_front();
        match outcome {
            None => {
                self.successes.fetch_add(1, Ordering::SeqCst);
                Ok(DownstreamIds::new(format!("person-{}", external_id)))
            }
            Some(DownstreamOutcome::Success(ids)) => {
                self.successes.fetch_add(1, Ordering::SeqCst);
                Ok(ids)
            }
            Some(DownstreamOutcome::Transient) => Err(Error::TransientDownstream(
                "scripted transient failure".into(),
            )),
            Some(DownstreamOutcome::Permanent) => Err(Error::PermanentDownstream(
                "scripted payload rejection".into(),
            )),
            Some(DownstreamOutcome::RateLimited(retry_after)) => Err(Error::RateLimited {
                resource: "records-api".into(),
                retry_after,
            }),
            Some(DownstreamOutcome::SleepThenSuccess(delay)) => {
                tokio::time::sleep(delay).await;
                self.successes.fetch_add(1, Ordering::SeqCst);
                Ok(DownstreamIds::new(format!("person-{}", external_id)))
            }
        }
    }
}
