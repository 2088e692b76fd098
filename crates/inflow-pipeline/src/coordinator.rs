//! Transaction coordinator for one inbound event.
//!
//! Drives the full ingestion transaction: ledger lookup → normalization →
//! tier selection → invoked extraction (with fallback) → durable result
//! write → downstream system-of-record write → ledger finalize. The ledger's
//! `pending` row is the cross-process concurrency guard; no in-process lock
//! is held across any suspension point, so replay after a crash or
//! cancellation is always safe.
//!
//! Ordering invariant: the durable result write always precedes the
//! downstream call, so a missing cached result implies no downstream write
//! was attempted and a `complete` record implies the downstream call
//! returned success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use inflow_core::defaults;
use inflow_core::{
    CorrelationContext, DownstreamApi, Error, IdempotencyRecord, IdentityNormalizer, IntakeEvent,
    LedgerRepository, LedgerStatus, Normalizer, ProcessError, ProcessOutcome, ProcessStatus,
    ResultStore, Stage, StageEvent, StructuredResult, TelemetrySink, TracingTelemetry,
};
use inflow_extract::{ExtractionBackend, ExtractionHints, PatternExtractor, TierSelector};

use crate::invoker::Invoker;

/// Tunables for one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Overall deadline for one `process` call.
    pub process_deadline: Duration,
    /// Timeout for the downstream system-of-record call.
    pub downstream_timeout: Duration,
    /// Per-event extraction budget in dollars.
    pub context_budget_usd: f64,
    /// Extraction quality target (0.0–1.0).
    pub quality_target: f32,
    /// Poll interval while waiting for a concurrent caller's outcome.
    pub replay_poll_interval: Duration,
    /// Outcome polls before giving up on a concurrent caller.
    pub replay_poll_attempts: u32,
    /// Age after which a `pending` record counts as abandoned and is taken
    /// over instead of waited on.
    pub pending_takeover_after: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            process_deadline: Duration::from_secs(defaults::PROCESS_DEADLINE_SECS),
            downstream_timeout: Duration::from_secs(defaults::DOWNSTREAM_TIMEOUT_SECS),
            context_budget_usd: defaults::CONTEXT_BUDGET_USD,
            quality_target: defaults::QUALITY_TARGET,
            replay_poll_interval: Duration::from_millis(defaults::REPLAY_POLL_INTERVAL_MS),
            replay_poll_attempts: defaults::REPLAY_POLL_ATTEMPTS,
            pending_takeover_after: Duration::from_secs(defaults::PENDING_TAKEOVER_AFTER_SECS),
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables (with defaults).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var(defaults::ENV_CONTEXT_BUDGET_USD) {
            if let Ok(budget) = v.parse::<f64>() {
                config.context_budget_usd = budget;
            } else {
                tracing::warn!(value = %v, "Invalid INFLOW_CONTEXT_BUDGET_USD, using default");
            }
        }
        config
    }

    /// Set the overall process deadline.
    pub fn with_process_deadline(mut self, deadline: Duration) -> Self {
        self.process_deadline = deadline;
        self
    }

    /// Set the downstream call timeout.
    pub fn with_downstream_timeout(mut self, timeout: Duration) -> Self {
        self.downstream_timeout = timeout;
        self
    }

    /// Set the per-event extraction budget.
    pub fn with_context_budget(mut self, budget_usd: f64) -> Self {
        self.context_budget_usd = budget_usd;
        self
    }

    /// Set the quality target.
    pub fn with_quality_target(mut self, target: f32) -> Self {
        self.quality_target = target.clamp(0.0, 1.0);
        self
    }

    /// Set the concurrent-caller poll cadence.
    pub fn with_replay_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.replay_poll_interval = interval;
        self.replay_poll_attempts = attempts;
        self
    }

    /// Set the pending-takeover age.
    pub fn with_pending_takeover_after(mut self, age: Duration) -> Self {
        self.pending_takeover_after = age;
        self
    }
}

/// Coordinates the ingestion transaction for inbound events.
///
/// All collaborators are injected; tests use the in-memory stores and a
/// scripted extraction backend.
pub struct TransactionCoordinator {
    ledger: Arc<dyn LedgerRepository>,
    results: Arc<dyn ResultStore>,
    downstream: Arc<dyn DownstreamApi>,
    extractor: Arc<dyn ExtractionBackend>,
    normalizer: Arc<dyn Normalizer>,
    selector: TierSelector,
    fallback: PatternExtractor,
    invoker: Invoker,
    telemetry: Arc<dyn TelemetrySink>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    /// Create a coordinator with default selector, fallback, invoker,
    /// telemetry, and config.
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        results: Arc<dyn ResultStore>,
        downstream: Arc<dyn DownstreamApi>,
        extractor: Arc<dyn ExtractionBackend>,
    ) -> Self {
        Self {
            ledger,
            results,
            downstream,
            extractor,
            normalizer: Arc::new(IdentityNormalizer),
            selector: TierSelector::default(),
            fallback: PatternExtractor::new(),
            invoker: Invoker::default(),
            telemetry: Arc::new(TracingTelemetry),
            config: CoordinatorConfig::default(),
        }
    }

    /// Replace the normalizer.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Replace the tier selector.
    pub fn with_selector(mut self, selector: TierSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the fallback extractor.
    pub fn with_fallback(mut self, fallback: PatternExtractor) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replace the invoker (retry policy + cooldown store).
    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Replace the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Process one inbound event under the configured deadline.
    pub async fn process(
        &self,
        event: IntakeEvent,
    ) -> std::result::Result<ProcessOutcome, ProcessError> {
        self.process_with_deadline(event, self.config.process_deadline)
            .await
    }

    /// Process one inbound event, cancelling when `deadline` elapses.
    ///
    /// Cancellation after the pending insert leaves the record `pending`;
    /// a later call with the same external id resumes cleanly. A `complete`
    /// record is only ever written after a successful downstream call.
    pub async fn process_with_deadline(
        &self,
        event: IntakeEvent,
        deadline: Duration,
    ) -> std::result::Result<ProcessOutcome, ProcessError> {
        let ctx = CorrelationContext::for_event(&event);

        match tokio::time::timeout(deadline, self.run(&ctx, event)).await {
            Ok(result) => result.map_err(|kind| ProcessError {
                correlation_id: ctx.correlation_id,
                event_id: Some(ctx.external_id.clone()),
                kind,
            }),
            Err(_) => Err(ProcessError {
                correlation_id: ctx.correlation_id,
                event_id: Some(ctx.external_id.clone()),
                kind: Error::DeadlineExceeded(format!(
                    "process exceeded {} ms",
                    deadline.as_millis()
                )),
            }),
        }
    }

    async fn run(
        &self,
        ctx: &CorrelationContext,
        event: IntakeEvent,
    ) -> inflow_core::Result<ProcessOutcome> {
        // Malformed events are rejected before any ledger write and never
        // retried.
        event.validate()?;

        let started = Instant::now();
        let existing = self.ledger.get(&event.external_id).await;
        self.emit(ctx, Stage::LedgerLookup, started, existing.as_ref().err());
        let existing = existing?;

        match existing {
            Some(record) if record.status == LedgerStatus::Complete => {
                debug!(
                    event_id = %ctx.external_id,
                    correlation_id = %ctx.correlation_id,
                    "Replay of completed event, returning stored outcome"
                );
                Ok(Self::replayed_outcome(ctx, &record))
            }
            Some(record) if record.status == LedgerStatus::PartialFailed => {
                self.ledger.record_attempt(&event.external_id).await?;
                let cached = self.results.get(&event.external_id).await?;
                self.execute(ctx, &event, cached).await
            }
            Some(record) => {
                // Pending: either another caller is in flight or an earlier
                // run died. Fresh records are waited on; stale ones are
                // taken over.
                let age = (chrono::Utc::now() - record.last_attempt_at)
                    .to_std()
                    .unwrap_or_default();
                if age < self.config.pending_takeover_after {
                    self.await_concurrent(ctx).await
                } else {
                    warn!(
                        event_id = %ctx.external_id,
                        correlation_id = %ctx.correlation_id,
                        age_secs = age.as_secs(),
                        "Taking over abandoned pending record"
                    );
                    self.ledger.record_attempt(&event.external_id).await?;
                    let cached = self.results.get(&event.external_id).await?;
                    self.execute(ctx, &event, cached).await
                }
            }
            None => {
                // The pending insert is the linearization point: exactly one
                // caller per external id wins it.
                if self.ledger.insert_pending(&event.external_id).await? {
                    self.execute(ctx, &event, None).await
                } else {
                    self.await_concurrent(ctx).await
                }
            }
        }
    }

    /// Run extraction (unless a cached result exists), persist, write
    /// downstream, and finalize the ledger.
    async fn execute(
        &self,
        ctx: &CorrelationContext,
        event: &IntakeEvent,
        cached: Option<StructuredResult>,
    ) -> inflow_core::Result<ProcessOutcome> {
        let (result, decision) = match cached {
            Some(result) => {
                debug!(
                    event_id = %ctx.external_id,
                    correlation_id = %ctx.correlation_id,
                    "Resuming with cached structured result"
                );
                (result, None)
            }
            None => {
                // Candidate fields from the event envelope, normalized by
                // the external collaborator.
                let started = Instant::now();
                let candidates = self.normalizer.normalize(Self::envelope_candidates(event));
                self.emit(ctx, Stage::Normalize, started, None);

                // Tier selection is pure; it never exceeds the budget
                // without flagging the decision.
                let started = Instant::now();
                let decision = self.selector.select(
                    &event.payload,
                    self.config.context_budget_usd,
                    self.config.quality_target,
                );
                self.emit(ctx, Stage::SelectTier, started, None);
                debug!(
                    event_id = %ctx.external_id,
                    correlation_id = %ctx.correlation_id,
                    tier = decision.tier.as_str(),
                    estimated_cost = decision.estimated_cost,
                    budget_constrained = decision.budget_constrained,
                    "Selected extraction tier"
                );

                let started = Instant::now();
                let extracted = self.extract_with_fallback(ctx, event, decision.tier).await;
                self.emit(ctx, Stage::Extract, started, extracted.as_ref().err());
                let mut result = extracted?;
                result.fill_missing_from(&candidates);
                (result, Some(decision))
            }
        };

        let degraded = result.degraded;

        // Durable write must precede the downstream call. Failure here
        // aborts with the record left pending, so a retry is idempotent.
        let started = Instant::now();
        let persisted = self
            .results
            .upsert(&event.external_id, &result, decision.as_ref())
            .await;
        self.emit(ctx, Stage::PersistResult, started, persisted.as_ref().err());
        persisted?;

        // Downstream write through the invoker: rate limits back off, other
        // failures surface after classification.
        let started = Instant::now();
        let written = self.write_downstream(ctx, event, &result).await;
        self.emit(ctx, Stage::DownstreamWrite, started, written.as_ref().err());

        match written {
            Ok(ids) => {
                let started = Instant::now();
                let finalized = self
                    .ledger
                    .mark_complete(&event.external_id, &ids, degraded)
                    .await;
                self.emit(ctx, Stage::LedgerFinalize, started, finalized.as_ref().err());
                finalized?;

                info!(
                    event_id = %ctx.external_id,
                    correlation_id = %ctx.correlation_id,
                    downstream_id = %ids.primary,
                    degraded,
                    "Intake transaction committed"
                );
                Ok(ProcessOutcome {
                    status: ProcessStatus::Created,
                    downstream_ids: Some(ids),
                    correlation_id: ctx.correlation_id,
                    degraded,
                })
            }
            Err(err) => {
                let manual_review = err.needs_manual_review();
                let started = Instant::now();
                let marked = self
                    .ledger
                    .mark_partial_failed(
                        &event.external_id,
                        err.class(),
                        &err.to_string(),
                        manual_review,
                    )
                    .await;
                self.emit(ctx, Stage::LedgerFinalize, started, marked.as_ref().err());
                marked?;

                if err.is_retryable() {
                    // The event is durably recorded and the result cached;
                    // a later call with the same external id resumes at the
                    // downstream write.
                    warn!(
                        event_id = %ctx.external_id,
                        correlation_id = %ctx.correlation_id,
                        error_class = err.class(),
                        "Downstream write failed transiently, left partial_failed"
                    );
                    Ok(ProcessOutcome {
                        status: ProcessStatus::Partial,
                        downstream_ids: None,
                        correlation_id: ctx.correlation_id,
                        degraded,
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Adaptive extraction under the invoker; on retry exhaustion the
    /// deterministic fallback produces a degraded result.
    async fn extract_with_fallback(
        &self,
        ctx: &CorrelationContext,
        event: &IntakeEvent,
        tier: inflow_core::ExtractionTier,
    ) -> inflow_core::Result<StructuredResult> {
        let resource = self.extractor.resource_key(tier);
        let call_timeout = self.extractor.timeout_for(tier);
        let hints = ExtractionHints {
            subject: event.subject.clone(),
            sender: event.sender.clone(),
        };

        let extractor = Arc::clone(&self.extractor);
        let payload = event.payload.clone();
        let call_ctx = ctx.clone();
        let op = move || {
            let extractor = extractor.clone();
            let payload = payload.clone();
            let ctx = call_ctx.clone();
            async move {
                match tokio::time::timeout(call_timeout, extractor.extract(&payload, tier, &ctx))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::TransientDownstream(format!(
                        "extraction timed out after {} ms",
                        call_timeout.as_millis()
                    ))),
                }
            }
        };

        let fallback = self.fallback.clone();
        let payload = event.payload.clone();
        let invoked = self
            .invoker
            .invoke_with_fallback(&resource, op, move || async move {
                Ok(fallback.extract(&payload, &hints))
            })
            .await?;

        if invoked.degraded {
            warn!(
                event_id = %ctx.external_id,
                correlation_id = %ctx.correlation_id,
                resource = %resource,
                "Adaptive extraction unavailable, fallback result committed"
            );
        }
        Ok(invoked.value)
    }

    /// Downstream write under the invoker (no fallback).
    async fn write_downstream(
        &self,
        ctx: &CorrelationContext,
        event: &IntakeEvent,
        result: &StructuredResult,
    ) -> inflow_core::Result<inflow_core::DownstreamIds> {
        let call_timeout = self.config.downstream_timeout;
        let downstream = Arc::clone(&self.downstream);
        let external_id = event.external_id.clone();
        let call_ctx = ctx.clone();
        let result = result.clone();

        let invoked = self
            .invoker
            .invoke("records-api", move || {
                let downstream = downstream.clone();
                let external_id = external_id.clone();
                let ctx = call_ctx.clone();
                let result = result.clone();
                async move {
                    match tokio::time::timeout(
                        call_timeout,
                        downstream.create_or_update(&external_id, &result, &ctx),
                    )
                    .await
                    {
                        Ok(r) => r,
                        Err(_) => Err(Error::TransientDownstream(format!(
                            "downstream write timed out after {} ms",
                            call_timeout.as_millis()
                        ))),
                    }
                }
            })
            .await?;

        Ok(invoked.value)
    }

    /// Poll a concurrent caller's outcome after losing the pending insert.
    async fn await_concurrent(
        &self,
        ctx: &CorrelationContext,
    ) -> inflow_core::Result<ProcessOutcome> {
        debug!(
            event_id = %ctx.external_id,
            correlation_id = %ctx.correlation_id,
            "Event is processing elsewhere, polling for its outcome"
        );

        for _ in 0..self.config.replay_poll_attempts {
            tokio::time::sleep(self.config.replay_poll_interval).await;

            if let Some(record) = self.ledger.get(&ctx.external_id).await? {
                match record.status {
                    LedgerStatus::Complete => {
                        return Ok(Self::replayed_outcome(ctx, &record));
                    }
                    LedgerStatus::PartialFailed => {
                        return Ok(ProcessOutcome {
                            status: ProcessStatus::Partial,
                            downstream_ids: None,
                            correlation_id: ctx.correlation_id,
                            degraded: record.degraded,
                        });
                    }
                    LedgerStatus::Pending => {}
                }
            }
        }

        Err(Error::TransientDownstream(format!(
            "event {} is still being processed by another caller",
            ctx.external_id
        )))
    }

    /// Outcome for a replayed, already-complete event.
    fn replayed_outcome(ctx: &CorrelationContext, record: &IdempotencyRecord) -> ProcessOutcome {
        ProcessOutcome {
            status: ProcessStatus::Replayed,
            downstream_ids: record.downstream_ids.clone(),
            correlation_id: ctx.correlation_id,
            degraded: record.degraded,
        }
    }

    /// Candidate fields parsed from the event envelope (sender/subject).
    fn envelope_candidates(event: &IntakeEvent) -> StructuredResult {
        let mut candidates = StructuredResult::default();

        if let Some(sender) = event.sender.as_deref() {
            if let Some((name, addr)) = sender
                .split_once('<')
                .and_then(|(n, rest)| rest.strip_suffix('>').map(|a| (n.trim(), a.trim())))
            {
                if !name.is_empty() {
                    candidates.full_name = Some(name.to_string());
                }
                if addr.contains('@') {
                    candidates.email = Some(addr.to_string());
                }
            } else if sender.contains('@') {
                candidates.email = Some(sender.trim().to_string());
            }
        }
        if let Some(subject) = event.subject.as_deref() {
            let subject = subject.trim();
            if !subject.is_empty() {
                candidates.summary = Some(subject.to_string());
            }
        }

        candidates
    }

    fn emit(
        &self,
        ctx: &CorrelationContext,
        stage: Stage,
        started: Instant,
        error: Option<&Error>,
    ) {
        // Fire-and-forget: a failing sink never fails the transaction.
        self.telemetry.record(StageEvent {
            stage,
            event_id: ctx.external_id.clone(),
            correlation_id: ctx.correlation_id,
            duration_ms: started.elapsed().as_millis() as u64,
            success: error.is_none(),
            error_class: error.map(|e| e.class().to_string()),
        });
    }
}
