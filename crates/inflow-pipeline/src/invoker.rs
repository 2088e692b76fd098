//! Rate-limit-aware call invocation.
//!
//! [`Invoker::invoke`] wraps any external call with exponential backoff,
//! jitter, and per-resource cooldown tracking. The retry policy is explicit
//! composition at every call site — `invoke(resource, op)` — rather than
//! decorator metaprogramming, and the cooldown store is injected so multiple
//! instances can share one.
//!
//! Semantics:
//!
//! - A standing cooldown for the resource is waited out before the first
//!   attempt, so guaranteed-failure calls are never issued.
//! - Rate-limit and transient-class failures are retried with
//!   `min(initial * base^attempt, max) + uniform_jitter(0, fraction*delay)`.
//!   A machine-readable retry-after hint raises the delay to at least the
//!   hint. Rate-limit failures also stamp the shared cooldown for the
//!   resource; transient blips do not.
//! - All other failures propagate immediately.
//! - On exhaustion, [`Invoker::invoke_with_fallback`] runs the fallback and
//!   marks the result degraded; without a fallback the last error propagates.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use inflow_core::defaults;
use inflow_core::{Error, Result};

/// Backoff configuration for one invoker.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Exponential base.
    pub base: f64,
    /// Delay ceiling.
    pub max_delay: Duration,
    /// Additive uniform jitter as a fraction of the computed delay.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::INVOKE_MAX_RETRIES,
            initial_delay: Duration::from_millis(defaults::BACKOFF_INITIAL_MS),
            base: defaults::BACKOFF_BASE,
            max_delay: Duration::from_millis(defaults::BACKOFF_MAX_MS),
            jitter_fraction: defaults::BACKOFF_JITTER_FRACTION,
        }
    }
}

impl RetryPolicy {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INFLOW_MAX_RETRIES` | `3` | Retries after the initial attempt |
    /// | `INFLOW_BACKOFF_INITIAL_MS` | `500` | First retry delay |
    /// | `INFLOW_BACKOFF_MAX_MS` | `30000` | Delay ceiling |
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Some(v) = env_parse::<u32>(defaults::ENV_INVOKE_MAX_RETRIES) {
            policy.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>(defaults::ENV_BACKOFF_INITIAL_MS) {
            policy.initial_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>(defaults::ENV_BACKOFF_MAX_MS) {
            policy.max_delay = Duration::from_millis(v);
        }

        policy
    }

    /// Set the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter fraction (0 disables jitter).
    pub fn with_jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.max(0.0);
        self
    }

    /// Base delay before the (attempt+1)-th try, without jitter.
    ///
    /// Monotone non-decreasing in `attempt` until `max_delay` is reached.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64() * self.base.powi(attempt.min(63) as i32);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_fraction <= 0.0 || delay.is_zero() {
            return delay;
        }
        let jitter =
            rand::thread_rng().gen_range(0.0..=self.jitter_fraction) * delay.as_secs_f64();
        delay + Duration::from_secs_f64(jitter)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse::<T>().ok())
}

/// Shared per-resource cooldown deadlines.
///
/// Keyed by logical resource name so unrelated calls are never penalized by
/// one resource's rate limiting. Injected into the invoker rather than held
/// as module-level state.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Current cooldown deadline for a resource, if any.
    async fn cooldown_until(&self, resource: &str) -> Option<Instant>;

    /// Extend a resource's cooldown. Concurrent updates must keep the later
    /// deadline (compare-and-update, never shorten).
    async fn extend(&self, resource: &str, until: Instant);
}

/// In-process [`CooldownStore`].
#[derive(Debug, Default)]
pub struct MemoryCooldownStore {
    deadlines: RwLock<HashMap<String, Instant>>,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    async fn cooldown_until(&self, resource: &str) -> Option<Instant> {
        self.deadlines.read().await.get(resource).copied()
    }

    async fn extend(&self, resource: &str, until: Instant) {
        let mut deadlines = self.deadlines.write().await;
        let entry = deadlines.entry(resource.to_string()).or_insert(until);
        if until > *entry {
            *entry = until;
        }
    }
}

/// A call result plus invocation metadata.
#[derive(Debug, Clone)]
pub struct Invoked<T> {
    pub value: T,
    /// True when the value came from the fallback path.
    pub degraded: bool,
    /// Attempts made against the primary call.
    pub attempts: u32,
}

/// Generic rate-limit-aware call wrapper.
///
/// Purely functional around the supplied call: no side effects beyond log
/// emission and cooldown bookkeeping.
#[derive(Clone)]
pub struct Invoker {
    policy: RetryPolicy,
    cooldowns: Arc<dyn CooldownStore>,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(MemoryCooldownStore::new()))
    }
}

impl Invoker {
    pub fn new(policy: RetryPolicy, cooldowns: Arc<dyn CooldownStore>) -> Self {
        Self { policy, cooldowns }
    }

    /// The configured retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `op` against `resource`, retrying retryable failures.
    ///
    /// On exhaustion the last (retryable) error propagates; callers that can
    /// degrade should use [`Self::invoke_with_fallback`].
    pub async fn invoke<T, F, Fut>(&self, resource: &str, mut op: F) -> Result<Invoked<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(until) = self.cooldowns.cooldown_until(resource).await {
            let now = Instant::now();
            if until > now {
                debug!(
                    resource,
                    wait_ms = (until - now).as_millis() as u64,
                    "Waiting out standing cooldown before first attempt"
                );
                sleep_until(until).await;
            }
        }

        let max_attempts = self.policy.max_retries + 1;
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    return Ok(Invoked {
                        value,
                        degraded: false,
                        attempts: attempt + 1,
                    });
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let mut delay = self.policy.jittered(self.policy.delay_for(attempt));
                    if let Error::RateLimited {
                        retry_after: Some(hint),
                        ..
                    } = &err
                    {
                        if *hint > delay {
                            delay = *hint;
                        }
                    }
                    if matches!(err, Error::RateLimited { .. }) {
                        self.cooldowns
                            .extend(resource, Instant::now() + delay)
                            .await;
                    }
                    warn!(
                        resource,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error_class = err.class(),
                        "Retryable failure, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Like [`Self::invoke`], but on retry exhaustion runs `fallback` and
    /// returns its value marked degraded.
    ///
    /// Non-retryable failures still propagate immediately without touching
    /// the fallback.
    pub async fn invoke_with_fallback<T, F, Fut, FB, FbFut>(
        &self,
        resource: &str,
        op: F,
        fallback: FB,
    ) -> Result<Invoked<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T>>,
    {
        match self.invoke(resource, op).await {
            Ok(invoked) => Ok(invoked),
            // A retryable error surviving invoke() means retries ran dry.
            Err(err) if err.is_retryable() => {
                warn!(
                    resource,
                    error_class = err.class(),
                    "Retries exhausted, invoking fallback"
                );
                let value = fallback().await?;
                Ok(Invoked {
                    value,
                    degraded: true,
                    attempts: self.policy.max_retries + 1,
                })
            }
            Err(err) => Err(err),
        }
    }
}
