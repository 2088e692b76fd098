//! Centralized default constants for the inflow pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// EVENT VALIDATION
// =============================================================================

/// Maximum inbound payload size in bytes (1 MB).
pub const PAYLOAD_MAX_BYTES: usize = 1024 * 1024;

// =============================================================================
// RETRY / BACKOFF
// =============================================================================

/// Default maximum retry count after the initial attempt.
pub const INVOKE_MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const BACKOFF_INITIAL_MS: u64 = 500;

/// Exponential backoff base.
pub const BACKOFF_BASE: f64 = 2.0;

/// Backoff ceiling in milliseconds.
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// Additive uniform jitter as a fraction of the computed delay.
pub const BACKOFF_JITTER_FRACTION: f64 = 0.1;

// =============================================================================
// TIER SELECTION
// =============================================================================

/// Inputs at or below this many characters take the lite tier.
pub const TIER_LITE_MAX_CHARS: usize = 2_000;

/// Inputs at or below this many characters (and above the lite bound) take
/// the standard tier; anything larger takes the deep tier.
pub const TIER_STANDARD_MAX_CHARS: usize = 12_000;

/// Worst-case cost per 1,000 input characters, lite tier (dollars).
pub const TIER_LITE_COST_PER_KCHAR: f64 = 0.0008;

/// Worst-case cost per 1,000 input characters, standard tier (dollars).
pub const TIER_STANDARD_COST_PER_KCHAR: f64 = 0.004;

/// Worst-case cost per 1,000 input characters, deep tier (dollars).
pub const TIER_DEEP_COST_PER_KCHAR: f64 = 0.02;

/// Default per-event extraction budget in dollars.
pub const CONTEXT_BUDGET_USD: f64 = 0.05;

/// Default quality target (0.0–1.0).
pub const QUALITY_TARGET: f32 = 0.8;

/// Quality target at or above which the nominal tier is promoted one step.
pub const QUALITY_PROMOTE_AT: f32 = 0.9;

/// Quality target below which the nominal tier is demoted one step.
pub const QUALITY_DEMOTE_BELOW: f32 = 0.4;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Extraction call timeout for the lite tier, in seconds.
pub const EXTRACT_TIMEOUT_LITE_SECS: u64 = 10;

/// Extraction call timeout for the standard tier, in seconds.
pub const EXTRACT_TIMEOUT_STANDARD_SECS: u64 = 30;

/// Extraction call timeout for the deep tier, in seconds.
pub const EXTRACT_TIMEOUT_DEEP_SECS: u64 = 90;

/// Downstream system-of-record call timeout, in seconds.
pub const DOWNSTREAM_TIMEOUT_SECS: u64 = 15;

/// Overall deadline for one `process` call, in seconds. Each external call's
/// timeout is shorter than this so the retry loop cannot silently run past
/// the caller's budget.
pub const PROCESS_DEADLINE_SECS: u64 = 180;

// =============================================================================
// REPLAY / TAKEOVER
// =============================================================================

/// Poll interval while waiting for a concurrent caller's outcome, in
/// milliseconds.
pub const REPLAY_POLL_INTERVAL_MS: u64 = 250;

/// Number of outcome polls before giving up on a concurrent caller.
pub const REPLAY_POLL_ATTEMPTS: u32 = 8;

/// Age after which a `pending` ledger record is considered abandoned and may
/// be taken over by a new caller, in seconds.
pub const PENDING_TAKEOVER_AFTER_SECS: u64 = 300;

// =============================================================================
// FALLBACK EXTRACTION
// =============================================================================

/// Maximum characters the fallback extractor scans per input.
pub const FALLBACK_MAX_SCAN_CHARS: usize = 64 * 1024;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

/// Env var overriding the maximum retry count.
pub const ENV_INVOKE_MAX_RETRIES: &str = "INFLOW_MAX_RETRIES";

/// Env var overriding the initial backoff delay in milliseconds.
pub const ENV_BACKOFF_INITIAL_MS: &str = "INFLOW_BACKOFF_INITIAL_MS";

/// Env var overriding the backoff ceiling in milliseconds.
pub const ENV_BACKOFF_MAX_MS: &str = "INFLOW_BACKOFF_MAX_MS";

/// Env var overriding the per-event extraction budget in dollars.
pub const ENV_CONTEXT_BUDGET_USD: &str = "INFLOW_CONTEXT_BUDGET_USD";

/// Env var for the extraction sidecar base URL.
pub const ENV_EXTRACT_BASE_URL: &str = "INFLOW_EXTRACT_BASE_URL";

/// Env var for the downstream records API base URL.
pub const ENV_RECORDS_BASE_URL: &str = "INFLOW_RECORDS_BASE_URL";

/// Env var for the downstream records API key.
pub const ENV_RECORDS_API_KEY: &str = "INFLOW_RECORDS_API_KEY";

/// Env var for the ledger database URL.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
