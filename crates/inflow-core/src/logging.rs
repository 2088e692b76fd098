//! Structured logging schema and field name constants for inflow.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, transaction completions |
//! | DEBUG | Decision points, tier choices, retry scheduling |
//! | TRACE | Per-rule fallback matches, raw payload sizes |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across ingress → extraction → downstream write.
/// Format: UUIDv7 (time-ordered).
pub const CORRELATION_ID: &str = "correlation_id";

/// External event identifier (idempotency key).
pub const EVENT_ID: &str = "event_id";

/// Pipeline stage emitting the log event.
/// Values: "ledger_lookup", "normalize", "select_tier", "extract",
/// "persist_result", "downstream_write", "ledger_finalize"
pub const STAGE: &str = "stage";

/// Logical resource name for capacity-limited calls.
/// Examples: "extract:standard", "records-api"
pub const RESOURCE: &str = "resource";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retry attempt index (1-based).
pub const ATTEMPT: &str = "attempt";

/// Backoff delay in milliseconds before the next attempt.
pub const DELAY_MS: &str = "delay_ms";

/// Chosen extraction tier.
pub const TIER: &str = "tier";

/// Estimated extraction cost in dollars.
pub const ESTIMATED_COST: &str = "estimated_cost";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Stable error class when an operation fails.
pub const ERROR_CLASS: &str = "error_class";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether the committed result came from the fallback path.
pub const DEGRADED: &str = "degraded";
