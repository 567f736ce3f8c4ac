//! Observability metrics for the coordination engine.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `blockwalk_claims_total` | Counter | `result` | Claim requests by per-address outcome |
//! | `blockwalk_claim_ops_total` | Counter | `operation`, `result` | Arrive/complete/release operations |
//! | `blockwalk_expiry_sweeps_total` | Counter | - | Expiry sweep executions |
//! | `blockwalk_claims_expired_total` | Counter | - | Claims reclaimed by the sweep |
//! | `blockwalk_sweep_duration_seconds` | Histogram | - | Expiry sweep processing time |
//! | `blockwalk_active_sessions` | Gauge | - | Currently Active walk sessions |
//! | `blockwalk_bus_subscribers` | Gauge | - | Live coordination bus subscriptions |
//! | `blockwalk_events_delivered_total` | Counter | - | Events delivered to subscribers |
//!
//! Metrics are exposed via the `metrics` crate facade; recording
//! without an installed recorder is a no-op, so every path can record
//! unconditionally.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Claim requests by per-address outcome.
    pub const CLAIMS_TOTAL: &str = "blockwalk_claims_total";
    /// Counter: Owner-initiated claim operations by kind and outcome.
    pub const CLAIM_OPS_TOTAL: &str = "blockwalk_claim_ops_total";
    /// Counter: Expiry sweep executions.
    pub const EXPIRY_SWEEPS_TOTAL: &str = "blockwalk_expiry_sweeps_total";
    /// Counter: Claims reclaimed by the expiry sweep.
    pub const CLAIMS_EXPIRED_TOTAL: &str = "blockwalk_claims_expired_total";
    /// Histogram: Expiry sweep processing time in seconds.
    pub const SWEEP_DURATION_SECONDS: &str = "blockwalk_sweep_duration_seconds";
    /// Gauge: Currently Active walk sessions.
    pub const ACTIVE_SESSIONS: &str = "blockwalk_active_sessions";
    /// Gauge: Live coordination bus subscriptions.
    pub const BUS_SUBSCRIBERS: &str = "blockwalk_bus_subscribers";
    /// Counter: Events delivered to subscribers.
    pub const EVENTS_DELIVERED_TOTAL: &str = "blockwalk_events_delivered_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Per-address claim outcome (granted, conflict).
    pub const RESULT: &str = "result";
    /// Claim operation kind (arrive, complete, release).
    pub const OPERATION: &str = "operation";
}

/// Label values for claim outcomes.
pub mod outcomes {
    /// A lease was granted.
    pub const GRANTED: &str = "granted";
    /// The address was already claimed.
    pub const CONFLICT: &str = "conflict";
    /// The operation was applied.
    pub const APPLIED: &str = "applied";
    /// The operation was an idempotent retry.
    pub const NOOP: &str = "noop";
    /// The claim did not exist or was no longer operable.
    pub const NOT_FOUND: &str = "not_found";
    /// The caller did not own the claim.
    pub const FORBIDDEN: &str = "forbidden";
}

/// High-level interface for recording coordination metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct WalkMetrics;

impl WalkMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records one per-address claim outcome.
    pub fn record_claim(&self, result: &str) {
        counter!(
            names::CLAIMS_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records an arrive/complete/release operation outcome.
    pub fn record_claim_op(&self, operation: &str, result: &str) {
        counter!(
            names::CLAIM_OPS_TOTAL,
            labels::OPERATION => operation.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records one expiry sweep and the number of claims it reclaimed.
    pub fn record_sweep(&self, expired: usize, duration: Duration) {
        counter!(names::EXPIRY_SWEEPS_TOTAL).increment(1);
        counter!(names::CLAIMS_EXPIRED_TOTAL).increment(expired as u64);
        histogram!(names::SWEEP_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Updates the Active-session gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_active_sessions(&self, count: usize) {
        gauge!(names::ACTIVE_SESSIONS).set(count as f64);
    }

    /// Updates the bus subscriber gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_bus_subscribers(&self, count: usize) {
        gauge!(names::BUS_SUBSCRIBERS).set(count as f64);
    }

    /// Records the number of subscribers an event reached.
    pub fn record_events_delivered(&self, delivered: usize) {
        counter!(names::EVENTS_DELIVERED_TOTAL).increment(delivered as u64);
    }
}
