//! Scheduler configuration.
//!
//! All thresholds the deadline and starvation logic depends on live here
//! rather than as scattered magic constants, so embedders can tune them per
//! device class.

use std::time::Duration;

use crate::job::Priority;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default lower clamp on the per-frame budget (one 60 Hz frame).
pub const DEFAULT_BUDGET_MIN_MS: u64 = 16;

/// Default upper clamp on the per-frame budget (one 6 Hz frame).
pub const DEFAULT_BUDGET_MAX_MS: u64 = 166;

/// Default fixed overhead added on top of the smoothed frame cost.
pub const DEFAULT_FRAME_OVERHEAD_MS: u64 = 4;

/// Default smoothing factor for the frame-cost moving average.
pub const DEFAULT_EMA_ALPHA: f64 = 0.3;

/// Default age at which a queued job is force-failed.
pub const DEFAULT_STARVATION_THRESHOLD_SECS: u64 = 10;

/// Default most urgent level the starvation sweep may fail.
pub const DEFAULT_STARVATION_FLOOR: Priority = Priority::ADJACENT;

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Configuration for the frame-budgeted scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Lower clamp on the computed per-tick budget.
    pub budget_min: Duration,

    /// Upper clamp on the computed per-tick budget.
    pub budget_max: Duration,

    /// Fixed overhead added to the smoothed frame cost when deriving the
    /// budget.
    pub frame_overhead: Duration,

    /// Smoothing factor in `(0, 1]` for the frame-cost EMA; higher values
    /// react faster to cost changes.
    pub ema_alpha: f64,

    /// Jobs resident in a bucket longer than this are force-failed to
    /// bound memory growth from abandoned tiles. Age is measured from the
    /// last time demand was affirmed, not from first enqueue.
    pub starvation_threshold: Duration,

    /// Most urgent priority the starvation sweep may fail. Work more
    /// urgent than this re-queues until demand is withdrawn.
    pub starvation_floor: Priority,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            budget_min: Duration::from_millis(DEFAULT_BUDGET_MIN_MS),
            budget_max: Duration::from_millis(DEFAULT_BUDGET_MAX_MS),
            frame_overhead: Duration::from_millis(DEFAULT_FRAME_OVERHEAD_MS),
            ema_alpha: DEFAULT_EMA_ALPHA,
            starvation_threshold: Duration::from_secs(DEFAULT_STARVATION_THRESHOLD_SECS),
            starvation_floor: DEFAULT_STARVATION_FLOOR,
        }
    }
}
