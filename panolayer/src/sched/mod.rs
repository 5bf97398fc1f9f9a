//! Frame-budgeted job scheduling.
//!
//! The scheduler owns the priority buckets and the render-loop contract:
//! the embedder calls [`FrameScheduler::tick`] once per animation frame,
//! and re-arms the next frame hook only while [`FrameScheduler::is_armed`]
//! reports pending work.

mod config;
mod scheduler;

pub use config::{
    SchedulerConfig, DEFAULT_BUDGET_MAX_MS, DEFAULT_BUDGET_MIN_MS, DEFAULT_EMA_ALPHA,
    DEFAULT_FRAME_OVERHEAD_MS, DEFAULT_STARVATION_FLOOR, DEFAULT_STARVATION_THRESHOLD_SECS,
};
pub use scheduler::{FrameScheduler, JobOutcome, TickReport};
