//! Cancellable, priority-ordered units of deferred work.
//!
//! A [`JobRecord`] wraps a [`JobStep`] object (one cooperative slice of
//! work per call) together with its identity, urgency, and cancellation
//! token. Records await execution inside [`PriorityBuckets`]; the scheduler
//! drains them under its frame budget.

mod buckets;
mod record;

pub use buckets::{EnqueueOutcome, PriorityBuckets};
pub use record::{
    JobFailure, JobId, JobRecord, JobState, JobStep, Priority, StepResult, PRIORITY_LEVELS,
};
