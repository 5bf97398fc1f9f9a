//! Job identity, priority, and the cancellable job record.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;
use crate::provider::FetchError;

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Number of priority levels; level 0 is most urgent.
pub const PRIORITY_LEVELS: usize = 6;

/// Scheduling priority in `[0, 5]`; 0 is most urgent.
///
/// Named levels give the common urgencies a vocabulary; anything in between
/// is legal. Ordering follows urgency, so `Priority::ON_DEMAND`
/// compares "less than" (more urgent than) `Priority::HOUSEKEEPING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    /// Tiles the camera needs on screen right now.
    pub const ON_DEMAND: Priority = Priority(0);
    /// Tiles just outside the frustum, likely visible within a frame or two.
    pub const ADJACENT: Priority = Priority(2);
    /// Speculative loads along the predicted camera path.
    pub const PREFETCH: Priority = Priority(4);
    /// Background work with no viewer waiting on it.
    pub const HOUSEKEEPING: Priority = Priority(5);

    /// Most urgent level (0).
    pub const HIGHEST: Priority = Priority(0);
    /// Least urgent level (5).
    pub const LOWEST: Priority = Priority((PRIORITY_LEVELS - 1) as u8);

    /// Creates a priority, clamping to the least urgent level.
    pub fn new(level: u8) -> Self {
        Self(level.min(Self::LOWEST.0))
    }

    /// Bucket index for this priority.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// True when `self` is strictly more urgent than `other`.
    #[inline]
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Unique identifier for a job.
///
/// Fetch jobs derive their ID from the tile coordinate, so every request
/// for the same tile maps to the same logical job and de-duplicates in the
/// buckets. Auto-generated IDs exist for jobs without a natural identity.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated job ID (`job-{counter}`).
    pub fn auto() -> Self {
        let counter = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}", counter))
    }

    /// The canonical fetch-job ID for a tile coordinate.
    pub fn for_fetch(coord: TileCoord) -> Self {
        Self(format!("fetch-{}", coord))
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One cooperative slice of a job's work.
///
/// A step runs to its own yield point and returns; it must never block.
/// Expensive steps should check their cancellation token at safe points.
pub trait JobStep {
    /// Runs one step and reports whether the job is finished.
    fn step(&mut self) -> StepResult;
}

/// Outcome of a single job step.
pub enum StepResult {
    /// More work remains; re-enqueue at the same priority.
    Yield,
    /// The job finished and produced a payload.
    Complete(Bytes),
    /// The job finished with an error.
    Fail(FetchError),
}

/// Progress state of a job record.
pub enum JobState {
    /// Work remains; holds the step object.
    Pending(Box<dyn JobStep>),
    /// Finished successfully.
    Done,
    /// Finished with an error (fetch failure or starvation).
    Failed,
}

/// Why a job ended unsuccessfully.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// The fetch provider reported an error.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The job sat queued past the starvation threshold and was force-failed.
    #[error("job waited past the starvation threshold")]
    Starved,
}

/// A cancellable unit of deferred work bound to a priority level.
///
/// A record is owned by exactly one priority bucket at a time (or by the
/// scheduler while a step runs). Cancellation is cooperative: a cancelled
/// record is skipped and dropped the next time it is dequeued.
pub struct JobRecord {
    id: JobId,
    coord: TileCoord,
    generation: u64,
    priority: Priority,
    scheduled_at: Instant,
    started: bool,
    cancel: CancellationToken,
    state: JobState,
}

impl JobRecord {
    /// Creates a pending record around a step object.
    pub fn new(
        id: JobId,
        coord: TileCoord,
        generation: u64,
        priority: Priority,
        cancel: CancellationToken,
        step: Box<dyn JobStep>,
        scheduled_at: Instant,
    ) -> Self {
        Self {
            id,
            coord,
            generation,
            priority,
            scheduled_at,
            started: false,
            cancel,
            state: JobState::Pending(step),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Generation of the owning tile node at enqueue time. Completions are
    /// discarded when the node's generation has moved on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// When demand for this record was last affirmed: first enqueue,
    /// repositioning, re-demand, or a continuation requeue. The starvation
    /// sweep measures age from here.
    pub fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }

    /// Resets the starvation age; called whenever demand is re-affirmed.
    pub(crate) fn touch_scheduled(&mut self, now: Instant) {
        self.scheduled_at = now;
    }

    /// True once the first step has run (Queued -> Loading boundary).
    pub fn started(&self) -> bool {
        self.started
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the record; it will be dropped at its next dequeue.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs one step, updating the record's state on completion.
    ///
    /// Must not be called again after the record leaves `Pending`; a
    /// finished record reports failure rather than re-running work.
    pub fn run_step(&mut self) -> StepResult {
        let result = match &mut self.state {
            JobState::Pending(step) => step.step(),
            // A cancelled-then-rediscovered or finished record never
            // executes its step again.
            JobState::Done | JobState::Failed => {
                return StepResult::Fail(FetchError::Cancelled)
            }
        };
        match &result {
            StepResult::Yield => {}
            StepResult::Complete(_) => self.state = JobState::Done,
            StepResult::Fail(_) => self.state = JobState::Failed,
        }
        result
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("coord", &self.coord)
            .field("generation", &self.generation)
            .field("priority", &self.priority)
            .field("started", &self.started)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingStep {
        remaining: u32,
    }

    impl JobStep for CountingStep {
        fn step(&mut self) -> StepResult {
            if self.remaining == 0 {
                StepResult::Complete(Bytes::from_static(b"done"))
            } else {
                self.remaining -= 1;
                StepResult::Yield
            }
        }
    }

    fn test_coord() -> TileCoord {
        TileCoord::new(0, 1, 1, 2).unwrap()
    }

    fn test_record(remaining: u32) -> JobRecord {
        let coord = test_coord();
        JobRecord::new(
            JobId::for_fetch(coord),
            coord,
            1,
            Priority::PREFETCH,
            CancellationToken::new(),
            Box::new(CountingStep { remaining }),
            Instant::now(),
        )
    }

    #[test]
    fn test_priority_clamps() {
        assert_eq!(Priority::new(9), Priority::LOWEST);
        assert_eq!(Priority::new(0), Priority::ON_DEMAND);
    }

    #[test]
    fn test_priority_urgency_ordering() {
        assert!(Priority::ON_DEMAND.is_more_urgent_than(Priority::PREFETCH));
        assert!(Priority::ON_DEMAND < Priority::HOUSEKEEPING);
    }

    #[test]
    fn test_job_id_for_fetch_is_stable() {
        let coord = test_coord();
        assert_eq!(JobId::for_fetch(coord), JobId::for_fetch(coord));
    }

    #[test]
    fn test_job_id_auto_is_unique() {
        assert_ne!(JobId::auto(), JobId::auto());
    }

    #[test]
    fn test_record_steps_to_completion() {
        let mut record = test_record(2);
        assert!(matches!(record.run_step(), StepResult::Yield));
        assert!(matches!(record.run_step(), StepResult::Yield));
        assert!(matches!(record.run_step(), StepResult::Complete(_)));
        assert!(matches!(record.state, JobState::Done));
    }

    #[test]
    fn test_finished_record_never_reruns() {
        let mut record = test_record(0);
        assert!(matches!(record.run_step(), StepResult::Complete(_)));
        // A second call must not execute the step function again.
        assert!(matches!(
            record.run_step(),
            StepResult::Fail(FetchError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_is_observable() {
        let record = test_record(1);
        assert!(!record.is_cancelled());
        record.cancel();
        assert!(record.is_cancelled());
    }
}
