//! Frame-budgeted cooperative scheduler.
//!
//! Each tick computes a deadline from a moving average of recent frame
//! cost, then drains the priority buckets from most urgent down until the
//! deadline passes or no work remains. A step that yields is re-enqueued at
//! the same priority and may run again within the same tick. The scheduler
//! never preempts: overshoot is bounded by one step's cost, because the
//! deadline is checked before every step.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::coord::TileCoord;
use crate::job::{EnqueueOutcome, JobFailure, JobId, JobRecord, PriorityBuckets, StepResult};
use crate::job::Priority;
use crate::time::Clock;

use super::config::SchedulerConfig;

/// State change produced by the scheduler during a tick.
///
/// Outcomes are delivered in execution order; the owner folds them into
/// tile state after `tick` returns. Each carries the generation observed at
/// enqueue time so stale completions can be discarded.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job's first step ran (Queued -> Loading boundary).
    Started { coord: TileCoord, generation: u64 },
    /// The job finished and produced a payload.
    Completed {
        coord: TileCoord,
        generation: u64,
        payload: Bytes,
    },
    /// The job finished unsuccessfully (fetch failure or starvation).
    Failed {
        coord: TileCoord,
        generation: u64,
        failure: JobFailure,
    },
}

/// Summary of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Job steps executed.
    pub steps: u32,
    /// Jobs that completed successfully.
    pub completed: u32,
    /// Jobs that failed, including starved ones.
    pub failed: u32,
    /// Jobs force-failed by the starvation sweep.
    pub starved: u32,
    /// Wall-clock cost of the tick.
    pub elapsed: Duration,
    /// Budget the tick ran under.
    pub budget: Duration,
    /// State changes, in execution order.
    pub outcomes: Vec<JobOutcome>,
}

/// Priority-ordered job execution amortized across animation frames.
pub struct FrameScheduler {
    buckets: PriorityBuckets,
    config: SchedulerConfig,
    clock: Box<dyn Clock>,
    /// Smoothed per-tick wall-clock cost in milliseconds.
    frame_cost_ema_ms: f64,
    armed: bool,
}

impl FrameScheduler {
    /// Creates a scheduler driven by the given clock.
    pub fn new(config: SchedulerConfig, clock: impl Clock + 'static) -> Self {
        Self {
            buckets: PriorityBuckets::new(),
            config,
            clock: Box::new(clock),
            frame_cost_ema_ms: 0.0,
            armed: false,
        }
    }

    /// Offers a job for execution; duplicates re-prioritize instead of
    /// inserting (see [`PriorityBuckets::enqueue`]).
    pub fn schedule(&mut self, record: JobRecord) -> EnqueueOutcome {
        self.armed = true;
        self.buckets.enqueue(record)
    }

    /// Moves a pending job to a new priority and resets its starvation
    /// age. Returns `false` if the job is no longer pending.
    pub fn reprioritize(&mut self, id: &JobId, priority: Priority) -> bool {
        let now = self.clock.now();
        self.buckets.reprioritize(id, priority, now)
    }

    /// Resets a pending job's starvation age without moving it; called when
    /// demand is re-affirmed at the same urgency. Returns `false` if the
    /// job is no longer pending.
    pub fn touch(&mut self, id: &JobId) -> bool {
        let now = self.clock.now();
        self.buckets.touch(id, now)
    }

    /// Marks a pending job cancelled; it is dropped at its next dequeue.
    pub fn cancel(&mut self, id: &JobId) -> bool {
        self.buckets.cancel(id)
    }

    /// Current time on the scheduler's clock, for stamping new records.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Runs queued work until the frame budget is spent or the buckets are
    /// empty, then folds the measured cost into the moving average.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport {
            budget: self.budget(),
            ..TickReport::default()
        };

        self.sweep_starved(now, &mut report);

        let deadline = now + report.budget;
        while self.clock.now() < deadline {
            let mut record = match self.buckets.drain_highest() {
                Some(record) => record,
                None => break,
            };
            if !record.started() {
                record.mark_started();
                report.outcomes.push(JobOutcome::Started {
                    coord: record.coord(),
                    generation: record.generation(),
                });
            }
            report.steps += 1;
            match record.run_step() {
                StepResult::Yield => {
                    // A job that just ran is progressing, not starving.
                    record.touch_scheduled(self.clock.now());
                    self.buckets.requeue(record);
                }
                StepResult::Complete(payload) => {
                    trace!(job = %record.id(), "job completed");
                    report.completed += 1;
                    report.outcomes.push(JobOutcome::Completed {
                        coord: record.coord(),
                        generation: record.generation(),
                        payload,
                    });
                }
                StepResult::Fail(error) => {
                    debug!(job = %record.id(), %error, "job failed");
                    report.failed += 1;
                    report.outcomes.push(JobOutcome::Failed {
                        coord: record.coord(),
                        generation: record.generation(),
                        failure: JobFailure::Fetch(error),
                    });
                }
            }
        }

        report.elapsed = self.clock.now().saturating_duration_since(now);
        let elapsed_ms = report.elapsed.as_secs_f64() * 1000.0;
        self.frame_cost_ema_ms =
            self.config.ema_alpha * elapsed_ms + (1.0 - self.config.ema_alpha) * self.frame_cost_ema_ms;

        self.armed = !self.buckets.is_empty();
        if self.armed {
            trace!(
                pending = self.buckets.len(),
                elapsed_ms,
                "tick ended with work remaining"
            );
        }
        report
    }

    /// Per-tick budget: smoothed frame cost plus fixed overhead, clamped to
    /// the configured range.
    pub fn budget(&self) -> Duration {
        let ms = self.frame_cost_ema_ms + self.config.frame_overhead.as_secs_f64() * 1000.0;
        Duration::from_secs_f64(ms / 1000.0)
            .clamp(self.config.budget_min, self.config.budget_max)
    }

    /// True when another tick should be armed (work remains queued).
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Number of queued records, including cancelled leftovers awaiting
    /// collection.
    pub fn pending(&self) -> usize {
        self.buckets.len()
    }

    /// True when a record (live or cancelled leftover) exists for `id`.
    pub fn has_job(&self, id: &JobId) -> bool {
        self.buckets.contains(id)
    }

    /// Smoothed frame cost in milliseconds, for instrumentation.
    pub fn frame_cost_ema_ms(&self) -> f64 {
        self.frame_cost_ema_ms
    }

    /// Force-fails low-priority jobs older than the starvation threshold.
    ///
    /// Only buckets at the configured floor or below are swept, and age
    /// resets on every re-demand, requeue, and reposition, so the sweep
    /// only catches work nothing has asked about in a long time.
    fn sweep_starved(&mut self, now: Instant, report: &mut TickReport) {
        let cutoff = match now.checked_sub(self.config.starvation_threshold) {
            Some(cutoff) => cutoff,
            None => return,
        };
        for record in self.buckets.take_starved(cutoff, self.config.starvation_floor) {
            warn!(
                job = %record.id(),
                threshold_secs = self.config.starvation_threshold.as_secs(),
                "force-failing starved job"
            );
            report.starved += 1;
            report.failed += 1;
            report.outcomes.push(JobOutcome::Failed {
                coord: record.coord(),
                generation: record.generation(),
                failure: JobFailure::Starved,
            });
        }
    }
}
