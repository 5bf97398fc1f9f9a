//! Priority buckets holding pending job records.
//!
//! Six FIFO queues, one per urgency level, with an id index for O(1)
//! duplicate suppression. Scheduling an already-queued job re-prioritizes
//! the existing record instead of inserting a second one: promotion moves
//! it to the *front* of the more urgent bucket (a freshly revealed tile
//! should not wait behind older promotions), demotion to the *back* of the
//! less urgent one. Cancelled records keep their queue slot and are dropped
//! the next time they surface.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tracing::trace;

use super::record::{JobId, JobRecord, Priority, PRIORITY_LEVELS};

/// Result of offering a record to the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No live record with this id existed; the record was inserted.
    Inserted,
    /// A live record existed and was moved to the offered priority;
    /// the offered record was discarded.
    Repositioned,
}

/// Pending work ordered by urgency.
#[derive(Default)]
pub struct PriorityBuckets {
    buckets: [VecDeque<JobRecord>; PRIORITY_LEVELS],
    index: HashMap<JobId, Priority>,
}

impl PriorityBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a record; de-duplicates against a live record with the same id.
    pub fn enqueue(&mut self, record: JobRecord) -> EnqueueOutcome {
        let id = record.id().clone();
        let priority = record.priority();

        if let Some(&old_priority) = self.index.get(&id) {
            match self.extract(&id, old_priority) {
                Some(existing) if !existing.is_cancelled() => {
                    // Live duplicate: reposition it, drop the offered record.
                    // The offer carries a fresh timestamp, so the duplicate
                    // also sheds its starvation age.
                    self.reposition(existing, old_priority, priority, record.scheduled_at());
                    return EnqueueOutcome::Repositioned;
                }
                _ => {
                    // A cancelled leftover occupied the slot; it is gone now
                    // and the offered record takes its place.
                    self.index.remove(&id);
                }
            }
        }

        trace!(job = %id, %priority, "job enqueued");
        self.index.insert(id, priority);
        self.buckets[priority.index()].push_back(record);
        EnqueueOutcome::Inserted
    }

    /// Moves the live record with `id` to a new priority, resetting its
    /// starvation age to `now`.
    ///
    /// Returns `false` if no live record exists. Promotion goes to the front
    /// of the new bucket, demotion to the back; equal priority refreshes the
    /// age in place.
    pub fn reprioritize(&mut self, id: &JobId, priority: Priority, now: Instant) -> bool {
        let old_priority = match self.index.get(id) {
            Some(&p) => p,
            None => return false,
        };
        if old_priority == priority {
            return self.touch(id, now);
        }
        match self.extract(id, old_priority) {
            Some(existing) if !existing.is_cancelled() => {
                self.reposition(existing, old_priority, priority, now);
                true
            }
            Some(_) => {
                self.index.remove(id);
                false
            }
            None => false,
        }
    }

    /// Resets the starvation age of the live record with `id` without
    /// moving it. Returns `false` if no live record exists.
    pub fn touch(&mut self, id: &JobId, now: Instant) -> bool {
        let priority = match self.index.get(id) {
            Some(&p) => p,
            None => return false,
        };
        for record in self.buckets[priority.index()].iter_mut() {
            if record.id() == id {
                if record.is_cancelled() {
                    return false;
                }
                record.touch_scheduled(now);
                return true;
            }
        }
        false
    }

    /// Removes and returns the next record: strict priority order, FIFO
    /// within a bucket. Cancelled records encountered on the way are
    /// dropped without executing.
    pub fn drain_highest(&mut self) -> Option<JobRecord> {
        for bucket in self.buckets.iter_mut() {
            while let Some(record) = bucket.pop_front() {
                self.index.remove(record.id());
                if record.is_cancelled() {
                    trace!(job = %record.id(), "dropping cancelled job at dequeue");
                    continue;
                }
                return Some(record);
            }
        }
        None
    }

    /// Returns a drained record to the back of its priority bucket.
    ///
    /// Used for intra-tick continuations; FIFO order within the level is
    /// preserved for the next drain.
    pub fn requeue(&mut self, record: JobRecord) {
        self.index.insert(record.id().clone(), record.priority());
        self.buckets[record.priority().index()].push_back(record);
    }

    /// Marks the record with `id` cancelled; it is skipped and physically
    /// dropped the next time it is dequeued.
    pub fn cancel(&mut self, id: &JobId) -> bool {
        let priority = match self.index.get(id) {
            Some(&p) => p,
            None => return false,
        };
        for record in self.buckets[priority.index()].iter() {
            if record.id() == id {
                record.cancel();
                return true;
            }
        }
        false
    }

    /// Drains every live record at `floor` or less urgent that was
    /// scheduled at or before `cutoff`.
    ///
    /// Buckets more urgent than `floor` are never swept; wanted work there
    /// waits its turn instead of force-failing. Cancelled leftovers
    /// encountered during the sweep are dropped.
    pub fn take_starved(&mut self, cutoff: Instant, floor: Priority) -> Vec<JobRecord> {
        let mut starved = Vec::new();
        for bucket in self.buckets.iter_mut().skip(floor.index()) {
            let mut kept = VecDeque::with_capacity(bucket.len());
            while let Some(record) = bucket.pop_front() {
                if record.is_cancelled() {
                    self.index.remove(record.id());
                } else if record.scheduled_at() <= cutoff {
                    self.index.remove(record.id());
                    starved.push(record);
                } else {
                    kept.push_back(record);
                }
            }
            *bucket = kept;
        }
        starved
    }

    /// True when a record (live or not yet collected) exists for `id`.
    pub fn contains(&self, id: &JobId) -> bool {
        self.index.contains_key(id)
    }

    /// Current priority of the record with `id`, if present.
    pub fn priority_of(&self, id: &JobId) -> Option<Priority> {
        self.index.get(id).copied()
    }

    /// Number of records across all buckets, including cancelled leftovers.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    /// Removes the record with `id` from its bucket, leaving the index
    /// entry to the caller.
    fn extract(&mut self, id: &JobId, priority: Priority) -> Option<JobRecord> {
        let bucket = &mut self.buckets[priority.index()];
        let pos = bucket.iter().position(|record| record.id() == id)?;
        bucket.remove(pos)
    }

    fn reposition(&mut self, mut record: JobRecord, from: Priority, to: Priority, now: Instant) {
        record.set_priority(to);
        record.touch_scheduled(now);
        self.index.insert(record.id().clone(), to);
        let bucket = &mut self.buckets[to.index()];
        if to.is_more_urgent_than(from) {
            trace!(job = %record.id(), %from, %to, "job promoted");
            bucket.push_front(record);
        } else {
            trace!(job = %record.id(), %from, %to, "job demoted");
            bucket.push_back(record);
        }
    }
}
