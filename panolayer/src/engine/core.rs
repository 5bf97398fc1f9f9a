//! The tile engine facade.

use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cache::{CacheStats, LruCache};
use crate::coord::TileCoord;
use crate::job::{JobId, JobRecord, Priority};
use crate::provider::FetchProvider;
use crate::sched::{FrameScheduler, JobOutcome};
use crate::tile::{TileNode, TileState};
use crate::time::Clock;

use super::config::{CostPolicy, EngineConfig};
use super::fetch::FetchJob;
use super::listeners::{ListenerTable, SubscriptionId, TileEvent};

/// What `request` did with the demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The tile is already resident; nothing scheduled.
    Ready,
    /// A new fetch job was queued.
    Queued,
    /// A fetch is already outstanding and was promoted to the new urgency.
    Promoted,
    /// A fetch is already outstanding at an equal or higher urgency.
    InFlight,
    /// The cache refused the node (capacity zero).
    Rejected,
}

/// Summary of one engine tick.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Job steps executed.
    pub steps: u32,
    /// Tiles that became `Ready` this tick.
    pub ready: u32,
    /// Tiles that transitioned to `Failed`, including starved ones.
    pub failed: u32,
    /// Jobs force-failed by the starvation sweep.
    pub starved: u32,
    /// Completed payloads rejected because they exceed cache capacity.
    pub rejected: u32,
    /// Wall-clock cost of the tick.
    pub elapsed: Duration,
    /// Budget the tick ran under.
    pub budget: Duration,
}

/// Supplies the set of tiles the current camera needs, most urgent first.
///
/// The engine reacts to this set but never computes it; projection math
/// lives with the renderer. Any `FnMut(&C) -> Vec<(TileCoord, Priority)>`
/// closure qualifies.
pub trait NeededSetResolver<C> {
    fn needed(&mut self, camera: &C) -> Vec<(TileCoord, Priority)>;
}

impl<C, F> NeededSetResolver<C> for F
where
    F: FnMut(&C) -> Vec<(TileCoord, Priority)>,
{
    fn needed(&mut self, camera: &C) -> Vec<(TileCoord, Priority)> {
        self(camera)
    }
}

/// Client-side engine keeping a moving camera supplied with tiles.
///
/// Owns the node cache, the frame-budgeted scheduler, and the listener
/// table; everything runs on the embedder's thread, driven by [`tick`]
/// calls from the render loop. Tile state only changes inside `request`,
/// `release`, `apply_needed`, and `tick`; the inspection methods are pure
/// reads.
///
/// [`tick`]: TileEngine::tick
pub struct TileEngine {
    cache: LruCache<TileCoord, TileNode>,
    scheduler: FrameScheduler,
    provider: Rc<dyn FetchProvider>,
    listeners: ListenerTable,
    release_after_misses: u32,
}

impl TileEngine {
    /// Creates an engine fetching through `provider`, timed by `clock`.
    pub fn new(
        config: EngineConfig,
        provider: Rc<dyn FetchProvider>,
        clock: impl Clock + 'static,
    ) -> Self {
        let policy = config.cost_policy;
        let mut cache = LruCache::new(config.cache_capacity, move |node: &TileNode| {
            match policy {
                CostPolicy::PerEntry => 1,
                CostPolicy::PayloadBytes => node.cost(),
            }
        });
        // Runs synchronously while the entry is being dropped from the
        // cache; cancelling here guarantees the job is dead before the
        // eviction returns.
        cache.set_eviction_handler(|coord, node| {
            debug!(tile = %coord, state = %node.state(), "evicting tile");
            node.abandon();
        });
        info!(
            provider = provider.name(),
            capacity = config.cache_capacity,
            "tile engine initialized"
        );
        Self {
            cache,
            scheduler: FrameScheduler::new(config.scheduler, clock),
            provider,
            listeners: ListenerTable::new(),
            release_after_misses: config.release_after_misses.max(1),
        }
    }

    // =========================================================================
    // Scheduling API
    // =========================================================================

    /// Declares demand for `coord` at `urgency`.
    ///
    /// Creates and caches the node on first demand, queues a fetch job if
    /// none is outstanding, and otherwise promotes the existing job when
    /// the new urgency is higher. At most one live job exists per
    /// coordinate no matter how often this is called.
    pub fn request(&mut self, coord: TileCoord, urgency: Priority) -> RequestOutcome {
        if self.cache.contains(&coord) {
            self.cache.touch(&coord);
        } else {
            match self.cache.put(coord, TileNode::new(coord)) {
                Ok(evicted) => self.handle_evictions(evicted),
                Err(error) => {
                    warn!(tile = %coord, %error, "cache rejected tile node");
                    return RequestOutcome::Rejected;
                }
            }
        }

        let Some(node) = self.cache.peek_mut(&coord) else {
            return RequestOutcome::Rejected;
        };
        node.note_needed();

        match node.state() {
            TileState::Ready => RequestOutcome::Ready,
            TileState::Queued | TileState::Loading => {
                let current = node.priority();
                if current.is_some_and(|p| urgency.is_more_urgent_than(p)) {
                    node.set_priority(urgency);
                    self.scheduler.reprioritize(&JobId::for_fetch(coord), urgency);
                    debug!(tile = %coord, %urgency, "promoted in-flight fetch");
                    RequestOutcome::Promoted
                } else {
                    // Renewed demand resets the job's starvation age even
                    // when it does not move buckets.
                    self.scheduler.touch(&JobId::for_fetch(coord));
                    RequestOutcome::InFlight
                }
            }
            TileState::Unrequested | TileState::Failed => {
                // begin_queue always succeeds from these states.
                let Some((generation, token)) = node.begin_queue(urgency) else {
                    return RequestOutcome::Rejected;
                };
                let job = FetchJob::new(Rc::clone(&self.provider), coord, token.clone());
                let record = JobRecord::new(
                    JobId::for_fetch(coord),
                    coord,
                    generation,
                    urgency,
                    token,
                    Box::new(job),
                    self.scheduler.now(),
                );
                self.scheduler.schedule(record);
                debug!(tile = %coord, %urgency, generation, "queued fetch");
                RequestOutcome::Queued
            }
        }
    }

    /// Withdraws demand for `coord`.
    ///
    /// Cancels any outstanding fetch and drops its subscribers without
    /// firing them. A `Ready` payload stays resident for ancestor fallback
    /// until the cache evicts it. Returns `true` if a fetch was cancelled.
    pub fn release(&mut self, coord: TileCoord) -> bool {
        let Some(node) = self.cache.peek_mut(&coord) else {
            return false;
        };
        if !node.is_in_flight() {
            return false;
        }
        node.abandon();
        self.scheduler.cancel(&JobId::for_fetch(coord));
        self.listeners.drop_coord(coord);
        debug!(tile = %coord, "released in-flight tile");
        true
    }

    /// Reconciles engine state against the camera's current needed set.
    ///
    /// Requests (or promotes) every listed tile, then counts a miss
    /// against every other in-flight tile; a tile missing from
    /// `release_after_misses` consecutive sets has its fetch cancelled.
    pub fn apply_needed(&mut self, needed: &[(TileCoord, Priority)]) {
        let wanted: HashSet<TileCoord> = needed.iter().map(|(coord, _)| *coord).collect();
        for &(coord, urgency) in needed {
            self.request(coord, urgency);
        }

        let resident: Vec<TileCoord> = self.cache.keys().copied().collect();
        let mut stale = Vec::new();
        for coord in resident {
            if wanted.contains(&coord) {
                continue;
            }
            if let Some(node) = self.cache.peek_mut(&coord) {
                if node.is_in_flight() && node.note_missed() >= self.release_after_misses {
                    stale.push(coord);
                }
            }
        }
        for coord in stale {
            self.release(coord);
        }
    }

    /// Asks `resolver` for the camera's needed set and reconciles against
    /// it. Call once per tick, before [`tick`](Self::tick).
    pub fn reconcile<C>(&mut self, resolver: &mut impl NeededSetResolver<C>, camera: &C) {
        let needed = resolver.needed(camera);
        self.apply_needed(&needed);
    }

    /// Runs queued fetch work within the frame budget and folds the
    /// resulting state changes into the tile nodes.
    ///
    /// Every failure mode (fetch error, starvation, oversized payload,
    /// stale completion) is resolved here; nothing escapes as an error.
    pub fn tick(&mut self, now: Instant) -> TickSummary {
        let report = self.scheduler.tick(now);
        let mut summary = TickSummary {
            steps: report.steps,
            failed: report.failed,
            starved: report.starved,
            elapsed: report.elapsed,
            budget: report.budget,
            ..TickSummary::default()
        };
        for outcome in report.outcomes {
            self.fold_outcome(outcome, &mut summary);
        }
        summary
    }

    /// Subscribes to the next `Ready`/`Failed` transition of `coord`.
    ///
    /// `generation` must be the node generation observed when demand was
    /// placed (see [`generation_of`](Self::generation_of)); a callback is
    /// never fired once the node's generation has moved past it. If the
    /// node is already terminal at that generation the callback fires
    /// immediately and the returned id is already spent.
    pub fn subscribe(
        &mut self,
        coord: TileCoord,
        generation: u64,
        callback: impl FnMut(TileCoord, TileEvent) + 'static,
    ) -> SubscriptionId {
        let mut callback = callback;
        if let Some(node) = self.cache.peek(&coord) {
            if node.generation() == generation {
                match node.state() {
                    TileState::Ready => {
                        callback(coord, TileEvent::Ready);
                        return self.listeners.next_id();
                    }
                    TileState::Failed => {
                        callback(coord, TileEvent::Failed);
                        return self.listeners.next_id();
                    }
                    _ => {}
                }
            }
        }
        self.listeners.subscribe(coord, generation, Box::new(callback))
    }

    /// Revokes a subscription. Returns `false` if it already fired.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// True when the tile's payload is resident. Pure read.
    pub fn is_ready(&self, coord: TileCoord) -> bool {
        self.cache.peek(&coord).is_some_and(TileNode::is_ready)
    }

    /// Current generation of the node for `coord`, if resident.
    pub fn generation_of(&self, coord: TileCoord) -> Option<u64> {
        self.cache.peek(&coord).map(TileNode::generation)
    }

    /// Best imagery available for `coord`: the node itself if `Ready`,
    /// otherwise the nearest `Ready` ancestor.
    ///
    /// A `Failed` node terminates the walk with `None` ("nothing available
    /// here"). Pure read; never schedules and never disturbs LRU order.
    pub fn best_available(&self, coord: TileCoord) -> Option<&TileNode> {
        let mut cursor = Some(coord);
        while let Some(c) = cursor {
            if let Some(node) = self.cache.peek(&c) {
                match node.state() {
                    TileState::Ready => return Some(node),
                    TileState::Failed => return None,
                    _ => {}
                }
            }
            cursor = c.parent();
        }
        None
    }

    /// True when queued work remains and another tick should be armed.
    pub fn is_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Number of queued job records.
    pub fn pending_jobs(&self) -> usize {
        self.scheduler.pending()
    }

    /// Cache hit/miss/eviction counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Smoothed per-tick cost in milliseconds, for instrumentation.
    pub fn frame_cost_ema_ms(&self) -> f64 {
        self.scheduler.frame_cost_ema_ms()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn fold_outcome(&mut self, outcome: JobOutcome, summary: &mut TickSummary) {
        match outcome {
            JobOutcome::Started { coord, generation } => {
                match self.cache.peek_mut(&coord) {
                    Some(node) if node.generation() == generation => node.mark_loading(),
                    _ => debug!(tile = %coord, generation, "discarding stale start"),
                }
            }
            JobOutcome::Completed {
                coord,
                generation,
                payload,
            } => {
                let live = self
                    .cache
                    .peek(&coord)
                    .is_some_and(|node| node.generation() == generation && node.is_in_flight());
                if !live {
                    debug!(tile = %coord, generation, "discarding stale completion");
                    return;
                }
                if let Some(node) = self.cache.peek_mut(&coord) {
                    node.complete(payload);
                }
                match self.cache.update_cost(&coord) {
                    Ok(evicted) => {
                        summary.ready += 1;
                        self.handle_evictions(evicted);
                        self.listeners.notify(coord, generation, TileEvent::Ready);
                    }
                    Err(error) => {
                        // The oversized entry was removed; keep the failure
                        // visible so the tile is not refetched forever.
                        warn!(tile = %coord, %error, "completed payload rejected by cache");
                        summary.rejected += 1;
                        summary.failed += 1;
                        self.listeners.notify(coord, generation, TileEvent::Failed);
                        if let Ok(evicted) =
                            self.cache.put(coord, TileNode::failed(coord, generation))
                        {
                            self.handle_evictions(evicted);
                        }
                    }
                }
            }
            JobOutcome::Failed {
                coord,
                generation,
                failure,
            } => match self.cache.peek_mut(&coord) {
                Some(node) if node.generation() == generation && node.is_in_flight() => {
                    debug!(tile = %coord, %failure, "tile fetch failed");
                    node.fail();
                    self.listeners.notify(coord, generation, TileEvent::Failed);
                }
                _ => debug!(tile = %coord, generation, "discarding stale failure"),
            },
        }
    }

    /// Post-eviction bookkeeping: the handler already cancelled each
    /// node's job; here the dependents hear that the tile is gone.
    fn handle_evictions(&mut self, evicted: Vec<TileCoord>) {
        for coord in evicted {
            self.listeners.notify_all(coord, TileEvent::Failed);
        }
    }
}
