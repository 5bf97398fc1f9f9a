//! Tile node state machine.

use std::fmt;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;
use crate::job::Priority;

/// Readiness of one quadtree cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Known but nothing requested.
    Unrequested,
    /// A fetch job sits in the priority buckets.
    Queued,
    /// The fetch job has started executing.
    Loading,
    /// Imagery is resident; `payload` is present.
    Ready,
    /// The fetch failed or starved; terminal until explicitly re-requested.
    Failed,
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileState::Unrequested => "unrequested",
            TileState::Queued => "queued",
            TileState::Loading => "loading",
            TileState::Ready => "ready",
            TileState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One cell of the image pyramid and its fetch lifecycle.
///
/// All state transitions go through these methods; nothing outside the
/// engine mutates a node directly. The generation counter advances each
/// time a new fetch cycle begins, so completions belonging to an abandoned
/// cycle can be recognized and discarded.
pub struct TileNode {
    coord: TileCoord,
    state: TileState,
    payload: Option<Bytes>,
    generation: u64,
    cancel: CancellationToken,
    priority: Option<Priority>,
    /// Consecutive needed-set applications that did not list this tile.
    missed_frames: u32,
}

impl TileNode {
    /// Creates an unrequested node for `coord`.
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            state: TileState::Unrequested,
            payload: None,
            generation: 0,
            cancel: CancellationToken::new(),
            priority: None,
            missed_frames: 0,
        }
    }

    /// Creates a node already in the `Failed` state at `generation`.
    ///
    /// Used when a completed payload is too large for the cache: the
    /// original node was dropped with its entry, but the failure must stay
    /// observable so the tile is not endlessly re-fetched.
    pub(crate) fn failed(coord: TileCoord, generation: u64) -> Self {
        let mut node = Self::new(coord);
        node.state = TileState::Failed;
        node.generation = generation;
        node
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Present iff the node is `Ready`.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == TileState::Ready
    }

    /// True while a fetch cycle is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, TileState::Queued | TileState::Loading)
    }

    /// Priority of the outstanding fetch, if any.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        if self.is_in_flight() {
            self.priority = Some(priority);
        }
    }

    /// Cache cost of this node: payload bytes once resident, otherwise 1.
    pub fn cost(&self) -> u64 {
        self.payload.as_ref().map_or(1, |p| p.len().max(1) as u64)
    }

    /// Begins a new fetch cycle: Unrequested|Failed -> Queued.
    ///
    /// Advances the generation and hands back the generation plus a fresh
    /// cancellation token clone for the job record. Panics are avoided by
    /// returning `None` when the node is not in a startable state.
    pub fn begin_queue(&mut self, priority: Priority) -> Option<(u64, CancellationToken)> {
        match self.state {
            TileState::Unrequested | TileState::Failed => {
                self.generation += 1;
                self.state = TileState::Queued;
                self.priority = Some(priority);
                self.payload = None;
                self.missed_frames = 0;
                if self.cancel.is_cancelled() {
                    self.cancel = CancellationToken::new();
                }
                Some((self.generation, self.cancel.clone()))
            }
            _ => None,
        }
    }

    /// Queued -> Loading, when the job's first step runs.
    pub fn mark_loading(&mut self) {
        if self.state == TileState::Queued {
            self.state = TileState::Loading;
        }
    }

    /// Queued|Loading -> Ready with the payload attached.
    pub fn complete(&mut self, payload: Bytes) {
        if self.is_in_flight() {
            self.state = TileState::Ready;
            self.payload = Some(payload);
            self.priority = None;
        }
    }

    /// Queued|Loading -> Failed.
    pub fn fail(&mut self) {
        if self.is_in_flight() {
            self.state = TileState::Failed;
            self.payload = None;
            self.priority = None;
        }
    }

    /// Cancels any outstanding fetch cycle: Queued|Loading -> Unrequested.
    ///
    /// Ready and Failed nodes are left alone; a Ready payload stays
    /// resident for ancestor fallback until the cache evicts it.
    pub fn abandon(&mut self) {
        if self.is_in_flight() {
            self.cancel.cancel();
            self.state = TileState::Unrequested;
            self.payload = None;
            self.priority = None;
        }
    }

    /// Records one needed-set application that did not list this tile.
    /// Returns the updated consecutive-miss count.
    pub(crate) fn note_missed(&mut self) -> u32 {
        self.missed_frames = self.missed_frames.saturating_add(1);
        self.missed_frames
    }

    /// Records that the tile is in the current needed set.
    pub(crate) fn note_needed(&mut self) {
        self.missed_frames = 0;
    }
}

impl fmt::Debug for TileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileNode")
            .field("coord", &self.coord)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("payload_len", &self.payload.as_ref().map(Bytes::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Priority;

    fn node() -> TileNode {
        TileNode::new(TileCoord::new(0, 3, 2, 3).unwrap())
    }

    #[test]
    fn test_new_node_is_unrequested() {
        let node = node();
        assert_eq!(node.state(), TileState::Unrequested);
        assert_eq!(node.generation(), 0);
        assert!(node.payload().is_none());
        assert_eq!(node.cost(), 1);
    }

    #[test]
    fn test_begin_queue_advances_generation() {
        let mut node = node();
        let (generation, token) = node.begin_queue(Priority::ON_DEMAND).unwrap();
        assert_eq!(generation, 1);
        assert_eq!(node.state(), TileState::Queued);
        assert_eq!(node.priority(), Some(Priority::ON_DEMAND));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_begin_queue_rejected_while_in_flight() {
        let mut node = node();
        node.begin_queue(Priority::ON_DEMAND).unwrap();
        assert!(node.begin_queue(Priority::PREFETCH).is_none());
        node.mark_loading();
        assert!(node.begin_queue(Priority::PREFETCH).is_none());
    }

    #[test]
    fn test_full_lifecycle_to_ready() {
        let mut node = node();
        node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.mark_loading();
        assert_eq!(node.state(), TileState::Loading);

        node.complete(Bytes::from_static(b"imagery"));
        assert!(node.is_ready());
        assert_eq!(node.payload().unwrap().as_ref(), b"imagery");
        assert_eq!(node.cost(), 7);
        assert_eq!(node.priority(), None);
    }

    #[test]
    fn test_fail_drops_payload() {
        let mut node = node();
        node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.mark_loading();
        node.fail();
        assert_eq!(node.state(), TileState::Failed);
        assert!(node.payload().is_none());
    }

    #[test]
    fn test_failed_node_can_be_rerequested() {
        let mut node = node();
        node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.fail();
        let (generation, _) = node.begin_queue(Priority::ADJACENT).unwrap();
        assert_eq!(generation, 2);
        assert_eq!(node.state(), TileState::Queued);
    }

    #[test]
    fn test_abandon_cancels_token_and_resets() {
        let mut node = node();
        let (_, token) = node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.abandon();
        assert!(token.is_cancelled());
        assert_eq!(node.state(), TileState::Unrequested);
    }

    #[test]
    fn test_abandon_leaves_ready_node_alone() {
        let mut node = node();
        node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.complete(Bytes::from_static(b"imagery"));
        node.abandon();
        assert!(node.is_ready());
        assert!(node.payload().is_some());
    }

    #[test]
    fn test_rerequest_after_abandon_uses_fresh_token() {
        let mut node = node();
        let (gen1, token1) = node.begin_queue(Priority::ON_DEMAND).unwrap();
        node.abandon();
        let (gen2, token2) = node.begin_queue(Priority::ON_DEMAND).unwrap();
        assert!(gen2 > gen1);
        assert!(token1.is_cancelled());
        assert!(!token2.is_cancelled());
    }

    #[test]
    fn test_mark_loading_only_from_queued() {
        let mut node = node();
        node.mark_loading();
        assert_eq!(node.state(), TileState::Unrequested);
    }

    #[test]
    fn test_miss_counter() {
        let mut node = node();
        assert_eq!(node.note_missed(), 1);
        assert_eq!(node.note_missed(), 2);
        node.note_needed();
        assert_eq!(node.note_missed(), 1);
    }
}
