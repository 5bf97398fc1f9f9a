//! Deterministic in-process fetch provider.
//!
//! Resolves every fetch after a fixed number of polls with a payload
//! derived from the coordinate. Tests and the demo CLI use it to exercise
//! the engine without a network; failure injection covers the error paths.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use bytes::Bytes;

use crate::coord::TileCoord;

use super::types::{FetchError, FetchPoll, FetchProvider, FetchRequest};

/// Fetch provider with scripted latency and failures.
pub struct SimProvider {
    latency_polls: u32,
    payload_size: usize,
    failing: RefCell<HashSet<TileCoord>>,
    begun: Cell<u64>,
    cancelled: Rc<Cell<u64>>,
}

impl SimProvider {
    /// Creates a provider that resolves after `latency_polls` polls with a
    /// `payload_size`-byte payload.
    pub fn new(latency_polls: u32, payload_size: usize) -> Self {
        Self {
            latency_polls,
            payload_size,
            failing: RefCell::new(HashSet::new()),
            begun: Cell::new(0),
            cancelled: Rc::new(Cell::new(0)),
        }
    }

    /// Provider that resolves on the first poll.
    pub fn instant(payload_size: usize) -> Self {
        Self::new(0, payload_size)
    }

    /// Makes every future fetch of `coord` fail with `NotFound`.
    pub fn fail_tile(&self, coord: TileCoord) {
        self.failing.borrow_mut().insert(coord);
    }

    /// Clears a failure injection, letting fetches of `coord` succeed again.
    pub fn unfail_tile(&self, coord: TileCoord) {
        self.failing.borrow_mut().remove(&coord);
    }

    /// Number of fetches begun so far.
    pub fn begun(&self) -> u64 {
        self.begun.get()
    }

    /// Number of fetches cancelled before completion.
    pub fn cancelled(&self) -> u64 {
        self.cancelled.get()
    }

    /// The payload this provider produces for `coord`.
    pub fn payload_for(&self, coord: TileCoord) -> Bytes {
        make_payload(coord, self.payload_size)
    }
}

impl FetchProvider for SimProvider {
    fn begin(&self, coord: TileCoord) -> Box<dyn FetchRequest> {
        self.begun.set(self.begun.get() + 1);
        let outcome = if self.failing.borrow().contains(&coord) {
            Err(FetchError::NotFound)
        } else {
            Ok(make_payload(coord, self.payload_size))
        };
        Box::new(SimRequest {
            remaining: self.latency_polls,
            outcome: Some(outcome),
            cancelled: Rc::clone(&self.cancelled),
        })
    }

    fn name(&self) -> &str {
        "sim"
    }
}

/// Builds a deterministic payload for a coordinate: a textual header
/// padded with zeros to the requested size.
pub fn make_payload(coord: TileCoord, size: usize) -> Bytes {
    let mut data = format!("tile:{}", coord).into_bytes();
    data.resize(data.len().max(size), 0);
    Bytes::from(data)
}

struct SimRequest {
    remaining: u32,
    /// Taken on completion or cancellation; `None` means finished.
    outcome: Option<Result<Bytes, FetchError>>,
    cancelled: Rc<Cell<u64>>,
}

impl FetchRequest for SimRequest {
    fn poll(&mut self) -> FetchPoll {
        if self.outcome.is_none() {
            return FetchPoll::Failed(FetchError::Cancelled);
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return FetchPoll::Pending;
        }
        match self.outcome.take() {
            Some(Ok(payload)) => FetchPoll::Ready(payload),
            Some(Err(error)) => FetchPoll::Failed(error),
            None => FetchPoll::Failed(FetchError::Cancelled),
        }
    }

    fn cancel(&mut self) {
        if self.outcome.take().is_some() {
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

impl Drop for SimRequest {
    fn drop(&mut self) {
        // Dropping an unfinished request counts as cancellation.
        self.cancel();
    }
}
