//! Fetch provider traits and error types.

use bytes::Bytes;
use thiserror::Error;

use crate::coord::TileCoord;

/// Errors that can occur while fetching a tile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The bytes arrived but could not be decoded into imagery.
    #[error("decode error: {0}")]
    Decode(String),
    /// No imagery exists for this coordinate.
    #[error("tile not available from provider")]
    NotFound,
    /// The fetch was cancelled before completion.
    #[error("fetch cancelled")]
    Cancelled,
}

/// Result of polling an in-flight fetch.
pub enum FetchPoll {
    /// Not finished yet; poll again on a later step.
    Pending,
    /// The tile payload arrived.
    Ready(Bytes),
    /// The fetch failed.
    Failed(FetchError),
}

/// Source of tile imagery bytes.
///
/// `begin` starts a fetch and returns a pollable handle; the engine polls
/// it from job steps, one poll per scheduling slot. Implementations must
/// not block inside `begin` or `poll`.
pub trait FetchProvider {
    /// Starts fetching the tile at `coord`.
    fn begin(&self, coord: TileCoord) -> Box<dyn FetchRequest>;

    /// Returns the provider's name for logging and identification.
    fn name(&self) -> &str;
}

/// An in-flight, cancellable fetch.
///
/// Implementations must stop all work and deliver no further results after
/// `cancel`, and must treat being dropped as cancellation.
pub trait FetchRequest {
    /// Polls for completion. After returning `Ready` or `Failed` the
    /// request is finished and must not be polled again.
    fn poll(&mut self) -> FetchPoll;

    /// Abandons the fetch mid-flight.
    fn cancel(&mut self);
}
