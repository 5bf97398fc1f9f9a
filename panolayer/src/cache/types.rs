//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A single entry's cost exceeds the total cache capacity.
    ///
    /// The entry is rejected rather than evicting the entire cache for an
    /// item that can never fit.
    #[error("entry cost {cost} exceeds cache capacity {capacity}")]
    EntryTooLarge { cost: u64, capacity: u64 },
}
