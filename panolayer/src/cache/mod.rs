//! Bounded tile residency cache.
//!
//! The engine keeps every [`TileNode`](crate::tile::TileNode) it knows about
//! in one access-ordered cache so total memory stays bounded no matter how
//! far the camera wanders. The cache itself is policy-free: it prices
//! entries through a caller-supplied cost function and reports evictions
//! through a synchronous handler; cancelling the evicted tile's outstanding
//! work is the owner's contract, not the cache's.

mod lru;
mod stats;
mod types;

pub use lru::{EvictionHandler, LruCache};
pub use stats::CacheStats;
pub use types::CacheError;
