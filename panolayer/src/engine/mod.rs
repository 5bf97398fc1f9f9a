//! Engine facade tying cache, scheduler, and provider together.
//!
//! [`TileEngine`] is the single entry point an embedder needs: declare
//! demand with [`TileEngine::request`] or [`TileEngine::apply_needed`],
//! pump [`TileEngine::tick`] from the render loop, and read results
//! through [`TileEngine::best_available`] and subscriptions.

mod config;
mod core;
mod fetch;
mod listeners;

pub use config::{
    CostPolicy, EngineConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_RELEASE_AFTER_MISSES,
};
pub use self::core::{NeededSetResolver, RequestOutcome, TickSummary, TileEngine};
pub use listeners::{SubscriptionId, TileEvent};
