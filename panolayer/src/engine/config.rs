//! Engine configuration.

use crate::sched::SchedulerConfig;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default cache capacity in cost units (entries under the default policy).
pub const DEFAULT_CACHE_CAPACITY: u64 = 512;

/// Default number of consecutive needed-set applications a tile may be
/// absent from before its in-flight fetch is cancelled.
pub const DEFAULT_RELEASE_AFTER_MISSES: u32 = 3;

// =============================================================================
// Cost Policy
// =============================================================================

/// How the cache prices a resident tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostPolicy {
    /// Every node costs 1; capacity bounds the entry count.
    PerEntry,
    /// A node costs its payload size in bytes (1 while no payload is
    /// resident); capacity bounds total imagery memory.
    PayloadBytes,
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for [`TileEngine`](super::TileEngine).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cache capacity, in units defined by `cost_policy`.
    pub cache_capacity: u64,

    /// How resident tiles are priced against `cache_capacity`.
    pub cost_policy: CostPolicy,

    /// In-flight fetches are cancelled after the tile has been absent from
    /// this many consecutive needed sets. A camera that briefly pans past a
    /// tile and comes back does not lose its download.
    pub release_after_misses: u32,

    /// Frame-budget and starvation tuning for the scheduler.
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cost_policy: CostPolicy::PerEntry,
            release_after_misses: DEFAULT_RELEASE_AFTER_MISSES,
            scheduler: SchedulerConfig::default(),
        }
    }
}
