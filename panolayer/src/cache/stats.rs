//! Cache statistics.

/// Counters describing cache behavior over its lifetime.
///
/// Resident figures reflect the state after the most recent operation;
/// the remaining counters are cumulative.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a resident entry.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries evicted in LRU order to restore capacity.
    pub evictions: u64,
    /// Entries rejected because their cost alone exceeded capacity.
    pub rejections: u64,
    /// Total cost of resident entries.
    pub resident_cost: u64,
    /// Number of resident entries.
    pub entry_count: usize,
}

impl CacheStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    pub(crate) fn update_residency(&mut self, cost: u64, entries: usize) {
        self.resident_cost = cost;
        self.entry_count = entries;
    }

    /// Hit ratio over all lookups (0.0 - 1.0). Returns 1.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
