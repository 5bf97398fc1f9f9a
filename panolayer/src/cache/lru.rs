//! Access-ordered bounded cache with O(1) operations.
//!
//! Entries live in a slot arena threaded onto an intrusive doubly-linked
//! list ordered from most to least recently touched. A `HashMap` keyed by
//! the caller's id maps to slot indices, so get, put, touch, and remove are
//! all O(1); eviction pops from the tail until capacity is restored.
//!
//! Capacity is expressed in abstract cost units supplied by a caller cost
//! function: constant 1 per entry gives a count-bounded cache, a byte cost
//! gives a size-bounded one.

use std::collections::HashMap;
use std::hash::Hash;

use super::stats::CacheStats;
use super::types::CacheError;

/// Sentinel slot index meaning "no slot".
const NIL: usize = usize::MAX;

/// Callback invoked for each entry evicted in LRU order.
///
/// The callback runs synchronously before the value is dropped, giving the
/// owner a chance to cancel outstanding work tied to the entry.
pub type EvictionHandler<K, V> = Box<dyn FnMut(&K, &mut V)>;

struct Slot<K, V> {
    key: K,
    value: V,
    cost: u64,
    prev: usize,
    next: usize,
}

/// Bounded cache keeping the most recently touched entries resident.
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: u64,
    used: u64,
    cost_fn: Box<dyn Fn(&V) -> u64>,
    on_evict: Option<EvictionHandler<K, V>>,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates a cache bounded to `capacity` cost units.
    ///
    /// `cost_fn` prices each entry; pass `|_| 1` for a count-bounded cache.
    pub fn new(capacity: u64, cost_fn: impl Fn(&V) -> u64 + 'static) -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            used: 0,
            cost_fn: Box::new(cost_fn),
            on_evict: None,
            stats: CacheStats::new(),
        }
    }

    /// Installs the eviction handler invoked before an entry is dropped.
    pub fn set_eviction_handler(&mut self, handler: impl FnMut(&K, &mut V) + 'static) {
        self.on_evict = Some(Box::new(handler));
    }

    /// Returns the value for `key`, promoting it to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.promote(idx);
                self.stats.record_hit();
                self.slots[idx].as_ref().map(|slot| &slot.value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Mutable variant of [`get`](Self::get); also promotes the entry.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.promote(idx);
                self.stats.record_hit();
                self.slots[idx].as_mut().map(|slot| &mut slot.value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Returns the value for `key` without disturbing access order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    /// Mutable variant of [`peek`](Self::peek); no promotion.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_mut().map(|slot| &mut slot.value)
    }

    /// Promotes `key` to most recently used without returning the value.
    ///
    /// Returns `false` if the key is absent.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.promote(idx);
                true
            }
            None => false,
        }
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// Evicts least recently used entries (invoking the eviction handler
    /// for each) until the cache fits within capacity again; evicted keys
    /// are returned. An entry whose cost alone exceeds capacity is rejected
    /// with [`CacheError::EntryTooLarge`] and the cache is left unchanged.
    pub fn put(&mut self, key: K, value: V) -> Result<Vec<K>, CacheError> {
        let cost = (self.cost_fn)(&value);
        if cost > self.capacity {
            self.stats.record_rejection();
            return Err(CacheError::EntryTooLarge {
                cost,
                capacity: self.capacity,
            });
        }

        // Replacement keeps the slot and order position.
        if let Some(idx) = self.map.get(&key).copied() {
            let slot = self.slots[idx].as_mut().unwrap_or_else(|| unreachable!());
            let old_cost = slot.cost;
            slot.value = value;
            slot.cost = cost;
            self.used = self.used - old_cost + cost;
            self.promote(idx);
            let evicted = self.evict_to_capacity(idx);
            self.refresh_residency();
            return Ok(evicted);
        }

        let idx = self.alloc_slot(key.clone(), value, cost);
        self.map.insert(key, idx);
        self.used += cost;
        self.link_front(idx);
        let evicted = self.evict_to_capacity(idx);
        self.refresh_residency();
        Ok(evicted)
    }

    /// Re-prices an existing entry through the cost function.
    ///
    /// Used when a resident value grows (e.g. a payload arrives). The entry
    /// is promoted, then others are evicted until capacity is restored. If
    /// the new cost alone exceeds capacity the entry is removed outright and
    /// `EntryTooLarge` is returned; the eviction handler is not invoked for
    /// it, since the caller still holds responsibility for that entry.
    pub fn update_cost(&mut self, key: &K) -> Result<Vec<K>, CacheError> {
        let idx = match self.map.get(key).copied() {
            Some(idx) => idx,
            None => return Ok(Vec::new()),
        };
        let slot = self.slots[idx].as_mut().unwrap_or_else(|| unreachable!());
        let new_cost = (self.cost_fn)(&slot.value);
        let old_cost = slot.cost;
        slot.cost = new_cost;
        self.used = self.used - old_cost + new_cost;

        if new_cost > self.capacity {
            self.stats.record_rejection();
            self.remove(key);
            return Err(CacheError::EntryTooLarge {
                cost: new_cost,
                capacity: self.capacity,
            });
        }

        self.promote(idx);
        let evicted = self.evict_to_capacity(idx);
        self.refresh_residency();
        Ok(evicted)
    }

    /// Removes the entry for `key` outside LRU order, returning its value.
    ///
    /// The eviction handler is not invoked; explicit removal means the
    /// caller already knows the entry is going away.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        let slot = self.slots[idx].take()?;
        self.free.push(idx);
        self.used -= slot.cost;
        self.refresh_residency();
        Some(slot.value)
    }

    /// Checks whether `key` is resident without touching it.
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total cost of resident entries.
    pub fn total_cost(&self) -> u64 {
        self.used
    }

    /// Configured capacity in cost units.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Iterates over resident keys in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Returns a snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.update_residency(self.used, self.map.len());
        stats
    }

    /// Evicts from the tail until `used <= capacity`, never evicting
    /// `protect` (the entry that triggered the operation, already priced
    /// within capacity).
    fn evict_to_capacity(&mut self, protect: usize) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.used > self.capacity {
            let victim = self.tail;
            if victim == NIL || victim == protect {
                break;
            }
            self.unlink(victim);
            let mut slot = match self.slots[victim].take() {
                Some(slot) => slot,
                None => break,
            };
            self.free.push(victim);
            self.map.remove(&slot.key);
            self.used -= slot.cost;
            self.stats.record_eviction();
            if let Some(handler) = self.on_evict.as_mut() {
                handler(&slot.key, &mut slot.value);
            }
            evicted.push(slot.key);
        }
        evicted
    }

    fn refresh_residency(&mut self) {
        let (used, len) = (self.used, self.map.len());
        self.stats.update_residency(used, len);
    }

    fn alloc_slot(&mut self, key: K, value: V, cost: u64) -> usize {
        let slot = Slot {
            key,
            value,
            cost,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Moves a linked slot to the front (most recently used).
    fn promote(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = self.slots[idx].as_mut().unwrap_or_else(|| unreachable!());
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            if let Some(head_slot) = self.slots[old_head].as_mut() {
                head_slot.prev = idx;
            }
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };
        if prev != NIL {
            if let Some(slot) = self.slots[prev].as_mut() {
                slot.next = next;
            }
        } else {
            self.head = next;
        }
        if next != NIL {
            if let Some(slot) = self.slots[next].as_mut() {
                slot.prev = prev;
            }
        } else {
            self.tail = prev;
        }
        if let Some(slot) = self.slots[idx].as_mut() {
            slot.prev = NIL;
            slot.next = NIL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn count_cache(capacity: u64) -> LruCache<&'static str, u32> {
        LruCache::new(capacity, |_| 1)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Basic operations
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_put_and_get() {
        let mut cache = count_cache(4);
        cache.put("a", 1).unwrap();
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_miss() {
        let mut cache = count_cache(4);
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let mut cache = count_cache(4);
        cache.put("a", 1).unwrap();
        cache.put("a", 2).unwrap();
        assert_eq!(cache.get(&"a"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_returns_value() {
        let mut cache = count_cache(4);
        cache.put("a", 1).unwrap();
        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut cache = count_cache(2);
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        cache.peek(&"a");
        // "a" is still least recently used and should be evicted.
        let evicted = cache.put("c", 3).unwrap();
        assert_eq!(evicted, vec!["a"]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Eviction order
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = count_cache(2);
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        let evicted = cache.put("c", 3).unwrap();
        assert_eq!(evicted, vec!["a"]);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let mut cache = count_cache(2);
        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        assert!(cache.touch(&"a"));
        let evicted = cache.put("c", 3).unwrap();
        assert_eq!(evicted, vec!["b"]);
        assert!(cache.contains(&"a"));
    }

    #[test]
    fn test_touch_missing_returns_false() {
        let mut cache = count_cache(2);
        assert!(!cache.touch(&"nope"));
    }

    #[test]
    fn test_touch_changes_eviction_victim_abcd() {
        // Capacity 3: insert A,B,C; touch A; insert D -> B evicted.
        let mut cache = count_cache(3);
        cache.put("A", 0).unwrap();
        cache.put("B", 0).unwrap();
        cache.put("C", 0).unwrap();
        cache.get(&"A");
        let evicted = cache.put("D", 0).unwrap();
        assert_eq!(evicted, vec!["B"]);
        for key in ["A", "C", "D"] {
            assert!(cache.contains(&key), "{key} should remain resident");
        }
    }

    #[test]
    fn test_eviction_handler_fires_before_drop() {
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut cache = count_cache(1);
        cache.set_eviction_handler(move |key, _value| sink.borrow_mut().push(*key));

        cache.put("a", 1).unwrap();
        cache.put("b", 2).unwrap();
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cost accounting
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_capacity_invariant_with_byte_costs() {
        let mut cache: LruCache<u32, Vec<u8>> = LruCache::new(1000, |v: &Vec<u8>| v.len() as u64);
        for i in 0..10u32 {
            cache.put(i, vec![0u8; 300]).unwrap();
            assert!(
                cache.total_cost() <= cache.capacity(),
                "capacity exceeded after put {i}"
            );
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let mut cache: LruCache<u32, Vec<u8>> = LruCache::new(100, |v: &Vec<u8>| v.len() as u64);
        cache.put(1, vec![0u8; 60]).unwrap();
        let err = cache.put(2, vec![0u8; 200]).unwrap_err();
        assert_eq!(
            err,
            CacheError::EntryTooLarge {
                cost: 200,
                capacity: 100
            }
        );
        // Resident entries are untouched by a rejection.
        assert!(cache.contains(&1));
        assert_eq!(cache.total_cost(), 60);
    }

    #[test]
    fn test_update_cost_evicts_others() {
        let mut cache: LruCache<u32, Vec<u8>> = LruCache::new(100, |v: &Vec<u8>| v.len() as u64);
        cache.put(1, vec![0u8; 40]).unwrap();
        cache.put(2, Vec::new()).unwrap();
        // Entry 2 grows to 80 bytes; entry 1 must go.
        cache.peek_mut(&2).unwrap().resize(80, 0);
        let evicted = cache.update_cost(&2).unwrap();
        assert_eq!(evicted, vec![1]);
        assert_eq!(cache.total_cost(), 80);
    }

    #[test]
    fn test_update_cost_rejects_oversized_growth() {
        let mut cache: LruCache<u32, Vec<u8>> = LruCache::new(100, |v: &Vec<u8>| v.len() as u64);
        cache.put(1, Vec::new()).unwrap();
        cache.peek_mut(&1).unwrap().resize(500, 0);
        let err = cache.update_cost(&1).unwrap_err();
        assert!(matches!(err, CacheError::EntryTooLarge { cost: 500, .. }));
        assert!(!cache.contains(&1));
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_slot_reuse_after_removal() {
        let mut cache = count_cache(2);
        for round in 0..100u32 {
            cache.put("x", round).unwrap();
            cache.remove(&"x");
        }
        // The arena should not have grown beyond a couple of slots.
        assert!(cache.slots.len() <= 2);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_stats_track_hits_misses_evictions() {
        let mut cache = count_cache(1);
        cache.put("a", 1).unwrap();
        cache.get(&"a");
        cache.get(&"b");
        cache.put("c", 2).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.resident_cost, 1);
    }
}
