//! Tile readiness subscriptions.

use std::collections::HashMap;

use crate::coord::TileCoord;

/// Terminal event delivered to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    /// The tile's payload is resident.
    Ready,
    /// The fetch failed, starved, was rejected by the cache, or the node
    /// was evicted before completing.
    Failed,
}

/// Handle returned by `subscribe`, used to revoke the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(TileCoord, TileEvent)>;

struct Entry {
    id: SubscriptionId,
    generation: u64,
    callback: Callback,
}

/// Per-coordinate one-shot listeners with generation guarding.
///
/// Each entry carries the node generation observed at subscription time;
/// `notify` fires only entries matching the node's current generation and
/// silently drops entries left over from earlier generations, so a
/// subscriber never hears about a tile slot that was reused out from under
/// it.
#[derive(Default)]
pub(super) struct ListenerTable {
    entries: HashMap<TileCoord, Vec<Entry>>,
    next_id: u64,
}

impl ListenerTable {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Allocates an id without storing an entry, for subscriptions
    /// satisfied immediately.
    pub(super) fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    pub(super) fn subscribe(
        &mut self,
        coord: TileCoord,
        generation: u64,
        callback: Callback,
    ) -> SubscriptionId {
        let id = self.next_id();
        self.entries.entry(coord).or_default().push(Entry {
            id,
            generation,
            callback,
        });
        id
    }

    /// Removes the subscription; returns `false` if it already fired or
    /// never existed.
    pub(super) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for entries in self.entries.values_mut() {
            if let Some(pos) = entries.iter().position(|entry| entry.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Fires entries for `coord` whose generation matches `generation`,
    /// removing them; entries from older generations are dropped unfired.
    /// Returns the number of callbacks invoked.
    pub(super) fn notify(
        &mut self,
        coord: TileCoord,
        generation: u64,
        event: TileEvent,
    ) -> usize {
        let Some(entries) = self.entries.remove(&coord) else {
            return 0;
        };
        let mut fired = 0;
        let mut kept = Vec::new();
        for mut entry in entries {
            if entry.generation == generation {
                (entry.callback)(coord, event);
                fired += 1;
            } else if entry.generation > generation {
                kept.push(entry);
            }
        }
        if !kept.is_empty() {
            self.entries.insert(coord, kept);
        }
        fired
    }

    /// Fires every remaining entry for `coord` regardless of generation,
    /// then removes them. Used on eviction, where the node (and its
    /// generation) no longer exists but dependents still must hear that
    /// the tile will never arrive.
    pub(super) fn notify_all(&mut self, coord: TileCoord, event: TileEvent) -> usize {
        let Some(mut entries) = self.entries.remove(&coord) else {
            return 0;
        };
        for entry in &mut entries {
            (entry.callback)(coord, event);
        }
        entries.len()
    }

    /// Drops all entries for `coord` without firing them.
    pub(super) fn drop_coord(&mut self, coord: TileCoord) {
        self.entries.remove(&coord);
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn coord() -> TileCoord {
        TileCoord::new(0, 0, 0, 1).unwrap()
    }

    fn recorder() -> (Rc<RefCell<Vec<TileEvent>>>, Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, Box::new(move |_, event| sink.borrow_mut().push(event)))
    }

    #[test]
    fn test_notify_fires_matching_generation_once() {
        let mut table = ListenerTable::new();
        let (log, callback) = recorder();
        table.subscribe(coord(), 1, callback);

        assert_eq!(table.notify(coord(), 1, TileEvent::Ready), 1);
        assert_eq!(*log.borrow(), vec![TileEvent::Ready]);
        // One-shot: a second notify finds nothing.
        assert_eq!(table.notify(coord(), 1, TileEvent::Ready), 0);
    }

    #[test]
    fn test_stale_generation_dropped_unfired() {
        let mut table = ListenerTable::new();
        let (log, callback) = recorder();
        table.subscribe(coord(), 1, callback);

        assert_eq!(table.notify(coord(), 2, TileEvent::Ready), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(table.len(), 0, "stale entry must be pruned");
    }

    #[test]
    fn test_future_generation_kept() {
        let mut table = ListenerTable::new();
        let (log, callback) = recorder();
        table.subscribe(coord(), 2, callback);

        assert_eq!(table.notify(coord(), 1, TileEvent::Failed), 0);
        assert!(log.borrow().is_empty());
        assert_eq!(table.notify(coord(), 2, TileEvent::Ready), 1);
        assert_eq!(*log.borrow(), vec![TileEvent::Ready]);
    }

    #[test]
    fn test_unsubscribe_revokes() {
        let mut table = ListenerTable::new();
        let (log, callback) = recorder();
        let id = table.subscribe(coord(), 1, callback);

        assert!(table.unsubscribe(id));
        assert!(!table.unsubscribe(id));
        table.notify(coord(), 1, TileEvent::Ready);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_notify_all_ignores_generation() {
        let mut table = ListenerTable::new();
        let (log_a, cb_a) = recorder();
        let (log_b, cb_b) = recorder();
        table.subscribe(coord(), 1, cb_a);
        table.subscribe(coord(), 3, cb_b);

        assert_eq!(table.notify_all(coord(), TileEvent::Failed), 2);
        assert_eq!(*log_a.borrow(), vec![TileEvent::Failed]);
        assert_eq!(*log_b.borrow(), vec![TileEvent::Failed]);
        assert_eq!(table.len(), 0);
    }
}
