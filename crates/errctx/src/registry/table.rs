//! Id-indexed storage shared by the namespace and class tables.
//!
//! The first [`DIRECT_SLOTS`] ids live in write-once slots that are read
//! without locking. Later ids go to an overflow map behind a read-write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::id::is_valid_id;

/// Ids served from the lock-free array
pub const DIRECT_SLOTS: usize = 128;

pub(crate) struct IdTable<T> {
    next: AtomicU32,
    direct: Box<[OnceLock<Arc<T>>]>,
    overflow: RwLock<HashMap<u32, Arc<T>>>,
}

impl<T> IdTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            direct: (0..DIRECT_SLOTS).map(|_| OnceLock::new()).collect(),
            overflow: RwLock::new(HashMap::new()),
        }
    }

    /// Reserve the next id, `None` once the id space is exhausted.
    pub(crate) fn next_id(&self) -> Option<u32> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                is_valid_id(id).then(|| id + 1)
            })
            .ok()
    }

    /// Store the value for an id obtained from [`IdTable::next_id`].
    pub(crate) fn insert(&self, id: u32, value: Arc<T>) {
        match direct_index(id) {
            Some(index) => {
                // Ids are handed out once, so the slot is always empty here.
                let _ = self.direct[index].set(value);
            }
            None => {
                self.overflow.write().insert(id, value);
            }
        }
    }

    pub(crate) fn get(&self, id: u32) -> Option<Arc<T>> {
        match direct_index(id) {
            Some(index) => self.direct[index].get().cloned(),
            None => self.overflow.read().get(&id).cloned(),
        }
    }

    /// Hold the overflow read lock for a batch of lookups.
    pub(crate) fn read(&self) -> TableView<'_, T> {
        TableView {
            direct: &self.direct,
            overflow: self.overflow.read(),
        }
    }

    /// Number of ids handed out so far
    pub(crate) fn len(&self) -> usize {
        (self.next.load(Ordering::Acquire) - 1) as usize
    }

    /// Snapshot of every stored value, in no particular order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        let view = self.read();
        view.direct
            .iter()
            .filter_map(|slot| slot.get().cloned())
            .chain(view.overflow.values().cloned())
            .collect()
    }
}

pub(crate) struct TableView<'a, T> {
    direct: &'a [OnceLock<Arc<T>>],
    overflow: RwLockReadGuard<'a, HashMap<u32, Arc<T>>>,
}

impl<T> TableView<'_, T> {
    pub(crate) fn get(&self, id: u32) -> Option<&Arc<T>> {
        match direct_index(id) {
            Some(index) => self.direct[index].get(),
            None => self.overflow.get(&id),
        }
    }
}

fn direct_index(id: u32) -> Option<usize> {
    let index = (id as usize).checked_sub(1)?;
    (index < DIRECT_SLOTS).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(table: &IdTable<u32>, count: usize) -> Vec<u32> {
        (0..count)
            .map(|_| {
                let id = table.next_id().unwrap();
                table.insert(id, Arc::new(id * 10));
                id
            })
            .collect()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let table = IdTable::new();
        assert_eq!(fill(&table, 3), [1, 2, 3]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn lookups_span_direct_and_overflow() {
        let table = IdTable::new();
        let ids = fill(&table, DIRECT_SLOTS + 5);

        for id in ids {
            assert_eq!(table.get(id).as_deref(), Some(&(id * 10)));
        }
        let view = table.read();
        assert_eq!(view.get(1).map(|v| **v), Some(10));
        let last = (DIRECT_SLOTS + 5) as u32;
        assert_eq!(view.get(last).map(|v| **v), Some(last * 10));
        assert!(view.get(last + 1).is_none());
    }

    #[test]
    fn zero_is_never_found() {
        let table = IdTable::<u32>::new();
        fill(&table, 1);
        assert!(table.get(0).is_none());
        assert!(direct_index(0).is_none());
    }

    #[test]
    fn exhausted_counter_stops() {
        let table = IdTable::<u32>::new();
        table.next.store(crate::id::SENTINEL_ID - 1, Ordering::Release);
        assert_eq!(table.next_id(), Some(crate::id::SENTINEL_ID - 1));
        assert_eq!(table.next_id(), None);
        assert_eq!(table.next_id(), None);
    }

    #[test]
    fn snapshot_collects_everything() {
        let table = IdTable::new();
        fill(&table, DIRECT_SLOTS + 2);
        assert_eq!(table.snapshot().len(), DIRECT_SLOTS + 2);
    }
}
