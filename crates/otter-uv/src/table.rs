//! Id-keyed record storage shared by requests, timers and servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Live records of one kind, keyed by a monotonically increasing id.
///
/// Removal hands the record back by value, so whoever removes it is its only
/// owner from then on. The lock is never held across a call into host code.
pub(crate) struct RecordTable<R> {
    next_id: AtomicU64,
    records: Mutex<HashMap<u64, R>>,
}

impl<R> RecordTable<R> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve an id. Ids are never reused within a context.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert(&self, id: u64, record: R) {
        self.records.lock().insert(id, record);
    }

    /// Build and insert a record under the table lock. A completion for `id`
    /// raised while `make` runs cannot be dispatched before the record exists.
    pub(crate) fn insert_with(&self, id: u64, make: impl FnOnce() -> R) {
        let mut records = self.records.lock();
        records.insert(id, make());
    }

    pub(crate) fn remove(&self, id: u64) -> Option<R> {
        self.records.lock().remove(&id)
    }

    /// Run `f` against a live record without removing it.
    pub(crate) fn with<T>(&self, id: u64, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.records.lock().get_mut(&id).map(f)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_removal_is_single() {
        let table = RecordTable::new();
        let first = table.next_id();
        let second = table.next_id();
        assert_ne!(first, second);

        table.insert(first, "a");
        table.insert(second, "b");
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(first), Some("a"));
        assert_eq!(table.remove(first), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_with_mutates_in_place() {
        let table = RecordTable::new();
        let id = table.next_id();
        table.insert(id, 0u32);
        assert_eq!(table.with(id, |n| { *n += 1; *n }), Some(1));
        assert_eq!(table.with(id + 1, |n| *n), None);
        assert_eq!(table.remove(id), Some(1));
        assert!(table.is_empty());
    }
}
