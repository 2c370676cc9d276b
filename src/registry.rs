// Handle Registry: process-wide, mutex-protected maps from opaque u32 IDs
// to owned entities. Backs connections, statements, transactions, streams,
// and pools with the same locking discipline (§4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{EngineError, Result};

/// A generic registry for one handle kind. ID `0` is reserved to mean
/// "none/failure" and is never handed out by `insert`.
pub struct HandleRegistry<T> {
    next_id: AtomicU32,
    entries: Mutex<HashMap<u32, Arc<T>>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh ID and stores the entity under it. IDs are never
    /// reused within the process lifetime (until the 32-bit space wraps,
    /// which a long-running process is expected to outlive in practice).
    pub fn insert(&self, entity: T) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, Arc::new(entity));
        id
    }

    /// Reserves an ID up front and passes it to `build`, so an entity that
    /// needs to know its own handle ID (for error messages, e.g.
    /// `TransactionClosed(self.id)`) can be constructed with it already set.
    /// If `build` fails, the reserved ID is simply never inserted and is
    /// not reused.
    pub fn insert_with<E>(&self, build: impl FnOnce(u32) -> std::result::Result<T, E>) -> std::result::Result<u32, E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entity = build(id)?;
        self.entries.lock().insert(id, Arc::new(entity));
        Ok(id)
    }

    pub fn get(&self, id: u32) -> Result<Arc<T>> {
        self.entries
            .lock()
            .get(&id)
            .cloned()
            .ok_or(EngineError::InvalidHandle(id))
    }

    /// Removes and returns the entity so the caller can run any
    /// entity-specific teardown (e.g. a best-effort driver rollback) before
    /// it drops. Idempotent: a second removal fails with `InvalidHandle`.
    pub fn remove(&self, id: u32) -> Result<Arc<T>> {
        self.entries
            .lock()
            .remove(&id)
            .ok_or(EngineError::InvalidHandle(id))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Bulk-removes every entry, returning the removed entities for
    /// teardown. Backs `clear_all_statements`.
    pub fn clear_all(&self) -> Vec<Arc<T>> {
        self.entries.lock().drain().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live IDs, for operations like `clear_all_statements`
    /// that need to act per-connection without holding the registry lock
    /// across driver calls.
    pub fn ids(&self) -> Vec<u32> {
        self.entries.lock().keys().copied().collect()
    }

    /// Removes every entry matching a predicate, returning them for
    /// teardown. Used when closing a connection to also close its
    /// statements, transactions, and streams.
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        let mut entries = self.entries.lock();
        let ids: Vec<u32> = entries
            .iter()
            .filter(|(_, v)| predicate(v))
            .map(|(k, _)| *k)
            .collect();
        ids.into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_never_hands_out_zero() {
        let reg: HandleRegistry<&str> = HandleRegistry::new();
        let id = reg.insert("a");
        assert_ne!(id, 0);
    }

    #[test]
    fn removed_id_never_resolves_again() {
        let reg: HandleRegistry<&str> = HandleRegistry::new();
        let id = reg.insert("a");
        assert!(reg.get(id).is_ok());
        assert!(reg.remove(id).is_ok());
        assert!(matches!(reg.get(id), Err(EngineError::InvalidHandle(_))));
        assert!(matches!(reg.remove(id), Err(EngineError::InvalidHandle(_))));
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let reg: HandleRegistry<u32> = HandleRegistry::new();
        let a = reg.insert(1);
        let b = reg.insert(2);
        let c = reg.insert(3);
        assert!(a < b && b < c);
    }

    #[test]
    fn clear_all_empties_the_registry() {
        let reg: HandleRegistry<u32> = HandleRegistry::new();
        reg.insert(1);
        reg.insert(2);
        assert_eq!(reg.clear_all().len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn insert_with_passes_the_reserved_id_to_the_builder() {
        let reg: HandleRegistry<u32> = HandleRegistry::new();
        let id = reg.insert_with(|id| Ok::<_, EngineError>(id)).unwrap();
        assert_eq!(*reg.get(id).unwrap(), id);
    }

    #[test]
    fn insert_with_does_not_store_on_failure() {
        let reg: HandleRegistry<u32> = HandleRegistry::new();
        let result = reg.insert_with(|_| Err::<u32, _>(EngineError::Validation("nope".into())));
        assert!(result.is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_where_filters_by_predicate() {
        let reg: HandleRegistry<(u32, bool)> = HandleRegistry::new();
        reg.insert((1, true));
        reg.insert((2, false));
        reg.insert((3, true));
        let removed = reg.remove_where(|(_, flag)| *flag);
        assert_eq!(removed.len(), 2);
        assert_eq!(reg.len(), 1);
    }
}
