//! # In-Memory Key/Value Store
//!
//! Ordered store backing the resource store in tests and tooling.
//! Production hosts hand in their transaction-scoped store instead.

use crate::errors::StoreError;
use crate::ports::outbound::KvStore;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory ordered key/value store.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKvStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every entry, for rolling back a failed transaction.
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        Ok(self.entries.read().map_err(|_| StoreError::LockPoisoned)?.clone())
    }

    /// Replaces every entry with `snapshot`.
    pub fn restore(&self, snapshot: BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), StoreError> {
        *self.entries.write().map_err(|_| StoreError::LockPoisoned)? = snapshot;
        Ok(())
    }

    /// Number of entries.
    pub fn entry_count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iter_prefix_is_ordered_and_bounded() {
        let kv = InMemoryKvStore::new();
        kv.set(&[1, 2], b"b").unwrap();
        kv.set(&[1, 1], b"a").unwrap();
        kv.set(&[2, 0], b"c").unwrap();

        let found = kv.iter_prefix(&[1]).unwrap();
        assert_eq!(found, vec![(vec![1, 1], b"a".to_vec()), (vec![1, 2], b"b".to_vec())]);
    }

    #[test]
    fn test_snapshot_restore() {
        let kv = InMemoryKvStore::new();
        kv.set(b"k", b"v1").unwrap();
        let snapshot = kv.snapshot().unwrap();

        kv.set(b"k", b"v2").unwrap();
        kv.set(b"other", b"x").unwrap();
        kv.restore(snapshot).unwrap();

        assert_eq!(kv.get(b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(kv.entry_count().unwrap(), 1);
    }
}
