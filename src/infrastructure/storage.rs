//! Sharded concurrent map used by the in-memory request log.
//!
//! Each key lives in one DashMap shard; operations on keys in different
//! shards never contend, and operations on one key are serialized by that
//! shard's lock.

use ahash::RandomState;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;

/// Thread-safe sharded storage backed by DashMap.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V, RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    /// Create a new sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Create storage sized for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Run `accessor` on the value for `key`, inserting `factory()` first if
    /// absent. The shard lock is held for the duration of `accessor`.
    pub fn with_entry_mut<R>(
        &self,
        key: K,
        factory: impl FnOnce() -> V,
        accessor: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut value = self.map.entry(key).or_insert_with(factory);
        accessor(value.value_mut())
    }

    /// Run `accessor` on an existing value without inserting.
    pub fn with_existing_mut<Q, R>(&self, key: &Q, accessor: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get_mut(key).map(|mut value| accessor(value.value_mut()))
    }

    /// Remove `key` if `predicate` holds for its value.
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove_if(key, |_, value| predicate(value)).is_some()
    }

    /// Keep only the entries for which `f` returns true.
    pub fn retain(&self, f: impl FnMut(&K, &mut V) -> bool) {
        self.map.retain(f);
    }

    /// Fold over all values. Shards are visited one at a time.
    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, &V) -> A) -> A {
        self.map.iter().fold(init, |acc, entry| f(acc, entry.value()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_with_entry_mut_inserts_once() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();

        storage.with_entry_mut("key", || 10, |v| *v += 1);
        storage.with_entry_mut("key", || 100, |v| *v += 1);

        assert_eq!(storage.with_existing_mut("key", |v| *v), Some(12));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_with_existing_mut_does_not_insert() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();

        assert_eq!(storage.with_existing_mut("missing", |v| *v), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_remove_if() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();
        storage.with_entry_mut("zero", || 0, |_| ());
        storage.with_entry_mut("one", || 1, |_| ());

        assert!(!storage.remove_if("one", |v| *v == 0));
        assert!(storage.remove_if("zero", |v| *v == 0));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_retain_and_fold() {
        let storage: ShardedStorage<u32, u32> = ShardedStorage::with_capacity(16);
        for i in 0..10 {
            storage.with_entry_mut(i, || i, |_| ());
        }

        storage.retain(|_, v| *v % 2 == 0);
        assert_eq!(storage.len(), 5);
        assert_eq!(storage.fold(0, |acc, v| acc + v), 2 + 4 + 6 + 8);

        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let storage = Arc::new(ShardedStorage::<String, u64>::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for j in 0..100 {
                        storage.with_entry_mut(format!("key_{}", j % 10), || 0, |v| *v += 1);
                        storage.with_entry_mut(format!("own_{}_{}", i, j), || 0, |v| *v += 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.len(), 10 + 1000);
        assert_eq!(storage.fold(0, |acc, v| acc + v), 2000);
    }
}
