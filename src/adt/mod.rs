//! Shared data structures
//!
//! `ConcurrentMap` is the only structure mutated from several threads.
//! Cache, statistics and registries are built on top of it so every
//! logical update is expressed against a single key.


use dashmap::DashMap;
use std::hash::Hash;

/// Thread-safe key/value store with per-key linearizable access.
///
/// Keys are spread over independently locked shards, so writers to
/// different keys only contend when they hash to the same shard, and then
/// only for the duration of a single insert.
pub struct ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    inner: DashMap<K, V>,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Insert or overwrite, returning the previous value
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// Run `f` against the stored value while holding the key's read lock
    pub fn with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.get(key).map(|entry| f(entry.value()))
    }

    /// Mutate an existing value in place under the key's write lock
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.inner.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Insert `init()` when the key is absent, otherwise apply `modify`.
    ///
    /// Both branches run under the same write lock, so concurrent upserts
    /// on one key never both observe it as absent. Returns `true` when the
    /// value was inserted.
    pub fn upsert(&self, key: K, init: impl FnOnce() -> V, modify: impl FnOnce(&mut V)) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.inner.entry(key) {
            Entry::Occupied(mut entry) => {
                modify(entry.get_mut());
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(init());
                true
            }
        }
    }

    /// Fetch the value for `key`, inserting `init()` first when absent,
    /// then apply `f` to it under the write lock.
    pub fn alter<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut entry = self.inner.entry(key).or_insert_with(init);
        f(entry.value_mut())
    }

    /// Map every entry through `f` without cloning stored values
    pub fn collect_with<R>(&self, f: impl Fn(&K, &V) -> R) -> Vec<R> {
        self.inner
            .iter()
            .map(|entry| f(entry.key(), entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Cloned value for `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Point-in-time copy of every entry; no ordering guarantee
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.inner.len())
            .finish()
    }
}
