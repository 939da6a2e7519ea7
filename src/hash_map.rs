//! Fixed-width striped hash map.
//!
//! A [`LockFreeHashMap`] is an array of [`LinkedSet`]-style buckets, each a
//! `LinkedList<K, V>`, sharing one pool, one retire stack, and one epoch
//! manager across the whole map. Routing a key to its bucket is a plain
//! `hash(k) % bucket_count`; every operation then delegates to that
//! bucket's own insert/search/remove, which already provides the
//! update-or-insert atomicity a map needs — no additional synchronisation
//! is layered on top of what `LinkedList` does per bucket.

use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use crate::config::HashMapConfig;
use crate::epoch::EpochManager;
use crate::error::LockFreeError;
use crate::linked_set::{LinkedList, ListNode};
use crate::loom_shim::Arc;
use crate::pool::MemoryPool;
use crate::stack::Stack;

fn bucket_of<K: Hash>(key: &K, bucket_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % bucket_count as u64) as usize
}

/// A fixed-bucket-count concurrent map. No resizing: a mis-sized bucket
/// count or pool just means more per-bucket chain traversal, not failure,
/// short of the pool's own fatal exhaustion.
pub struct LockFreeHashMap<K, V> {
    buckets: Box<[LinkedList<K, V>]>,
}

impl<K, V> LockFreeHashMap<K, V> {
    /// Builds a map of `bucket_count` buckets backed by one pool sized at
    /// `bucket_count * pool_capacity_factor` (default factor 3) and one
    /// shared epoch manager / retire stack.
    pub fn new(bucket_count: usize) -> Result<Self, LockFreeError> {
        Self::with_config(HashMapConfig::new(bucket_count)?)
    }

    /// Builds a map from an already-validated [`HashMapConfig`].
    pub fn with_config(config: HashMapConfig) -> Result<Self, LockFreeError> {
        let pool = Arc::new(MemoryPool::<ListNode<K, V>>::new(config.pool_capacity())?);
        let retire_stack = Arc::new(Stack::new(config.pool_capacity())?);
        let epoch = Arc::new(EpochManager::new());

        let buckets = (0..config.buckets)
            .map(|_| LinkedList::new(pool.clone(), retire_stack.clone(), epoch.clone()))
            .collect();

        Ok(Self { buckets })
    }

    /// Number of buckets. Fixed for the life of the map.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<K: Hash + PartialEq, V> LockFreeHashMap<K, V> {
    /// Update-or-insert `key` to `value`. Aborts the process if the shared
    /// pool or reservation table is exhausted, matching the contract of
    /// the `LinkedList` bucket it delegates to.
    pub fn insert(&self, key: K, value: V) {
        let idx = bucket_of(&key, self.buckets.len());
        self.buckets[idx].insert(key, value);
    }

    /// Removes `key` if present. Returns whether this call performed the
    /// removal (a second `remove` of an already-gone key is a no-op).
    pub fn remove(&self, key: &K) -> bool {
        let idx = bucket_of(key, self.buckets.len());
        self.buckets[idx].remove(key)
    }
}

impl<K: Hash + PartialEq, V: Clone> LockFreeHashMap<K, V> {
    /// Returns a clone of the value currently associated with `key`, if
    /// any.
    pub fn get(&self, key: &K) -> Option<V> {
        let idx = bucket_of(key, self.buckets.len());
        self.buckets[idx].search(key)
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::loom_shim::thread;

    #[test]
    fn concurrent_insert_of_distinct_keys_both_land() {
        loom::model(|| {
            let map = Arc::new(LockFreeHashMap::<i32, i32>::new(2).unwrap());
            let a = {
                let map = map.clone();
                thread::spawn(move || map.insert(1, 1))
            };
            let b = {
                let map = map.clone();
                thread::spawn(move || map.insert(2, 2))
            };
            a.join().unwrap();
            b.join().unwrap();
            assert_eq!(map.get(&1), Some(1));
            assert_eq!(map.get(&2), Some(2));
        });
    }
}
