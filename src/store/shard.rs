//! Sharded Map Implementation
//!
//! Concurrent hashmap split into independently locked shards. All mutations of
//! one key happen under that key's shard write lock, which is what makes
//! per-key store operations atomic without a global lock.
//!
//! # Design
//!
//! - Each shard has its own RwLock, minimizing contention
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Cache-line padding between shards prevents false sharing
//! - Shards are insertion-indexed maps, so sampling draws uniformly random
//!   positions in O(1) each and every entry is reachable

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;

use super::entry::StoreEntry;

/// Contents of one shard; removals must use `swap_remove`
pub type ShardMap<K, V> = IndexMap<K, Arc<StoreEntry<V>>>;

/// Sharded map of store entries
pub struct ShardedMap<K, V> {
    shards: Box<[CachePadded<RwLock<ShardMap<K, V>>>]>,
    mask: usize,
    hasher: RandomState,
}

impl<K, V> ShardedMap<K, V> {
    /// Create a map with `shard_count` shards (rounded up to a power of two)
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards: Vec<_> = (0..count)
            .map(|_| CachePadded::new(RwLock::new(IndexMap::new())))
            .collect();
        Self {
            shards: shards.into_boxed_slice(),
            mask: count - 1,
            hasher: RandomState::new(),
        }
    }

    /// Get the shard count
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get a shard by index
    #[inline]
    pub fn shard_at(&self, index: usize) -> &RwLock<ShardMap<K, V>> {
        &self.shards[index & self.mask]
    }

    /// Count entries by walking every shard
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Check if every shard is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    /// Get the shard owning `key`
    #[inline]
    pub fn shard_for(&self, key: &K) -> &RwLock<ShardMap<K, V>> {
        let hash = self.hasher.hash_one(key);
        &self.shards[(hash as usize) & self.mask]
    }

    /// Get the current entry for `key`
    pub fn get(&self, key: &K) -> Option<Arc<StoreEntry<V>>> {
        self.shard_for(key).read().get(key).cloned()
    }
}

impl<K: Eq + Hash + Clone, V> ShardedMap<K, V> {
    /// Copy out one shard's mappings
    pub fn snapshot_shard(&self, index: usize) -> Vec<(K, Arc<StoreEntry<V>>)> {
        self.shard_at(index)
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), Arc::clone(e)))
            .collect()
    }

    /// Draw up to `n` mappings at random, never returning `exclude`
    ///
    /// Starts at a random shard and takes distinct uniformly random positions
    /// from each shard in turn until `n` mappings are collected.
    pub fn sample(&self, n: usize, exclude: Option<&K>) -> Vec<(K, Arc<StoreEntry<V>>)> {
        let mut rng = rand::thread_rng();
        let mut picked = Vec::with_capacity(n);
        let count = self.shards.len();
        let start = rng.gen_range(0..count);

        for step in 0..count {
            let want = n - picked.len();
            if want == 0 {
                break;
            }
            let guard = self.shards[(start + step) & self.mask].read();
            let len = guard.len();
            if len == 0 {
                continue;
            }

            // one spare draw in case it lands on the excluded key
            let amount = (want + usize::from(exclude.is_some())).min(len);
            for index in rand::seq::index::sample(&mut rng, len, amount) {
                if picked.len() == n {
                    break;
                }
                if let Some((key, entry)) = guard.get_index(index) {
                    if exclude == Some(key) {
                        continue;
                    }
                    picked.push((key.clone(), Arc::clone(entry)));
                }
            }
        }

        picked
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::NEVER_EXPIRES;
    use std::collections::HashSet;

    fn entry(value: i32) -> Arc<StoreEntry<i32>> {
        Arc::new(StoreEntry::new(value, 4, 0, NEVER_EXPIRES, 0))
    }

    fn insert(map: &ShardedMap<String, i32>, key: &str, value: i32) {
        map.shard_for(&key.to_string())
            .write()
            .insert(key.to_string(), entry(value));
    }

    #[test]
    fn test_shard_count_rounds_to_power_of_two() {
        let map: ShardedMap<String, i32> = ShardedMap::new(10);
        assert_eq!(map.shard_count(), 16);

        let single: ShardedMap<String, i32> = ShardedMap::new(0);
        assert_eq!(single.shard_count(), 1);
    }

    #[test]
    fn test_insert_get() {
        let map: ShardedMap<String, i32> = ShardedMap::new(16);
        assert!(map.is_empty());

        insert(&map, "key1", 42);
        insert(&map, "key2", 100);

        assert_eq!(map.len(), 2);
        assert_eq!(*map.get(&"key1".to_string()).unwrap().value(), 42);
        assert!(map.get(&"key3".to_string()).is_none());
    }

    #[test]
    fn test_same_key_same_shard() {
        let map: ShardedMap<String, i32> = ShardedMap::new(64);
        let a = map.shard_for(&"key".to_string()) as *const _;
        let b = map.shard_for(&"key".to_string()) as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_bounded_and_distinct() {
        let map: ShardedMap<String, i32> = ShardedMap::new(16);
        for i in 0..1000 {
            insert(&map, &format!("key{}", i), i);
        }

        let sample = map.sample(8, None);
        assert_eq!(sample.len(), 8);

        let keys: HashSet<_> = sample.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys.len(), 8);
    }

    #[test]
    fn test_sample_covers_small_map() {
        let map: ShardedMap<String, i32> = ShardedMap::new(16);
        for key in ["a", "b", "c"] {
            insert(&map, key, 0);
        }

        let keys: HashSet<_> = map.sample(8, None).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_sample_empty_map() {
        let map: ShardedMap<String, i32> = ShardedMap::new(16);
        assert!(map.sample(8, None).is_empty());
    }

    #[test]
    fn test_sample_reaches_every_entry() {
        let map: ShardedMap<String, i32> = ShardedMap::new(1);
        for i in 0..2000 {
            insert(&map, &format!("key{}", i), i);
        }

        let mut seen = HashSet::new();
        for _ in 0..20_000 {
            seen.extend(map.sample(8, None).into_iter().map(|(k, _)| k));
        }
        assert_eq!(seen.len(), 2000, "only {} of 2000 keys ever sampled", seen.len());
    }

    #[test]
    fn test_sample_skips_excluded_key() {
        let map: ShardedMap<String, i32> = ShardedMap::new(1);
        insert(&map, "hot", 1);
        insert(&map, "cold", 2);

        for _ in 0..100 {
            let sample = map.sample(1, Some(&"hot".to_string()));
            assert_eq!(sample.len(), 1);
            assert_eq!(sample[0].0, "cold");
        }

        let only: ShardedMap<String, i32> = ShardedMap::new(4);
        insert(&only, "hot", 1);
        assert!(only.sample(8, Some(&"hot".to_string())).is_empty());
    }

    #[test]
    fn test_snapshot_shard() {
        let map: ShardedMap<String, i32> = ShardedMap::new(4);
        for i in 0..100 {
            insert(&map, &format!("key{}", i), i);
        }

        let total: usize = (0..map.shard_count())
            .map(|i| map.snapshot_shard(i).len())
            .sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_shard_distribution() {
        let map: ShardedMap<String, i32> = ShardedMap::new(16);
        for i in 0..1000 {
            insert(&map, &format!("key{}", i), i);
        }

        let counts: Vec<usize> = (0..16).map(|i| map.shard_at(i).read().len()).collect();
        let max_count = counts.iter().max().unwrap();
        let min_count = counts.iter().min().unwrap();
        assert!(*max_count < 200, "Uneven distribution: max {}", max_count);
        assert!(*min_count > 20, "Uneven distribution: min {}", min_count);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let map: Arc<ShardedMap<String, i32>> = Arc::new(ShardedMap::new(16));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..1000 {
                        let key = format!("key-{}-{}", t, i);
                        map.shard_for(&key).write().insert(key.clone(), entry(i));
                        map.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.len(), 8000);
    }
}
