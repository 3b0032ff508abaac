//! Store Tier Contract
//!
//! Every tier (heap today; off-heap, disk or clustered tiers elsewhere) is
//! driven through [`Store`]. A [`TierChain`](super::TierChain) holds an ordered
//! list of `Arc<dyn Store>` and never needs to know the backing.

use std::sync::Arc;

use super::events::{ConfigurationChangeListener, ListenerId, StoreEventListener};
use super::pool::ResourcePools;
use crate::error::Result;

/// Lazy sequence of live mappings
pub type StoreIter<'a, K, V> = Box<dyn Iterator<Item = Result<(K, V)>> + 'a>;

/// Operations a cache tier exposes
///
/// Each operation is atomic for its key. Bulk operations apply the single-key
/// operation per key with no cross-key atomicity.
pub trait Store<K, V>: Send + Sync {
    /// Current value for `key`, or `None` if absent or expired
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Install or replace the mapping for `key`
    fn put(&self, key: K, value: V) -> Result<()>;

    /// Install only if no live mapping exists; returns the live value otherwise
    fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>>;

    /// Replace only a live mapping; returns the previous value
    fn replace(&self, key: K, value: V) -> Result<Option<V>>;

    /// Remove the mapping; true if a live mapping existed
    fn remove(&self, key: &K) -> Result<bool>;

    /// Check for a live mapping without counting an access
    fn contains_key(&self, key: &K) -> bool;

    /// Drop every mapping
    fn clear(&self);

    /// Number of stored entries, including expired ones not yet reclaimed
    fn len(&self) -> usize;

    /// Check if the store holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Weakly consistent iteration over live mappings
    fn iter(&self) -> StoreIter<'_, K, V>;

    /// Replace the capacity descriptor and evict down to it
    fn update_resource_pools(&self, pools: ResourcePools) -> Result<()>;

    /// Current capacity descriptor
    fn resource_pools(&self) -> Arc<ResourcePools>;

    /// Observe capacity changes initiated by this store
    fn register_configuration_listener(
        &self,
        listener: Arc<dyn ConfigurationChangeListener>,
    ) -> ListenerId;

    /// Stop observing capacity changes
    fn deregister_configuration_listener(&self, id: ListenerId) -> bool;

    /// Observe evictions and expirations
    fn register_event_listener(&self, listener: Arc<dyn StoreEventListener<K, V>>);

    /// Look up several keys
    fn get_all(&self, keys: &[K]) -> Result<Vec<(K, Option<V>)>>
    where
        K: Clone,
    {
        keys.iter()
            .map(|key| Ok((key.clone(), self.get(key)?)))
            .collect()
    }

    /// Write several mappings; stops at the first failure
    fn put_all(&self, entries: Vec<(K, V)>) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys; returns how many live mappings were removed
    fn remove_all(&self, keys: &[K]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.remove(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
