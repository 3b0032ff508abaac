//! Tier Chain - ordered stack of cache tiers
//!
//! Tier 0 is the fastest and smallest. Writes land in tier 0; entries evicted
//! from tier `i` are demoted into tier `i + 1`; a hit in a lower tier is
//! faulted back into every tier above it.

use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use super::events::{StoreEvent, StoreEventListener};
use super::pool::ResourcePools;
use super::traits::Store;
use crate::error::{Error, Result};

/// Chain lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLookup<V> {
    /// The value found
    pub value: V,
    /// Index of the tier that held it
    pub tier: usize,
}

/// Moves values evicted from one tier into the next
struct Demotion<K, V> {
    lower: Weak<dyn Store<K, V>>,
    tier: usize,
}

impl<K, V> StoreEventListener<K, V> for Demotion<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_event(&self, event: StoreEvent, key: &K, value: &V) {
        if event != StoreEvent::Evicted {
            return;
        }
        let Some(lower) = self.lower.upgrade() else {
            return;
        };
        match lower.put(key.clone(), value.clone()) {
            Ok(()) => trace!(tier = self.tier, "Demoted evicted entry"),
            Err(e) => warn!(tier = self.tier, "Demotion failed: {}", e),
        }
    }
}

/// Ordered cache tiers behind one key-value interface
pub struct TierChain<K, V> {
    tiers: Vec<Arc<dyn Store<K, V>>>,
}

impl<K, V> TierChain<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Link `tiers`, fastest first
    pub fn new(tiers: Vec<Arc<dyn Store<K, V>>>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::Config(
                "a tier chain needs at least one tier".to_string(),
            ));
        }

        for (tier, pair) in tiers.windows(2).enumerate() {
            pair[0].register_event_listener(Arc::new(Demotion {
                lower: Arc::downgrade(&pair[1]),
                tier: tier + 1,
            }));
        }

        debug!(tiers = tiers.len(), "Tier chain assembled");
        Ok(Self { tiers })
    }

    /// Look `key` up tier by tier
    pub fn get(&self, key: &K) -> Result<Option<TierLookup<V>>> {
        for (tier, store) in self.tiers.iter().enumerate() {
            if let Some(value) = store.get(key)? {
                if tier > 0 {
                    self.promote(key, &value, tier);
                }
                return Ok(Some(TierLookup { value, tier }));
            }
        }
        Ok(None)
    }

    /// Fault a lower-tier hit into the tiers above it
    fn promote(&self, key: &K, value: &V, found_in: usize) {
        for (tier, store) in self.tiers[..found_in].iter().enumerate() {
            if let Err(e) = store.put_if_absent(key.clone(), value.clone()) {
                warn!(tier, "Promotion failed: {}", e);
            }
        }
        trace!(from = found_in, "Promoted entry");
    }

    /// Write to tier 0, invalidating lower tiers first
    pub fn put(&self, key: K, value: V) -> Result<()> {
        for store in &self.tiers[1..] {
            store.remove(&key)?;
        }
        self.tiers[0].put(key, value)
    }

    /// Remove `key` from every tier; true if any tier held it
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut removed = false;
        for store in &self.tiers {
            removed |= store.remove(key)?;
        }
        Ok(removed)
    }

    /// Check every tier for a live mapping
    pub fn contains_key(&self, key: &K) -> bool {
        self.tiers.iter().any(|store| store.contains_key(key))
    }

    /// Drop every mapping in every tier
    pub fn clear(&self) {
        for store in &self.tiers {
            store.clear();
        }
    }

    /// Get the tiers, fastest first
    pub fn tiers(&self) -> &[Arc<dyn Store<K, V>>] {
        &self.tiers
    }

    /// Resize one tier
    pub fn update_tier_pools(&self, tier: usize, pools: ResourcePools) -> Result<()> {
        let store = self
            .tiers
            .get(tier)
            .ok_or_else(|| Error::Config(format!("no tier at index {}", tier)))?;
        store.update_resource_pools(pools)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::ManualTimeSource;
    use crate::store::{OnHeapStore, StoreConfiguration};
    use std::time::Duration;

    fn tier(max: u64, clock: &Arc<ManualTimeSource>) -> Arc<OnHeapStore<String, u32>> {
        Arc::new(
            OnHeapStore::new(StoreConfiguration {
                time_source: clock.clone(),
                ..StoreConfiguration::new(ResourcePools::entries(max).unwrap())
            })
            .unwrap(),
        )
    }

    fn chain(
        clock: &Arc<ManualTimeSource>,
    ) -> (
        TierChain<String, u32>,
        Arc<OnHeapStore<String, u32>>,
        Arc<OnHeapStore<String, u32>>,
    ) {
        let upper = tier(2, clock);
        let lower = tier(10, clock);
        let chain = TierChain::new(vec![
            upper.clone() as Arc<dyn Store<String, u32>>,
            lower.clone() as Arc<dyn Store<String, u32>>,
        ])
        .unwrap();
        (chain, upper, lower)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(TierChain::<String, u32>::new(Vec::new()).is_err());
    }

    #[test]
    fn test_evicted_entries_demoted() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (chain, upper, lower) = chain(&clock);

        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            chain.put(key(k), i as u32).unwrap();
            clock.advance(Duration::from_millis(1));
        }

        assert_eq!(upper.len(), 2);
        assert!(!upper.contains_key(&key("a")));
        assert_eq!(lower.get(&key("a")).unwrap(), Some(0));
    }

    #[test]
    fn test_lower_hit_promoted() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (chain, upper, _lower) = chain(&clock);

        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            chain.put(key(k), i as u32).unwrap();
            clock.advance(Duration::from_millis(1));
        }

        let hit = chain.get(&key("a")).unwrap().unwrap();
        assert_eq!(hit, TierLookup { value: 0, tier: 1 });
        assert!(upper.contains_key(&key("a")));

        let again = chain.get(&key("a")).unwrap().unwrap();
        assert_eq!(again.tier, 0);
    }

    #[test]
    fn test_put_invalidates_lower_tiers() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (chain, _upper, lower) = chain(&clock);

        lower.put(key("a"), 1).unwrap();
        chain.put(key("a"), 2).unwrap();

        assert!(!lower.contains_key(&key("a")));
        assert_eq!(chain.get(&key("a")).unwrap().unwrap().value, 2);
    }

    #[test]
    fn test_remove_and_clear_span_tiers() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (chain, upper, lower) = chain(&clock);

        upper.put(key("a"), 1).unwrap();
        lower.put(key("a"), 1).unwrap();
        lower.put(key("b"), 2).unwrap();

        assert!(chain.remove(&key("a")).unwrap());
        assert!(!chain.contains_key(&key("a")));
        assert!(chain.contains_key(&key("b")));

        chain.clear();
        assert!(chain.tiers().iter().all(|t| t.is_empty()));
    }

    #[test]
    fn test_update_tier_pools() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let (chain, upper, lower) = chain(&clock);

        chain.put(key("a"), 1).unwrap();
        clock.advance(Duration::from_millis(1));
        chain.put(key("b"), 2).unwrap();

        chain
            .update_tier_pools(0, ResourcePools::entries(1).unwrap())
            .unwrap();
        assert_eq!(upper.len(), 1);
        assert!(lower.contains_key(&key("a")));
        assert!(chain
            .update_tier_pools(5, ResourcePools::entries(1).unwrap())
            .is_err());
    }
}
