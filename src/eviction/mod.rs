//! Eviction Vetoes and Victim Selection
//!
//! Eviction is sampled approximate-LRU: each pass draws a small random sample
//! of live entries, drops vetoed ones, and removes the least recently accessed
//! of the rest. Cost per pass depends on the sample size, not the store size.

use std::sync::Arc;

use crate::store::StoreEntry;

/// Default number of entries drawn per eviction pass
pub const DEFAULT_SAMPLE_SIZE: usize = 8;

/// Predicate protecting entries from eviction
///
/// Only consulted while choosing eviction victims. A vetoed entry can still be
/// written, expire, or be removed explicitly.
pub trait EvictionVeto<K, V>: Send + Sync {
    /// True if the entry must not be evicted
    fn vetoes(&self, key: &K, entry: &StoreEntry<V>) -> bool;
}

/// Every entry is evictable
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVeto;

impl<K, V> EvictionVeto<K, V> for NoVeto {
    #[inline]
    fn vetoes(&self, _key: &K, _entry: &StoreEntry<V>) -> bool {
        false
    }
}

impl<K, V, F> EvictionVeto<K, V> for F
where
    F: Fn(&K, &StoreEntry<V>) -> bool + Send + Sync,
{
    fn vetoes(&self, key: &K, entry: &StoreEntry<V>) -> bool {
        self(key, entry)
    }
}

/// Pick the least recently accessed candidate
///
/// Ties on the millisecond timestamp fall back to the access sequence.
pub fn select_victim<K, V>(
    candidates: Vec<(K, Arc<StoreEntry<V>>)>,
) -> Option<(K, Arc<StoreEntry<V>>)> {
    candidates
        .into_iter()
        .min_by_key(|(_, entry)| entry.recency())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::NEVER_EXPIRES;

    fn entry(value: &str, last_access: u64, seq: u64) -> Arc<StoreEntry<String>> {
        let entry = StoreEntry::new(value.to_string(), 0, 0, NEVER_EXPIRES, 0);
        entry.touch(last_access, seq, None);
        Arc::new(entry)
    }

    #[test]
    fn test_select_oldest_access() {
        let candidates = vec![
            ("b", entry("b", 20, 2)),
            ("a", entry("a", 10, 1)),
            ("c", entry("c", 30, 3)),
        ];
        let (key, _) = select_victim(candidates).unwrap();
        assert_eq!(key, "a");
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let candidates = vec![
            ("late", entry("late", 10, 9)),
            ("early", entry("early", 10, 4)),
        ];
        let (key, _) = select_victim(candidates).unwrap();
        assert_eq!(key, "early");
    }

    #[test]
    fn test_empty_sample_has_no_victim() {
        let candidates: Vec<(String, Arc<StoreEntry<String>>)> = Vec::new();
        assert!(select_victim(candidates).is_none());
    }

    #[test]
    fn test_closure_veto() {
        let veto = |key: &String, _entry: &StoreEntry<String>| key.starts_with("pinned/");
        let e = entry("v", 0, 0);

        assert!(veto.vetoes(&"pinned/config".to_string(), &e));
        assert!(!veto.vetoes(&"scratch".to_string(), &e));
        assert!(!EvictionVeto::<String, String>::vetoes(&NoVeto, &"pinned/x".to_string(), &e));
    }
}
