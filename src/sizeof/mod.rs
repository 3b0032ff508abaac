//! SizeOf Engines
//!
//! Measure the byte footprint charged against a byte-bounded store for one
//! mapping (key + value + fixed bookkeeping).
//!
//! | Engine | Used when |
//! |--------|-----------|
//! | [`NoopSizeOfEngine`] | store is entry-count bounded; sizing is skipped |
//! | [`DefaultSizeOfEngine`] | key/value implement [`SizeOf`]; bounded graph walk |
//! | [`DeepSizeOfEngine`] | key/value implement `deepsize::DeepSizeOf` |

mod measurable;

use crate::error::Result;

pub use measurable::{GraphWalker, SizeOf, DEFAULT_MAX_DEPTH, DEFAULT_MAX_OBJECTS};

/// Fixed per-entry bookkeeping charge (one cache line)
pub const ENTRY_OVERHEAD_BYTES: u64 = 64;

/// Measures the footprint of a mapping
pub trait SizeOfEngine<K, V>: Send + Sync {
    /// Bytes charged for storing `value` under `key`
    fn size_of(&self, key: &K, value: &V) -> Result<u64>;

    /// True when the engine never measures anything
    fn is_noop(&self) -> bool {
        false
    }
}

/// Engine for count-bounded stores
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSizeOfEngine;

impl<K, V> SizeOfEngine<K, V> for NoopSizeOfEngine {
    #[inline]
    fn size_of(&self, _key: &K, _value: &V) -> Result<u64> {
        Ok(0)
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Bounded walk over [`SizeOf`] graphs
#[derive(Debug, Clone, Copy)]
pub struct DefaultSizeOfEngine {
    max_depth: usize,
    max_objects: usize,
}

impl Default for DefaultSizeOfEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH, DEFAULT_MAX_OBJECTS)
    }
}

impl DefaultSizeOfEngine {
    /// Create an engine that fails measurements exceeding the given bounds
    pub fn new(max_depth: usize, max_objects: usize) -> Self {
        Self {
            max_depth,
            max_objects,
        }
    }
}

impl<K: SizeOf, V: SizeOf> SizeOfEngine<K, V> for DefaultSizeOfEngine {
    fn size_of(&self, key: &K, value: &V) -> Result<u64> {
        // one walker for both so key and value sharing an Arc count it once
        let mut walker = GraphWalker::new(self.max_depth, self.max_objects);
        let bytes = key.deep_size(&mut walker)? + value.deep_size(&mut walker)?;
        Ok(bytes as u64 + ENTRY_OVERHEAD_BYTES)
    }
}

/// Adapter for types deriving `deepsize::DeepSizeOf`
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepSizeOfEngine;

impl<K, V> SizeOfEngine<K, V> for DeepSizeOfEngine
where
    K: deepsize::DeepSizeOf,
    V: deepsize::DeepSizeOf,
{
    fn size_of(&self, key: &K, value: &V) -> Result<u64> {
        Ok((key.deep_size_of() + value.deep_size_of()) as u64 + ENTRY_OVERHEAD_BYTES)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use deepsize::DeepSizeOf;
    use std::mem::size_of;
    use std::sync::Arc;

    #[test]
    fn test_noop_engine() {
        let engine = NoopSizeOfEngine;
        let key = "key".to_string();
        let value = vec![0u8; 4096];
        assert_eq!(engine.size_of(&key, &value).unwrap(), 0);
        assert!(SizeOfEngine::<String, Vec<u8>>::is_noop(&engine));
    }

    #[test]
    fn test_default_engine_charges_key_value_and_overhead() {
        let engine = DefaultSizeOfEngine::default();
        let key = String::with_capacity(8);
        let value = String::with_capacity(100);

        let expected = 2 * size_of::<String>() as u64 + 108 + ENTRY_OVERHEAD_BYTES;
        assert_eq!(engine.size_of(&key, &value).unwrap(), expected);
        assert!(!SizeOfEngine::<String, String>::is_noop(&engine));
    }

    #[test]
    fn test_default_engine_shares_walk_between_key_and_value() {
        let engine = DefaultSizeOfEngine::default();
        let shared = Arc::new(String::with_capacity(1000));

        let both = engine.size_of(&Arc::clone(&shared), &Arc::clone(&shared)).unwrap();
        assert!(both < 2000, "shared payload counted twice: {}", both);
    }

    #[test]
    fn test_default_engine_propagates_failure() {
        let engine = DefaultSizeOfEngine::new(1, usize::MAX);
        let key = 1u32;
        let value = vec![vec![1u8]];

        assert_matches!(
            engine.size_of(&key, &value),
            Err(Error::SizeMeasurementFailure(_))
        );
    }

    #[derive(DeepSizeOf)]
    struct Profile {
        name: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_deepsize_adapter() {
        let profile = Profile {
            name: "alice".to_string(),
            tags: vec!["admin".to_string()],
        };
        let key = 7u64;

        let size = DeepSizeOfEngine.size_of(&key, &profile).unwrap();
        assert_eq!(
            size,
            (key.deep_size_of() + profile.deep_size_of()) as u64 + ENTRY_OVERHEAD_BYTES
        );
        assert!(size > ENTRY_OVERHEAD_BYTES + size_of::<Profile>() as u64);
    }
}
