//! Property-Based Tests for the On-Heap Store
//!
//! Drives stores through random operation sequences and checks, after every
//! step:
//!
//! 1. **Capacity**: entry-bounded stores never exceed their bound; byte-bounded
//!    stores exceed theirs only when a single oversize entry is left
//! 2. **Accounting**: occupancy counters equal a recount of the shards
//! 3. **Freshness**: a read returns the last value written for that key, or
//!    nothing

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use super::{MemoryUnit, OnHeapStore, ResourcePools, StoreConfiguration};
use crate::error::Result;
use crate::expiry::{ManualTimeSource, TimeToIdle};
use crate::sizeof::SizeOfEngine;

/// Charges the value length plus one byte for the key
struct LengthEngine;

impl SizeOfEngine<u8, Vec<u8>> for LengthEngine {
    fn size_of(&self, _key: &u8, value: &Vec<u8>) -> Result<u64> {
        Ok(value.len() as u64 + 1)
    }
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, usize),
    Get(u8),
    Remove(u8),
    Advance(u64),
    Resize(u64),
}

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for operations over a small key space, so keys collide often
fn op_strategy(max_value_len: usize, max_resize: u64) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..32, 0..max_value_len).prop_map(|(k, len)| Op::Put(k, len)),
        3 => (0u8..32).prop_map(Op::Get),
        1 => (0u8..32).prop_map(Op::Remove),
        1 => (1u64..50).prop_map(Op::Advance),
        1 => (1u64..max_resize).prop_map(Op::Resize),
    ]
}

fn ops_strategy(max_value_len: usize, max_resize: u64) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(max_value_len, max_resize), 1..200)
}

/// Apply one op, checking freshness of any value read back
fn apply(
    store: &OnHeapStore<u8, Vec<u8>>,
    clock: &ManualTimeSource,
    written: &mut HashMap<u8, Vec<u8>>,
    op: &Op,
    resize: impl Fn(u64) -> ResourcePools,
) -> std::result::Result<(), TestCaseError> {
    match *op {
        Op::Put(key, len) => {
            let value = vec![key; len];
            store.put(key, value.clone()).unwrap();
            written.insert(key, value);
        }
        Op::Get(key) => {
            if let Some(value) = store.get(&key).unwrap() {
                prop_assert_eq!(Some(&value), written.get(&key));
            }
        }
        Op::Remove(key) => {
            store.remove(&key);
            written.remove(&key);
        }
        Op::Advance(millis) => clock.advance(Duration::from_millis(millis)),
        Op::Resize(max) => store.update_resource_pools(resize(max)).unwrap(),
    }
    Ok(())
}

// =============================================================================
// Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Entry-bounded stores hold at most their bound after every operation
    #[test]
    fn prop_entry_capacity_holds(
        max in 1u64..16,
        sample_size in 1usize..10,
        ops in ops_strategy(8, 16),
    ) {
        let clock = Arc::new(ManualTimeSource::new(0));
        let store = OnHeapStore::new(StoreConfiguration {
            time_source: clock.clone(),
            sample_size,
            shard_count: 4,
            ..StoreConfiguration::new(ResourcePools::entries(max).unwrap())
        })
        .unwrap();

        let mut written = HashMap::new();
        let mut bound = max;
        for op in &ops {
            apply(&store, &clock, &mut written, op, |m| ResourcePools::entries(m).unwrap())?;
            if let Op::Resize(m) = op {
                bound = *m;
            }
            prop_assert!(store.len() as u64 <= bound, "{} entries over bound {}", store.len(), bound);
            prop_assert_eq!(store.recount(), (store.len() as u64, 0));
        }
    }

    /// Byte-bounded stores stay within budget unless one oversize entry remains
    #[test]
    fn prop_byte_capacity_holds(
        max_bytes in 8u64..128,
        ops in ops_strategy(48, 128),
    ) {
        let clock = Arc::new(ManualTimeSource::new(0));
        let store = OnHeapStore::new(StoreConfiguration {
            time_source: clock.clone(),
            size_of_engine: Arc::new(LengthEngine),
            expiry: Arc::new(TimeToIdle(Duration::from_millis(100))),
            shard_count: 4,
            ..StoreConfiguration::new(ResourcePools::bytes(max_bytes, MemoryUnit::B).unwrap())
        })
        .unwrap();

        let mut written = HashMap::new();
        let mut budget = max_bytes;
        for op in &ops {
            apply(&store, &clock, &mut written, op, |m| {
                ResourcePools::bytes(m, MemoryUnit::B).unwrap()
            })?;
            if let Op::Resize(m) = op {
                budget = *m;
            }
            prop_assert!(
                store.occupancy_bytes() <= budget || store.len() <= 1,
                "{} bytes in {} entries over budget {}",
                store.occupancy_bytes(),
                store.len(),
                budget
            );
            prop_assert_eq!(
                store.recount(),
                (store.len() as u64, store.occupancy_bytes())
            );
        }
    }
}
