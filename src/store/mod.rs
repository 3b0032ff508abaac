//! Tiered Key-Value Store
//!
//! A bounded, concurrent on-heap tier plus the contract every tier follows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              TierChain                                    │
//! │          get: tier 0 → tier n, fault hits upward                          │
//! │          put: tier 0, invalidate below; evictions demote downward         │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  OnHeapStore (tier 0)                  │  any other Store (tier 1..n)     │
//! │  ┌──────────────────────────────────┐  │                                  │
//! │  │ ShardedMap (64-way, RwLock)      │  │                                  │
//! │  │   key → Arc<StoreEntry>          │  │                                  │
//! │  ├──────────────────────────────────┤  │                                  │
//! │  │ Copier │ SizeOfEngine │ Expiry   │  │                                  │
//! │  ├──────────────────────────────────┤  │                                  │
//! │  │ Sampled LRU eviction + veto      │  │                                  │
//! │  │ ResourcePools (resizable)        │  │                                  │
//! │  └──────────────────────────────────┘  │                                  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Each single-key operation is atomic for its key
//! - After any write returns, occupancy is within capacity unless every
//!   remaining candidate is vetoed or the written entry alone exceeds it
//! - Reads never return an entry whose expiration instant has passed
//! - Iteration is weakly consistent and never fails due to concurrent writes

mod chain;
mod entry;
mod events;
mod on_heap;
mod pool;
mod proptest;
mod shard;
mod traits;

pub use chain::{TierChain, TierLookup};
pub use entry::StoreEntry;
pub use events::{
    ConfigurationChangeEvent, ConfigurationChangeListener, ConfigurationProperty, ListenerId,
    ListenerRegistry, StoreEvent, StoreEventListener,
};
pub use on_heap::{OnHeapIter, OnHeapStore, StoreConfiguration, StoreStats};
pub use pool::{Capacity, MemoryUnit, ResourcePools};
pub use traits::{Store, StoreIter};

/// Default number of map shards
pub const DEFAULT_SHARD_COUNT: usize = 64;
