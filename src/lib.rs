//! Tiercache - Bounded Concurrent Tiered Key-Value Cache
//!
//! An in-process caching engine. Its core tier is a concurrent on-heap store
//! bounded by entry count or by measured bytes, with sampled approximate-LRU
//! eviction, lazily enforced expiry and runtime resizing.
//!
//! # Architecture
//!
//! ```text
//! put(k, v) ──▶ Copier ──▶ SizeOfEngine ──▶ ShardedMap ──▶ eviction passes
//!                                               │            (sample → veto →
//! get(k)  ◀── Copier ◀── expiry check ◀─────────┘             oldest access)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Serde-loadable store settings
//! - [`copy`] - Copy strategies for keys and values
//! - [`error`] - Error types
//! - [`eviction`] - Eviction veto and victim selection
//! - [`expiry`] - Expiry policies and time sources
//! - [`sizeof`] - Object-graph size measurement
//! - [`store`] - On-heap store, tier contract and tier chain

pub mod config;
pub mod copy;
pub mod error;
pub mod eviction;
pub mod expiry;
pub mod sizeof;
pub mod store;

// Re-export commonly used types
pub use config::StoreSettings;
pub use error::{Error, Result};
pub use store::{
    Capacity, MemoryUnit, OnHeapStore, ResourcePools, Store, StoreConfiguration, StoreStats,
    TierChain,
};
