//! On-Heap Store - the bounded concurrent tier
//!
//! Holds entries in a [`ShardedMap`] and keeps occupancy (entry count and
//! measured bytes) in atomic counters updated under the owning shard's lock.
//!
//! # Design
//!
//! - Per-key atomicity from the shard write lock; no global lock
//! - Copying and sizing happen before any lock is taken, so a failure leaves
//!   the store untouched
//! - Capacity is enforced after the write, synchronously, by sampled
//!   approximate-LRU eviction passes
//! - Expired entries are reclaimed lazily by reads, existence checks and
//!   eviction sampling; there is no background sweeper

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, trace};

use super::entry::StoreEntry;
use super::events::{
    ConfigurationChangeEvent, ConfigurationChangeListener, ConfigurationProperty, ListenerId,
    ListenerRegistry, StoreEvent, StoreEventDispatcher, StoreEventListener,
};
use super::pool::{Capacity, ResourcePools};
use super::shard::{ShardMap, ShardedMap};
use super::traits::{Store, StoreIter};
use super::DEFAULT_SHARD_COUNT;
use crate::copy::{Copier, IdentityCopier};
use crate::error::{Error, Result};
use crate::eviction::{select_victim, EvictionVeto, NoVeto, DEFAULT_SAMPLE_SIZE};
use crate::expiry::{Expiry, NoExpiry, SystemTimeSource, TimeSource, NEVER_EXPIRES};
use crate::sizeof::{NoopSizeOfEngine, SizeOfEngine};

/// Construction parameters and collaborators for an [`OnHeapStore`]
pub struct StoreConfiguration<K, V> {
    /// Initial capacity
    pub resource_pools: ResourcePools,
    /// Expiry policy
    pub expiry: Arc<dyn Expiry<K, V>>,
    /// Eviction veto
    pub eviction_veto: Arc<dyn EvictionVeto<K, V>>,
    /// Copy strategy for keys
    pub key_copier: Arc<dyn Copier<K>>,
    /// Copy strategy for values
    pub value_copier: Arc<dyn Copier<V>>,
    /// Sizing engine (consulted only for byte-sized pools)
    pub size_of_engine: Arc<dyn SizeOfEngine<K, V>>,
    /// Clock
    pub time_source: Arc<dyn TimeSource>,
    /// Entries drawn per eviction pass
    pub sample_size: usize,
    /// Number of map shards
    pub shard_count: usize,
}

impl<K: Clone, V: Clone> StoreConfiguration<K, V> {
    /// Defaults: no expiry, no veto, by-reference copies, no sizing
    pub fn new(resource_pools: ResourcePools) -> Self {
        Self {
            resource_pools,
            expiry: Arc::new(NoExpiry),
            eviction_veto: Arc::new(NoVeto),
            key_copier: Arc::new(IdentityCopier),
            value_copier: Arc::new(IdentityCopier),
            size_of_engine: Arc::new(NoopSizeOfEngine),
            time_source: Arc::new(SystemTimeSource),
            sample_size: DEFAULT_SAMPLE_SIZE,
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

/// Conditional write behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Always,
    IfAbsent,
    IfPresent,
}

/// What a write did under the shard lock
enum WriteOutcome<V> {
    /// New entry installed; carries the live entry it replaced
    Installed(Option<Arc<StoreEntry<V>>>),
    /// Condition failed; carries the live entry that blocked an `IfAbsent`
    Rejected(Option<Arc<StoreEntry<V>>>),
    /// Zero lifetime; any previous mapping was removed
    Dropped(Option<Arc<StoreEntry<V>>>),
}

/// Result of one eviction pass
enum Pass {
    /// Entries removed (evicted or expired)
    Removed(usize),
    /// Victim changed before removal; sample again
    Raced,
    /// Nothing in the sample could be evicted
    Exhausted,
}

/// On-heap store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of entries
    pub entries: u64,
    /// Measured bytes (0 when count-bounded)
    pub occupancy_bytes: u64,
    /// Configured capacity
    pub capacity: Capacity,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
    /// Lazily reclaimed expired entries
    pub expirations: u64,
}

/// Bounded concurrent key-value store
pub struct OnHeapStore<K, V> {
    /// Sharded storage
    map: ShardedMap<K, V>,
    /// Current capacity, swapped whole on resize
    pools: RwLock<Arc<ResourcePools>>,
    expiry: Arc<dyn Expiry<K, V>>,
    eviction_veto: Arc<dyn EvictionVeto<K, V>>,
    key_copier: Arc<dyn Copier<K>>,
    value_copier: Arc<dyn Copier<V>>,
    size_of_engine: Arc<dyn SizeOfEngine<K, V>>,
    time_source: Arc<dyn TimeSource>,
    /// Whether entries are measured
    measure: bool,
    sample_size: usize,
    /// Occupancy: entry count
    entries: AtomicU64,
    /// Occupancy: measured bytes
    bytes: AtomicU64,
    /// Store-wide access sequence for recency tie-breaks
    access_seq: AtomicU64,
    listeners: ListenerRegistry,
    events: StoreEventDispatcher<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> OnHeapStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Create a store from its configuration
    pub fn new(config: StoreConfiguration<K, V>) -> Result<Self> {
        if config.sample_size == 0 {
            return Err(Error::ConfigurationRejected(
                "eviction sample size must be positive".to_string(),
            ));
        }
        let measure = config.resource_pools.is_byte_sized();
        if measure && config.size_of_engine.is_noop() {
            return Err(Error::ConfigurationRejected(
                "a byte-sized pool needs a measuring size-of engine".to_string(),
            ));
        }

        debug!(
            capacity = %config.resource_pools,
            sample_size = config.sample_size,
            "Creating on-heap store"
        );

        Ok(Self {
            map: ShardedMap::new(config.shard_count),
            pools: RwLock::new(Arc::new(config.resource_pools)),
            expiry: config.expiry,
            eviction_veto: config.eviction_veto,
            key_copier: config.key_copier,
            value_copier: config.value_copier,
            size_of_engine: config.size_of_engine,
            time_source: config.time_source,
            measure,
            sample_size: config.sample_size,
            entries: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            access_seq: AtomicU64::new(0),
            listeners: ListenerRegistry::new(),
            events: StoreEventDispatcher::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    #[inline]
    fn now(&self) -> u64 {
        self.time_source.now_millis()
    }

    #[inline]
    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the value for `key`
    ///
    /// An expired entry is removed and reported as a miss. A hit refreshes the
    /// entry's recency and applies the access expiry rule.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let now = self.now();
        let Some(entry) = self.map.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if entry.is_expired(now) {
            self.expire(key, &entry);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.record_access(key, &entry, now);
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.value_copier.copy_for_read(entry.value()).map(Some)
    }

    /// Check for a live mapping; expired entries are removed, recency untouched
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.now();
        match self.map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.expire(key, &entry);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn record_access(&self, key: &K, entry: &StoreEntry<V>, now: u64) {
        let expiration = self
            .expiry
            .expiry_for_access(key, entry.value())
            .map(|e| e.instant_from(now));
        entry.touch(now, self.next_seq(), expiration);
        entry.record_hit();
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Install or replace the mapping for `key`, then restore capacity
    pub fn put(&self, key: K, value: V) -> Result<()> {
        let (key, value, size) = self.prepare(key, value)?;
        self.write(key, value, size, WriteMode::Always);
        Ok(())
    }

    /// Install only if no live mapping exists
    ///
    /// Returns the live value when one exists (counted as an access).
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        let (key, value, size) = self.prepare(key, value)?;
        match self.write(key, value, size, WriteMode::IfAbsent) {
            WriteOutcome::Rejected(Some(existing)) => {
                self.value_copier.copy_for_read(existing.value()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Replace only a live mapping; returns the previous value
    pub fn replace(&self, key: K, value: V) -> Result<Option<V>> {
        let (key, value, size) = self.prepare(key, value)?;
        match self.write(key, value, size, WriteMode::IfPresent) {
            WriteOutcome::Installed(Some(previous)) | WriteOutcome::Dropped(Some(previous)) => {
                self.value_copier.copy_for_read(previous.value()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Copy and measure outside any lock
    fn prepare(&self, key: K, value: V) -> Result<(K, V, u64)> {
        let key = self.key_copier.copy_for_write(key)?;
        let value = self.value_copier.copy_for_write(value)?;
        let size = if self.measure {
            self.size_of_engine.size_of(&key, &value)?
        } else {
            0
        };
        Ok((key, value, size))
    }

    fn write(&self, key: K, value: V, size: u64, mode: WriteMode) -> WriteOutcome<V> {
        let now = self.now();
        let protected = key.clone();
        let (outcome, stale) = {
            let mut shard = self.map.shard_for(&key).write();
            let stale = Self::take_expired(&mut shard, &key, now);
            if let Some(stale) = &stale {
                self.account_remove(stale.size());
            }
            (self.write_locked(&mut shard, key, value, size, mode, now), stale)
        };

        if let Some(stale) = stale {
            self.report_expired(&protected, &stale);
        }
        if matches!(outcome, WriteOutcome::Installed(_)) {
            self.enforce_capacity(Some(&protected));
        }
        outcome
    }

    /// Unlink the mapping for `key` if it has expired
    fn take_expired(
        shard: &mut ShardMap<K, V>,
        key: &K,
        now: u64,
    ) -> Option<Arc<StoreEntry<V>>> {
        if shard.get(key)?.is_expired(now) {
            shard.swap_remove(key)
        } else {
            None
        }
    }

    fn write_locked(
        &self,
        shard: &mut ShardMap<K, V>,
        key: K,
        value: V,
        size: u64,
        mode: WriteMode,
        now: u64,
    ) -> WriteOutcome<V> {
        let live = shard.get(&key).cloned();

        match (mode, &live) {
            (WriteMode::IfAbsent, Some(existing)) => {
                self.record_access(&key, existing, now);
                return WriteOutcome::Rejected(Some(Arc::clone(existing)));
            }
            (WriteMode::IfPresent, None) => return WriteOutcome::Rejected(None),
            _ => {}
        }

        let expiration = match &live {
            Some(old) => self.expiry.expiry_for_update(&key, old.value(), &value),
            None => Some(self.expiry.expiry_for_creation(&key, &value)),
        };

        if expiration.map_or(false, |e| e.is_zero()) {
            if let Some(removed) = shard.swap_remove(&key) {
                self.account_remove(removed.size());
            }
            return WriteOutcome::Dropped(live);
        }

        let instant = match expiration {
            Some(e) => e.instant_from(now),
            None => live
                .as_ref()
                .map_or(NEVER_EXPIRES, |old| old.expiration_instant()),
        };
        let entry = Arc::new(StoreEntry::new(value, size, now, instant, self.next_seq()));

        match shard.insert(key, entry) {
            Some(previous) => {
                self.bytes.fetch_add(size, Ordering::Relaxed);
                self.bytes.fetch_sub(previous.size(), Ordering::Relaxed);
            }
            None => self.account_insert(size),
        }

        WriteOutcome::Installed(live)
    }

    /// Remove the mapping; true if it was live
    pub fn remove(&self, key: &K) -> bool {
        let now = self.now();
        match self.remove_mapping(key, None) {
            Some(removed) if removed.is_expired(now) => {
                self.report_expired(key, &removed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Drop every mapping
    pub fn clear(&self) {
        for index in 0..self.map.shard_count() {
            let mut shard = self.map.shard_at(index).write();
            for (_, entry) in shard.drain(..) {
                self.account_remove(entry.size());
            }
        }
    }

    // =========================================================================
    // Accounting
    // =========================================================================

    // Callers hold the shard write lock for the key being accounted.

    #[inline]
    fn account_insert(&self, size: u64) {
        self.entries.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    #[inline]
    fn account_remove(&self, size: u64) {
        self.entries.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(size, Ordering::Relaxed);
    }

    /// Remove `key`, optionally only if it still maps to `expected`
    fn remove_mapping(
        &self,
        key: &K,
        expected: Option<&Arc<StoreEntry<V>>>,
    ) -> Option<Arc<StoreEntry<V>>> {
        let mut shard = self.map.shard_for(key).write();
        if let Some(expected) = expected {
            match shard.get(key) {
                Some(current) if Arc::ptr_eq(current, expected) => {}
                _ => return None,
            }
        }
        let removed = shard.swap_remove(key)?;
        self.account_remove(removed.size());
        Some(removed)
    }

    /// Reclaim an entry found expired; false if it changed meanwhile
    fn expire(&self, key: &K, entry: &Arc<StoreEntry<V>>) -> bool {
        match self.remove_mapping(key, Some(entry)) {
            Some(removed) => {
                self.report_expired(key, &removed);
                true
            }
            None => false,
        }
    }

    /// Count and publish an expired entry already unlinked from the map
    fn report_expired(&self, key: &K, removed: &StoreEntry<V>) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
        trace!("Reclaimed expired entry");
        if !self.events.is_empty() {
            self.events.fire(StoreEvent::Expired, key, removed.value());
        }
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    fn is_over_capacity(&self) -> bool {
        self.resource_pools()
            .is_exceeded_by(self.len_u64(), self.occupancy_bytes())
    }

    /// Run eviction passes until within capacity or out of candidates
    ///
    /// `protected` is the key written by the triggering call; it is never its
    /// own eviction victim.
    fn enforce_capacity(&self, protected: Option<&K>) -> usize {
        let mut removed = 0;
        while self.is_over_capacity() {
            match self.eviction_pass(protected) {
                Pass::Removed(n) => removed += n,
                Pass::Raced => continue,
                Pass::Exhausted => {
                    debug!(
                        entries = self.len_u64(),
                        bytes = self.occupancy_bytes(),
                        "No evictable candidate, store stays over capacity"
                    );
                    break;
                }
            }
        }
        if removed > 0 {
            debug!(removed, "Eviction run complete");
        }
        removed
    }

    fn eviction_pass(&self, protected: Option<&K>) -> Pass {
        let now = self.now();
        let sample = self.map.sample(self.sample_size, protected);

        let mut expired = 0;
        let mut candidates = Vec::with_capacity(sample.len());
        for (key, entry) in sample {
            if entry.is_expired(now) {
                if self.expire(&key, &entry) {
                    expired += 1;
                }
                continue;
            }
            if self.eviction_veto.vetoes(&key, &entry) {
                continue;
            }
            candidates.push((key, entry));
        }

        if expired > 0 && !self.is_over_capacity() {
            return Pass::Removed(expired);
        }

        let Some((key, entry)) = select_victim(candidates) else {
            return if expired > 0 {
                Pass::Removed(expired)
            } else {
                Pass::Exhausted
            };
        };

        match self.remove_mapping(&key, Some(&entry)) {
            Some(victim) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                if !self.events.is_empty() {
                    self.events.fire(StoreEvent::Evicted, &key, victim.value());
                }
                Pass::Removed(expired + 1)
            }
            None if expired > 0 => Pass::Removed(expired),
            None => Pass::Raced,
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current capacity descriptor
    pub fn resource_pools(&self) -> Arc<ResourcePools> {
        Arc::clone(&self.pools.read())
    }

    /// Replace the capacity and evict down to it, then notify listeners
    pub fn update_resource_pools(&self, pools: ResourcePools) -> Result<()> {
        self.apply_resource_pools(pools, true)
    }

    fn apply_resource_pools(&self, pools: ResourcePools, notify: bool) -> Result<()> {
        let new_value = Arc::new(pools);
        let old_value = {
            let mut current = self.pools.write();
            current.validate_update(&new_value)?;
            std::mem::replace(&mut *current, Arc::clone(&new_value))
        };

        info!(old = %old_value, new = %new_value, "Resource pools updated");
        let evicted = self.enforce_capacity(None);
        if evicted > 0 {
            info!(evicted, "Evicted down to new capacity");
        }

        if notify {
            self.listeners
                .notify(&ConfigurationChangeEvent::update_size(old_value, new_value));
        }
        Ok(())
    }

    /// Observe capacity changes initiated by this store
    pub fn register_configuration_listener(
        &self,
        listener: Arc<dyn ConfigurationChangeListener>,
    ) -> ListenerId {
        self.listeners.register(listener)
    }

    /// Stop observing capacity changes
    pub fn deregister_configuration_listener(&self, id: ListenerId) -> bool {
        self.listeners.deregister(id)
    }

    /// Observe evictions and expirations
    pub fn register_event_listener(&self, listener: Arc<dyn StoreEventListener<K, V>>) {
        self.events.register(listener);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Weakly consistent iteration over live mappings, one shard at a time
    pub fn iter(&self) -> OnHeapIter<'_, K, V> {
        OnHeapIter {
            store: self,
            next_shard: 0,
            pending: Vec::new().into_iter(),
        }
    }

    fn read_out(&self, key: &K, entry: &StoreEntry<V>) -> Result<(K, V)> {
        Ok((
            self.key_copier.copy_for_read(key)?,
            self.value_copier.copy_for_read(entry.value())?,
        ))
    }

    #[inline]
    fn len_u64(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    /// Number of entries, including expired ones not yet reclaimed
    pub fn len(&self) -> usize {
        self.len_u64() as usize
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len_u64() == 0
    }

    /// Measured bytes currently charged
    pub fn occupancy_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        StoreStats {
            entries: self.len_u64(),
            occupancy_bytes: self.occupancy_bytes(),
            capacity: self.resource_pools().capacity(),
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Recount occupancy by walking every shard
    #[cfg(test)]
    pub(crate) fn recount(&self) -> (u64, u64) {
        (0..self.map.shard_count())
            .flat_map(|i| self.map.snapshot_shard(i))
            .fold((0, 0), |(n, b), (_, e)| (n + 1, b + e.size()))
    }
}

/// Iterator returned by [`OnHeapStore::iter`]
pub struct OnHeapIter<'a, K, V> {
    store: &'a OnHeapStore<K, V>,
    next_shard: usize,
    pending: std::vec::IntoIter<(K, Arc<StoreEntry<V>>)>,
}

impl<'a, K, V> Iterator for OnHeapIter<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, entry)) = self.pending.next() {
                if entry.is_expired(self.store.now()) {
                    continue;
                }
                return Some(self.store.read_out(&key, &entry));
            }
            if self.next_shard >= self.store.map.shard_count() {
                return None;
            }
            self.pending = self.store.map.snapshot_shard(self.next_shard).into_iter();
            self.next_shard += 1;
        }
    }
}

impl<K, V> ConfigurationChangeListener for OnHeapStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Apply a capacity change delivered from outside, without echoing it
    fn configuration_changed(&self, event: &ConfigurationChangeEvent) -> Result<()> {
        match event.property {
            ConfigurationProperty::UpdateSize => {
                self.apply_resource_pools((*event.new_value).clone(), false)
            }
        }
    }
}

impl<K, V> Store<K, V> for OnHeapStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        OnHeapStore::get(self, key)
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        OnHeapStore::put(self, key, value)
    }

    fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        OnHeapStore::put_if_absent(self, key, value)
    }

    fn replace(&self, key: K, value: V) -> Result<Option<V>> {
        OnHeapStore::replace(self, key, value)
    }

    fn remove(&self, key: &K) -> Result<bool> {
        Ok(OnHeapStore::remove(self, key))
    }

    fn contains_key(&self, key: &K) -> bool {
        OnHeapStore::contains_key(self, key)
    }

    fn clear(&self) {
        OnHeapStore::clear(self)
    }

    fn len(&self) -> usize {
        OnHeapStore::len(self)
    }

    fn iter(&self) -> StoreIter<'_, K, V> {
        Box::new(OnHeapStore::iter(self))
    }

    fn update_resource_pools(&self, pools: ResourcePools) -> Result<()> {
        OnHeapStore::update_resource_pools(self, pools)
    }

    fn resource_pools(&self) -> Arc<ResourcePools> {
        OnHeapStore::resource_pools(self)
    }

    fn register_configuration_listener(
        &self,
        listener: Arc<dyn ConfigurationChangeListener>,
    ) -> ListenerId {
        OnHeapStore::register_configuration_listener(self, listener)
    }

    fn deregister_configuration_listener(&self, id: ListenerId) -> bool {
        OnHeapStore::deregister_configuration_listener(self, id)
    }

    fn register_event_listener(&self, listener: Arc<dyn StoreEventListener<K, V>>) {
        OnHeapStore::register_event_listener(self, listener)
    }
}

// =============================================================================
// Tests
// =============================================================================
