//! Store Entry Types
//!
//! One [`StoreEntry`] per mapping. The value, its measured size and its
//! creation time are immutable; an update installs a whole new entry, so a
//! reader never sees a value paired with another value's size. Access
//! timestamps and the expiration instant are atomics refreshed in place.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::expiry::NEVER_EXPIRES;

/// A stored value with its bookkeeping
#[repr(C, align(64))]
pub struct StoreEntry<V> {
    /// Last access timestamp (millis)
    last_access: AtomicU64,
    /// Store-wide access sequence at last access
    access_seq: AtomicU64,
    /// Expiration instant (millis), `NEVER_EXPIRES` if none
    expiration: AtomicU64,
    /// Successful reads since creation
    hits: AtomicU64,
    /// Creation timestamp (millis)
    created_at: u64,
    /// Bytes charged against the store budget (0 when count-bounded)
    size: u64,
    /// The (possibly copied) value
    value: V,
}

impl<V> StoreEntry<V> {
    /// Create a new entry
    pub fn new(value: V, size: u64, now: u64, expiration: u64, seq: u64) -> Self {
        Self {
            last_access: AtomicU64::new(now),
            access_seq: AtomicU64::new(seq),
            expiration: AtomicU64::new(expiration),
            hits: AtomicU64::new(0),
            created_at: now,
            size,
            value,
        }
    }

    /// Get the stored value
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Get the charged size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get creation time (millis)
    #[inline]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Get last access time (millis)
    #[inline]
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Get the number of successful reads
    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the expiration instant, `None` if the entry never expires
    #[inline]
    pub fn expires_at(&self) -> Option<u64> {
        match self.expiration.load(Ordering::Acquire) {
            NEVER_EXPIRES => None,
            instant => Some(instant),
        }
    }

    /// Raw expiration instant, carried over when an update keeps the lifetime
    #[inline]
    pub(crate) fn expiration_instant(&self) -> u64 {
        self.expiration.load(Ordering::Acquire)
    }

    /// Check if the entry has expired at `now`
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        let expiration = self.expiration.load(Ordering::Acquire);
        expiration != NEVER_EXPIRES && now >= expiration
    }

    /// Record an access, optionally moving the expiration instant
    #[inline]
    pub fn touch(&self, now: u64, seq: u64, expiration: Option<u64>) {
        self.last_access.store(now, Ordering::Relaxed);
        self.access_seq.store(seq, Ordering::Relaxed);
        if let Some(instant) = expiration {
            self.expiration.store(instant, Ordering::Release);
        }
    }

    /// Count a successful read
    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Ordering key for eviction: smaller is older
    #[inline]
    pub fn recency(&self) -> (u64, u64) {
        (
            self.last_access.load(Ordering::Relaxed),
            self.access_seq.load(Ordering::Relaxed),
        )
    }
}

impl<V> std::fmt::Debug for StoreEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEntry")
            .field("size", &self.size)
            .field("created_at", &self.created_at)
            .field("last_access", &self.last_access())
            .field("expires_at", &self.expires_at())
            .field("hits", &self.hit_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = StoreEntry::new("value", 128, 1_000, NEVER_EXPIRES, 1);
        assert_eq!(*entry.value(), "value");
        assert_eq!(entry.size(), 128);
        assert_eq!(entry.created_at(), 1_000);
        assert_eq!(entry.last_access(), 1_000);
        assert_eq!(entry.expires_at(), None);
        assert_eq!(entry.hit_count(), 0);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = StoreEntry::new(1u8, 0, 0, 500, 0);
        assert!(!entry.is_expired(499));
        assert!(entry.is_expired(500));
        assert!(entry.is_expired(10_000));
    }

    #[test]
    fn test_never_expiring_entry() {
        let entry = StoreEntry::new(1u8, 0, 0, NEVER_EXPIRES, 0);
        assert!(!entry.is_expired(u64::MAX - 1));
        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let entry = StoreEntry::new(1u8, 0, 10, 100, 1);
        assert_eq!(entry.recency(), (10, 1));

        entry.touch(50, 7, None);
        assert_eq!(entry.recency(), (50, 7));
        assert_eq!(entry.expires_at(), Some(100));

        entry.touch(60, 8, Some(160));
        assert_eq!(entry.expires_at(), Some(160));
        assert_eq!(entry.created_at(), 10);
    }

    #[test]
    fn test_hit_counting() {
        let entry = StoreEntry::new(1u8, 0, 0, NEVER_EXPIRES, 0);
        entry.record_hit();
        entry.record_hit();
        assert_eq!(entry.hit_count(), 2);
    }

    #[test]
    fn test_entry_debug() {
        let entry = StoreEntry::new(vec![1u8, 2, 3], 3, 0, NEVER_EXPIRES, 0);
        let debug = format!("{:?}", entry);
        assert!(debug.contains("StoreEntry"));
        assert!(debug.contains("size"));
    }

    #[test]
    fn test_cache_line_alignment() {
        assert_eq!(std::mem::align_of::<StoreEntry<u8>>(), 64);
    }
}
