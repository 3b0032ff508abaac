//! Expiry Policies
//!
//! Time-to-live and time-to-idle rules evaluated by the store on creation,
//! update and access of a mapping.
//!
//! # Rules
//!
//! - **Creation** always yields an [`Expiration`].
//! - **Access** and **update** yield `Option<Expiration>`; `None` keeps the
//!   entry's current expiration instant.
//! - A zero duration from the creation or update rule means the mapping is not
//!   stored at all.
//!
//! Expiry is enforced lazily: an expired entry is only removed when a read,
//! an existence check or an eviction sample touches it.

mod time_source;

use std::time::Duration;

pub use time_source::{ManualTimeSource, SystemTimeSource, TimeSource};

/// Instant stored for entries that never expire
pub const NEVER_EXPIRES: u64 = u64::MAX;

/// Result of an expiry rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The mapping never expires
    Never,
    /// The mapping expires after the given duration
    After(Duration),
}

impl Expiration {
    /// True for a zero-length lifetime
    pub fn is_zero(&self) -> bool {
        matches!(self, Expiration::After(d) if d.is_zero())
    }

    /// Absolute expiration instant relative to `now_millis`
    pub fn instant_from(&self, now_millis: u64) -> u64 {
        match self {
            Expiration::Never => NEVER_EXPIRES,
            Expiration::After(d) => {
                let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                now_millis.saturating_add(millis).min(NEVER_EXPIRES - 1)
            }
        }
    }
}

/// Expiry policy for a store
pub trait Expiry<K, V>: Send + Sync {
    /// Lifetime of a freshly created mapping
    fn expiry_for_creation(&self, key: &K, value: &V) -> Expiration;

    /// New lifetime after a successful read, or `None` to leave it unchanged
    fn expiry_for_access(&self, key: &K, value: &V) -> Option<Expiration>;

    /// New lifetime after replacing a live mapping, or `None` to keep the old one
    fn expiry_for_update(&self, key: &K, old_value: &V, new_value: &V) -> Option<Expiration>;
}

/// Mappings never expire
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExpiry;

impl<K, V> Expiry<K, V> for NoExpiry {
    fn expiry_for_creation(&self, _key: &K, _value: &V) -> Expiration {
        Expiration::Never
    }

    fn expiry_for_access(&self, _key: &K, _value: &V) -> Option<Expiration> {
        None
    }

    fn expiry_for_update(&self, _key: &K, _old: &V, _new: &V) -> Option<Expiration> {
        None
    }
}

/// Fixed lifetime from the last write
#[derive(Debug, Clone, Copy)]
pub struct TimeToLive(pub Duration);

impl<K, V> Expiry<K, V> for TimeToLive {
    fn expiry_for_creation(&self, _key: &K, _value: &V) -> Expiration {
        Expiration::After(self.0)
    }

    fn expiry_for_access(&self, _key: &K, _value: &V) -> Option<Expiration> {
        None
    }

    fn expiry_for_update(&self, _key: &K, _old: &V, _new: &V) -> Option<Expiration> {
        Some(Expiration::After(self.0))
    }
}

/// Lifetime extended on every read and write
#[derive(Debug, Clone, Copy)]
pub struct TimeToIdle(pub Duration);

impl<K, V> Expiry<K, V> for TimeToIdle {
    fn expiry_for_creation(&self, _key: &K, _value: &V) -> Expiration {
        Expiration::After(self.0)
    }

    fn expiry_for_access(&self, _key: &K, _value: &V) -> Option<Expiration> {
        Some(Expiration::After(self.0))
    }

    fn expiry_for_update(&self, _key: &K, _old: &V, _new: &V) -> Option<Expiration> {
        Some(Expiration::After(self.0))
    }
}

// =============================================================================
// Tests
// =============================================================================
