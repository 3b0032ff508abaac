//! Resource Pools
//!
//! Immutable capacity descriptors. A store swaps the whole descriptor on a
//! resize, so readers observe either the old or the new capacity, never a mix.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unit for byte-sized pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryUnit {
    /// Bytes
    B,
    /// Kibibytes
    KB,
    /// Mebibytes
    MB,
    /// Gibibytes
    GB,
}

impl MemoryUnit {
    /// Convert `amount` of this unit to bytes
    pub fn to_bytes(&self, amount: u64) -> Option<u64> {
        let factor: u64 = match self {
            MemoryUnit::B => 1,
            MemoryUnit::KB => 1024,
            MemoryUnit::MB => 1024 * 1024,
            MemoryUnit::GB => 1024 * 1024 * 1024,
        };
        amount.checked_mul(factor)
    }
}

impl std::fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryUnit::B => write!(f, "B"),
            MemoryUnit::KB => write!(f, "KB"),
            MemoryUnit::MB => write!(f, "MB"),
            MemoryUnit::GB => write!(f, "GB"),
        }
    }
}

/// Capacity bound for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capacity {
    /// Bounded by number of entries
    Entries {
        /// Maximum number of entries
        max: u64,
    },
    /// Bounded by measured bytes, optionally also by entry count
    Bytes {
        /// Maximum total bytes
        max_bytes: u64,
        /// Optional entry-count ceiling
        max_entries: Option<u64>,
    },
}

/// Capacity descriptor for one store tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePools {
    capacity: Capacity,
}

impl ResourcePools {
    /// Pool bounded by entry count
    pub fn entries(max: u64) -> Result<Self> {
        if max == 0 {
            return Err(Error::ConfigurationRejected(
                "entry capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity: Capacity::Entries { max },
        })
    }

    /// Pool bounded by bytes
    pub fn bytes(amount: u64, unit: MemoryUnit) -> Result<Self> {
        let max_bytes = unit.to_bytes(amount).ok_or_else(|| {
            Error::ConfigurationRejected(format!("{} {} overflows a byte count", amount, unit))
        })?;
        if max_bytes == 0 {
            return Err(Error::ConfigurationRejected(
                "byte capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            capacity: Capacity::Bytes {
                max_bytes,
                max_entries: None,
            },
        })
    }

    /// Add an entry-count ceiling to a byte-sized pool
    pub fn with_entry_ceiling(self, max_entries: u64) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::ConfigurationRejected(
                "entry ceiling must be positive".to_string(),
            ));
        }
        match self.capacity {
            Capacity::Bytes { max_bytes, .. } => Ok(Self {
                capacity: Capacity::Bytes {
                    max_bytes,
                    max_entries: Some(max_entries),
                },
            }),
            Capacity::Entries { .. } => Err(Error::ConfigurationRejected(
                "entry ceiling only applies to byte-sized pools".to_string(),
            )),
        }
    }

    /// Get the capacity bound
    #[inline]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// True if entries must be measured
    #[inline]
    pub fn is_byte_sized(&self) -> bool {
        matches!(self.capacity, Capacity::Bytes { .. })
    }

    /// Check whether the given occupancy is over this capacity
    #[inline]
    pub fn is_exceeded_by(&self, entries: u64, bytes: u64) -> bool {
        match self.capacity {
            Capacity::Entries { max } => entries > max,
            Capacity::Bytes {
                max_bytes,
                max_entries,
            } => bytes > max_bytes || max_entries.map_or(false, |max| entries > max),
        }
    }

    /// Validate `replacement` as a live update of this pool
    ///
    /// A pool may grow or shrink but not switch between entry and byte units.
    pub fn validate_update(&self, replacement: &ResourcePools) -> Result<()> {
        if self.is_byte_sized() != replacement.is_byte_sized() {
            return Err(Error::ConfigurationRejected(format!(
                "cannot replace a {} pool with a {} pool",
                self.unit_name(),
                replacement.unit_name()
            )));
        }
        Ok(())
    }

    fn unit_name(&self) -> &'static str {
        if self.is_byte_sized() {
            "byte-sized"
        } else {
            "entry-count"
        }
    }
}

impl std::fmt::Display for ResourcePools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.capacity {
            Capacity::Entries { max } => write!(f, "{} entries", max),
            Capacity::Bytes {
                max_bytes,
                max_entries: None,
            } => write!(f, "{} bytes", max_bytes),
            Capacity::Bytes {
                max_bytes,
                max_entries: Some(max),
            } => write!(f, "{} bytes / {} entries", max_bytes, max),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_entry_pool() {
        let pools = ResourcePools::entries(100).unwrap();
        assert_eq!(pools.capacity(), Capacity::Entries { max: 100 });
        assert!(!pools.is_byte_sized());
        assert!(!pools.is_exceeded_by(100, u64::MAX));
        assert!(pools.is_exceeded_by(101, 0));
    }

    #[test]
    fn test_byte_pool_units() {
        let pools = ResourcePools::bytes(2, MemoryUnit::KB).unwrap();
        assert_eq!(
            pools.capacity(),
            Capacity::Bytes {
                max_bytes: 2048,
                max_entries: None
            }
        );
        assert!(pools.is_byte_sized());
        assert!(!pools.is_exceeded_by(1_000_000, 2048));
        assert!(pools.is_exceeded_by(1, 2049));
    }

    #[test]
    fn test_entry_ceiling() {
        let pools = ResourcePools::bytes(1, MemoryUnit::MB)
            .unwrap()
            .with_entry_ceiling(10)
            .unwrap();
        assert!(pools.is_exceeded_by(11, 0));
        assert!(!pools.is_exceeded_by(10, 1024));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_matches!(
            ResourcePools::entries(0),
            Err(Error::ConfigurationRejected(_))
        );
        assert_matches!(
            ResourcePools::bytes(0, MemoryUnit::GB),
            Err(Error::ConfigurationRejected(_))
        );
    }

    #[test]
    fn test_overflowing_byte_pool_rejected() {
        assert_matches!(
            ResourcePools::bytes(u64::MAX, MemoryUnit::KB),
            Err(Error::ConfigurationRejected(_))
        );
    }

    #[test]
    fn test_ceiling_on_entry_pool_rejected() {
        let pools = ResourcePools::entries(5).unwrap();
        assert_matches!(
            pools.with_entry_ceiling(3),
            Err(Error::ConfigurationRejected(_))
        );
    }

    #[test]
    fn test_update_cannot_switch_units() {
        let entries = ResourcePools::entries(10).unwrap();
        let bytes = ResourcePools::bytes(10, MemoryUnit::B).unwrap();

        assert!(entries
            .validate_update(&ResourcePools::entries(3).unwrap())
            .is_ok());
        assert_matches!(
            entries.validate_update(&bytes),
            Err(Error::ConfigurationRejected(msg)) if msg.contains("entry-count")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourcePools::entries(3).unwrap().to_string(), "3 entries");
        assert_eq!(
            ResourcePools::bytes(1, MemoryUnit::KB)
                .unwrap()
                .with_entry_ceiling(4)
                .unwrap()
                .to_string(),
            "1024 bytes / 4 entries"
        );
    }
}
