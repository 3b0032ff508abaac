//! Store Settings
//!
//! Serde-loadable description of an on-heap store, read from YAML or JSON and
//! turned into a [`StoreConfiguration`].
//!
//! ```yaml
//! capacity:
//!   kind: bytes
//!   max: 64
//!   unit: mb
//!   max_entries: 100000
//! expiry:
//!   kind: time_to_idle
//!   millis: 30000
//! key_copy: identity
//! value_copy: serializing
//! eviction_sample_size: 8
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::copy::{Copier, IdentityCopier, SerializingCopier};
use crate::error::{Error, Result};
use crate::eviction::DEFAULT_SAMPLE_SIZE;
use crate::expiry::{Expiry, NoExpiry, TimeToIdle, TimeToLive};
use crate::sizeof::{DefaultSizeOfEngine, SizeOf, DEFAULT_MAX_DEPTH, DEFAULT_MAX_OBJECTS};
use crate::store::{MemoryUnit, ResourcePools, StoreConfiguration, DEFAULT_SHARD_COUNT};

// =============================================================================
// Settings Types
// =============================================================================

/// Capacity as written in a settings file
///
/// Signed so that negative values surface as a rejected configuration rather
/// than a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacitySettings {
    /// Entry-count bound
    Entries {
        /// Maximum entries
        max: i64,
    },
    /// Byte bound
    Bytes {
        /// Amount of `unit`
        max: i64,
        /// Unit of `max`
        #[serde(default = "default_unit")]
        unit: MemoryUnit,
        /// Optional entry-count ceiling
        #[serde(default)]
        max_entries: Option<i64>,
    },
}

/// Expiry policy as written in a settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpirySettings {
    /// Entries never expire
    #[default]
    None,
    /// Fixed lifetime from creation or last update
    TimeToLive {
        /// Lifetime in milliseconds
        millis: u64,
    },
    /// Lifetime refreshed by every access
    TimeToIdle {
        /// Idle timeout in milliseconds
        millis: u64,
    },
}

/// Copy strategy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// Store and return the caller's objects
    #[default]
    Identity,
    /// Store and return independent serialized copies
    Serializing,
}

/// Graph-walk bounds for byte-sized stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingSettings {
    /// Maximum reference depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum distinct objects visited per entry
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
}

impl Default for SizingSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_objects: default_max_objects(),
        }
    }
}

/// Complete on-heap store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Capacity bound
    #[serde(default = "default_capacity")]
    pub capacity: CapacitySettings,
    /// Expiry policy
    #[serde(default)]
    pub expiry: ExpirySettings,
    /// Key copy strategy
    #[serde(default)]
    pub key_copy: CopyMode,
    /// Value copy strategy
    #[serde(default)]
    pub value_copy: CopyMode,
    /// Sizing bounds (byte-sized stores only)
    #[serde(default)]
    pub sizing: SizingSettings,
    /// Entries drawn per eviction pass
    #[serde(default = "default_sample_size")]
    pub eviction_sample_size: usize,
    /// Map shards (rounded up to a power of two)
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            expiry: ExpirySettings::default(),
            key_copy: CopyMode::default(),
            value_copy: CopyMode::default(),
            sizing: SizingSettings::default(),
            eviction_sample_size: default_sample_size(),
            shard_count: default_shard_count(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl StoreSettings {
    /// Parse YAML settings
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse JSON settings
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings, picking the format from the file extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let settings = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents)?,
            Some("json") => Self::from_json_str(&contents)?,
            _ => {
                return Err(Error::Config(format!(
                    "unsupported settings format: {}",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), "Loaded store settings");
        Ok(settings)
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    /// Build the capacity descriptor
    pub fn resource_pools(&self) -> Result<ResourcePools> {
        match self.capacity {
            CapacitySettings::Entries { max } => ResourcePools::entries(positive("max", max)?),
            CapacitySettings::Bytes {
                max,
                unit,
                max_entries,
            } => {
                let pools = ResourcePools::bytes(positive("max", max)?, unit)?;
                match max_entries {
                    Some(ceiling) => pools.with_entry_ceiling(positive("max_entries", ceiling)?),
                    None => Ok(pools),
                }
            }
        }
    }

    /// Build the expiry policy
    pub fn expiry<K, V>(&self) -> Arc<dyn Expiry<K, V>> {
        match self.expiry {
            ExpirySettings::None => Arc::new(NoExpiry),
            ExpirySettings::TimeToLive { millis } => {
                Arc::new(TimeToLive(Duration::from_millis(millis)))
            }
            ExpirySettings::TimeToIdle { millis } => {
                Arc::new(TimeToIdle(Duration::from_millis(millis)))
            }
        }
    }

    /// Build a store configuration; sizing is wired only for byte-sized pools
    pub fn configuration<K, V>(&self) -> Result<StoreConfiguration<K, V>>
    where
        K: Clone + Serialize + DeserializeOwned + SizeOf + 'static,
        V: Clone + Serialize + DeserializeOwned + SizeOf + 'static,
    {
        let pools = self.resource_pools()?;
        let mut config = StoreConfiguration::new(pools);
        if config.resource_pools.is_byte_sized() {
            config.size_of_engine = Arc::new(DefaultSizeOfEngine::new(
                self.sizing.max_depth,
                self.sizing.max_objects,
            ));
        }
        config.expiry = self.expiry();
        config.key_copier = copier(self.key_copy);
        config.value_copier = copier(self.value_copy);
        config.sample_size = self.eviction_sample_size;
        config.shard_count = self.shard_count;
        Ok(config)
    }
}

fn copier<T>(mode: CopyMode) -> Arc<dyn Copier<T>>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    match mode {
        CopyMode::Identity => Arc::new(IdentityCopier),
        CopyMode::Serializing => Arc::new(SerializingCopier),
    }
}

fn positive(field: &str, value: i64) -> Result<u64> {
    if value <= 0 {
        return Err(Error::ConfigurationRejected(format!(
            "{} must be positive, got {}",
            field, value
        )));
    }
    Ok(value as u64)
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_capacity() -> CapacitySettings {
    CapacitySettings::Entries { max: 10_000 }
}

fn default_unit() -> MemoryUnit {
    MemoryUnit::B
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_objects() -> usize {
    DEFAULT_MAX_OBJECTS
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

fn default_shard_count() -> usize {
    DEFAULT_SHARD_COUNT
}

// =============================================================================
// Tests
// =============================================================================
