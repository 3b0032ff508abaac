//! Copy Strategies
//!
//! Decide whether keys and values crossing the store boundary are aliased
//! (by-reference) or copied (by-value).
//!
//! - [`IdentityCopier`] hands the caller's value to the store unchanged and
//!   returns a `Clone` of the stored value on read. For handle types such as
//!   `Arc<Mutex<T>>` this aliases the stored object: a caller mutating it after
//!   `put` changes what later readers see.
//! - [`SerializingCopier`] round-trips every value through `serde_json`, so the
//!   store never shares an allocation with a caller, even through `Arc`.
//!
//! A strategy is fixed per store and applied uniformly to every call.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Copy strategy for objects entering and leaving a store
pub trait Copier<T>: Send + Sync {
    /// Copy applied to an object before it is stored
    fn copy_for_write(&self, obj: T) -> Result<T>;

    /// Copy applied to a stored object before it is returned
    fn copy_for_read(&self, obj: &T) -> Result<T>;
}

/// By-reference semantics
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCopier;

impl<T: Clone> Copier<T> for IdentityCopier {
    #[inline]
    fn copy_for_write(&self, obj: T) -> Result<T> {
        Ok(obj)
    }

    #[inline]
    fn copy_for_read(&self, obj: &T) -> Result<T> {
        Ok(obj.clone())
    }
}

/// By-value semantics through a serialization round trip
#[derive(Debug, Default, Clone, Copy)]
pub struct SerializingCopier;

impl SerializingCopier {
    fn round_trip<T: Serialize + DeserializeOwned>(obj: &T) -> Result<T> {
        let tree = serde_json::to_value(obj)
            .map_err(|e| Error::CopyFailure(format!("serialization failed: {}", e)))?;
        serde_json::from_value(tree)
            .map_err(|e| Error::CopyFailure(format!("deserialization failed: {}", e)))
    }
}

impl<T: Serialize + DeserializeOwned> Copier<T> for SerializingCopier {
    fn copy_for_write(&self, obj: T) -> Result<T> {
        Self::round_trip(&obj)
    }

    fn copy_for_read(&self, obj: &T) -> Result<T> {
        Self::round_trip(obj)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde::{Deserialize, Serializer};
    use std::sync::{Arc, Mutex};

    type Shared = Arc<Mutex<Vec<String>>>;

    #[test]
    fn test_identity_aliases_shared_values() {
        let original: Shared = Arc::new(Mutex::new(vec!["a".to_string()]));
        let stored = IdentityCopier.copy_for_write(Arc::clone(&original)).unwrap();

        original.lock().unwrap().push("b".to_string());

        let read = IdentityCopier.copy_for_read(&stored).unwrap();
        assert!(Arc::ptr_eq(&read, &original));
        assert_eq!(read.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_serializing_isolates_writes() {
        let original: Shared = Arc::new(Mutex::new(vec!["a".to_string()]));
        let stored = SerializingCopier
            .copy_for_write(Arc::clone(&original))
            .unwrap();

        original.lock().unwrap().push("b".to_string());

        assert!(!Arc::ptr_eq(&stored, &original));
        assert_eq!(*stored.lock().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_serializing_isolates_reads() {
        let stored: Shared = Arc::new(Mutex::new(vec!["a".to_string()]));
        let read = SerializingCopier.copy_for_read(&stored).unwrap();

        read.lock().unwrap().clear();

        assert_eq!(stored.lock().unwrap().len(), 1);
    }

    #[derive(Debug, Deserialize)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque handle"))
        }
    }

    #[test]
    fn test_serializing_failure_is_copy_failure() {
        let result = SerializingCopier.copy_for_read(&Unserializable);
        assert_matches!(result, Err(Error::CopyFailure(msg)) if msg.contains("opaque handle"));
    }
}
