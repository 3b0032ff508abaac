//! Store Events
//!
//! Two kinds of notifications leave a store:
//!
//! - [`ConfigurationChangeEvent`]s, delivered to registered
//!   [`ConfigurationChangeListener`]s after the store changes its own capacity.
//! - [`StoreEvent`]s, delivered to [`StoreEventListener`]s after an entry was
//!   evicted or found expired. A tier chain uses these to demote evicted
//!   values into the next tier.
//!
//! Listeners are invoked synchronously, in registration order, after every
//! shard lock has been released.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use super::pool::ResourcePools;
use crate::error::Result;

/// Property whose configuration changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConfigurationProperty {
    /// Resource pool capacity was replaced
    UpdateSize,
}

/// Capacity change notification
#[derive(Debug, Clone)]
pub struct ConfigurationChangeEvent {
    /// Changed property
    pub property: ConfigurationProperty,
    /// Pools before the change
    pub old_value: Arc<ResourcePools>,
    /// Pools after the change
    pub new_value: Arc<ResourcePools>,
}

impl ConfigurationChangeEvent {
    /// Create an `UpdateSize` event
    pub fn update_size(old_value: Arc<ResourcePools>, new_value: Arc<ResourcePools>) -> Self {
        Self {
            property: ConfigurationProperty::UpdateSize,
            old_value,
            new_value,
        }
    }
}

/// Receiver of configuration changes
pub trait ConfigurationChangeListener: Send + Sync {
    /// Handle one change event
    fn configuration_changed(&self, event: &ConfigurationChangeEvent) -> Result<()>;
}

impl<F> ConfigurationChangeListener for F
where
    F: Fn(&ConfigurationChangeEvent) + Send + Sync,
{
    fn configuration_changed(&self, event: &ConfigurationChangeEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of configuration-change listeners owned by one store
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ConfigurationChangeListener>)>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener
    pub fn register(&self, listener: Arc<dyn ConfigurationChangeListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.lock().push((id, listener));
        id
    }

    /// Remove a listener; false if the id is unknown
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Check if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver an event to every listener in registration order
    ///
    /// A failing listener is logged and does not stop delivery.
    pub fn notify(&self, event: &ConfigurationChangeEvent) {
        let snapshot: Vec<_> = self.listeners.lock().clone();
        for (id, listener) in snapshot {
            if let Err(e) = listener.configuration_changed(event) {
                warn!(listener = %id, "Configuration change listener failed: {}", e);
            }
        }
    }
}

/// Kind of entry removal reported to store event listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Removed to restore capacity
    Evicted,
    /// Removed because its expiration instant passed
    Expired,
}

/// Receiver of eviction and expiry notifications
pub trait StoreEventListener<K, V>: Send + Sync {
    /// Called after the mapping for `key` has been removed
    fn on_event(&self, event: StoreEvent, key: &K, value: &V);
}

/// Store event listeners owned by one store
pub struct StoreEventDispatcher<K, V> {
    listeners: RwLock<Vec<Arc<dyn StoreEventListener<K, V>>>>,
}

impl<K, V> Default for StoreEventDispatcher<K, V> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<K, V> StoreEventDispatcher<K, V> {
    /// Append a listener
    pub fn register(&self, listener: Arc<dyn StoreEventListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Check if anyone is listening
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver one event
    pub fn fire(&self, event: StoreEvent, key: &K, value: &V) {
        let snapshot: Vec<_> = self.listeners.read().clone();
        for listener in snapshot {
            listener.on_event(event, key, value);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn event(old: u64, new: u64) -> ConfigurationChangeEvent {
        ConfigurationChangeEvent::update_size(
            Arc::new(ResourcePools::entries(old).unwrap()),
            Arc::new(ResourcePools::entries(new).unwrap()),
        )
    }

    #[test]
    fn test_listeners_invoked_in_registration_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.register(Arc::new(move |_: &ConfigurationChangeEvent| {
                seen.lock().push(tag);
            }));
        }

        registry.notify(&event(10, 5));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_deregister() {
        let registry = ListenerRegistry::new();
        let id = registry.register(Arc::new(|_: &ConfigurationChangeEvent| {}));
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister(id));
        assert!(registry.is_empty());
        assert!(!registry.deregister(id));
    }

    struct Failing;

    impl ConfigurationChangeListener for Failing {
        fn configuration_changed(&self, _event: &ConfigurationChangeEvent) -> Result<()> {
            Err(Error::Config("listener down".to_string()))
        }
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let delivered = Arc::new(Mutex::new(None));

        registry.register(Arc::new(Failing));
        let sink = Arc::clone(&delivered);
        registry.register(Arc::new(move |e: &ConfigurationChangeEvent| {
            *sink.lock() = Some(e.new_value.capacity());
        }));

        registry.notify(&event(10, 4));
        assert_eq!(
            *delivered.lock(),
            Some(crate::store::Capacity::Entries { max: 4 })
        );
    }

    struct Recorder(Mutex<Vec<(StoreEvent, String)>>);

    impl StoreEventListener<String, u32> for Recorder {
        fn on_event(&self, event: StoreEvent, key: &String, _value: &u32) {
            self.0.lock().push((event, key.clone()));
        }
    }

    #[test]
    fn test_store_event_dispatch() {
        let dispatcher: StoreEventDispatcher<String, u32> = StoreEventDispatcher::default();
        assert!(dispatcher.is_empty());

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        dispatcher.register(recorder.clone());

        dispatcher.fire(StoreEvent::Evicted, &"a".to_string(), &1);
        dispatcher.fire(StoreEvent::Expired, &"b".to_string(), &2);

        assert_eq!(
            *recorder.0.lock(),
            vec![
                (StoreEvent::Evicted, "a".to_string()),
                (StoreEvent::Expired, "b".to_string())
            ]
        );
    }
}
