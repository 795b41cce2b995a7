//! Observable vehicle attributes.
//!
//! Every piece of telemetry in the vehicle graph is an [`Attribute`]: an
//! enabled flag plus an optional value. Consumers register observers for a
//! single [`ObserverEvent`] and get a [`Subscription`] guard back; dropping the
//! guard detaches the observer again.
//!
//! Observers are invoked from whatever thread updates the attribute (the
//! vehicle backend's polling thread, a simulation task, ...). No internal
//! lock is held while an observer runs, so observers may read the attribute
//! or register further observers without deadlocking.

use super::command::SetterError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Kind of change an observer is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverEvent {
    /// The attribute (or region) became available.
    Enabled,
    /// The attribute (or region) is no longer available.
    Disabled,
    /// The value differs from the previous one.
    ValueChanged,
    /// A fresh measurement arrived, even if it equals the previous value.
    UpdatedNewMeasurement,
}

pub type Observer<T> = Arc<dyn Fn(&Attribute<T>, ObserverEvent) + Send + Sync>;

/// Hook that forwards a user-requested value to the vehicle backend.
pub type SetterHook<T> = Arc<dyn Fn(&Attribute<T>, T) -> Result<(), SetterError> + Send + Sync>;

/// Something observers can be detached from.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

/// Guard for a registered observer. Dropping it removes the observer.
#[must_use = "dropping a Subscription detaches the observer immediately"]
pub struct Subscription {
    id: u64,
    source: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn new(id: u64, source: Weak<dyn Detach>) -> Self {
        Self { id, source }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct AttributeState<T> {
    enabled: bool,
    value: Option<T>,
    last_updated: Option<DateTime<Utc>>,
}

struct ObserverEntry<T> {
    id: u64,
    event: ObserverEvent,
    callback: Observer<T>,
}

/// A single observable value in the vehicle graph.
pub struct Attribute<T> {
    name: &'static str,
    state: RwLock<AttributeState<T>>,
    observers: Mutex<Vec<ObserverEntry<T>>>,
    next_observer_id: AtomicU64,
    setter: RwLock<Option<SetterHook<T>>>,
}

/// Enablement of a whole vehicle region; carries no value of its own.
pub type RegionFlag = Attribute<()>;

impl<T> Attribute<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a disabled attribute without a value.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(AttributeState {
                enabled: false,
                value: None,
                last_updated: None,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            setter: RwLock::new(None),
        }
    }

    /// Create an enabled attribute holding `value`.
    pub fn with_value(name: &'static str, value: T) -> Self {
        let attribute = Self::new(name);
        {
            let mut state = attribute.state.write();
            state.enabled = true;
            state.value = Some(value);
            state.last_updated = Some(Utc::now());
        }
        attribute
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn enabled(&self) -> bool {
        self.state.read().enabled
    }

    pub fn value(&self) -> Option<T> {
        self.state.read().value.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_updated
    }

    /// Enable or disable the attribute, notifying `Enabled`/`Disabled` observers on change.
    pub fn set_enabled(&self, enabled: bool) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.enabled != enabled;
            state.enabled = enabled;
            changed
        };
        if changed {
            self.notify(if enabled {
                ObserverEvent::Enabled
            } else {
                ObserverEvent::Disabled
            });
        }
    }

    /// Store a new measurement.
    ///
    /// Enables the attribute if needed, fires `ValueChanged` when the value
    /// differs from the previous one and `UpdatedNewMeasurement` always.
    pub fn set_value(&self, value: T) {
        let (became_enabled, changed) = {
            let mut state = self.state.write();
            let became_enabled = !state.enabled;
            let changed = state.value.as_ref() != Some(&value);
            state.enabled = true;
            state.value = Some(value);
            state.last_updated = Some(Utc::now());
            (became_enabled, changed)
        };
        if became_enabled {
            self.notify(ObserverEvent::Enabled);
        }
        if changed {
            self.notify(ObserverEvent::ValueChanged);
        }
        self.notify(ObserverEvent::UpdatedNewMeasurement);
    }

    /// Drop the current value (the backend no longer reports it).
    pub fn clear_value(&self) {
        let changed = {
            let mut state = self.state.write();
            state.last_updated = Some(Utc::now());
            state.value.take().is_some()
        };
        if changed {
            self.notify(ObserverEvent::ValueChanged);
        }
        self.notify(ObserverEvent::UpdatedNewMeasurement);
    }

    /// Register an observer for `event`.
    pub fn add_observer<F>(self: &Arc<Self>, event: ObserverEvent, callback: F) -> Subscription
    where
        F: Fn(&Attribute<T>, ObserverEvent) + Send + Sync + 'static,
    {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().push(ObserverEntry {
            id,
            event,
            callback: Arc::new(callback),
        });
        let source: Weak<dyn Detach> = Arc::downgrade(self) as Weak<dyn Detach>;
        Subscription::new(id, source)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Install the hook used by [`Attribute::request`].
    pub fn set_setter_hook(&self, hook: SetterHook<T>) {
        *self.setter.write() = Some(hook);
    }

    /// Ask the vehicle backend to change this attribute.
    ///
    /// The displayed value is not touched here; the backend reports the new
    /// value through the regular update path once it has been applied.
    pub fn request(&self, value: T) -> Result<(), SetterError> {
        if !self.enabled() {
            return Err(SetterError::Disabled(self.name.to_string()));
        }
        let hook = self.setter.read().clone();
        match hook {
            Some(hook) => hook(self, value),
            None => Err(SetterError::NotSupported(self.name.to_string())),
        }
    }

    fn notify(&self, event: ObserverEvent) {
        let callbacks: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| entry.callback.clone())
            .collect();
        for callback in callbacks {
            callback(self, event);
        }
    }
}

impl<T> Detach for Attribute<T>
where
    T: Send + Sync + 'static,
{
    fn detach(&self, id: u64) {
        self.observers.lock().retain(|entry| entry.id != id);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("enabled", &state.enabled)
            .field("value", &state.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Attribute<u8>, ObserverEvent) + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_: &Attribute<u8>, _| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_value_changed_only_fires_on_change() {
        let attribute = Arc::new(Attribute::new("level"));
        let (changed, callback) = counter();
        let _sub = attribute.add_observer(ObserverEvent::ValueChanged, callback);

        attribute.set_value(10);
        attribute.set_value(10);
        attribute.set_value(11);

        assert_eq!(changed.load(Ordering::SeqCst), 2);
        assert_eq!(attribute.value(), Some(11));
        assert!(attribute.enabled());
    }

    #[test]
    fn test_new_measurement_fires_every_time() {
        let attribute = Arc::new(Attribute::new("level"));
        let (measured, callback) = counter();
        let _sub = attribute.add_observer(ObserverEvent::UpdatedNewMeasurement, callback);

        attribute.set_value(10);
        attribute.set_value(10);

        assert_eq!(measured.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_subscription_detaches() {
        let attribute = Arc::new(Attribute::new("level"));
        let (changed, callback) = counter();
        let sub = attribute.add_observer(ObserverEvent::ValueChanged, callback);
        assert_eq!(attribute.observer_count(), 1);

        drop(sub);
        attribute.set_value(1);

        assert_eq!(attribute.observer_count(), 0);
        assert_eq!(changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enable_events() {
        let attribute: Arc<Attribute<u8>> = Arc::new(Attribute::new("level"));
        let (enabled, callback) = counter();
        let _sub = attribute.add_observer(ObserverEvent::Enabled, callback);

        attribute.set_enabled(true);
        attribute.set_enabled(true);
        attribute.set_enabled(false);
        attribute.set_value(3);

        assert_eq!(enabled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_read_attribute() {
        let attribute = Arc::new(Attribute::new("level"));
        let seen = Arc::new(Mutex::new(None));
        let seen_inner = seen.clone();
        let _sub = attribute.add_observer(ObserverEvent::ValueChanged, move |attr, _| {
            *seen_inner.lock() = attr.value();
        });

        attribute.set_value(42u8);

        assert_eq!(*seen.lock(), Some(42));
    }

    #[test]
    fn test_request_without_hook_is_not_supported() {
        let attribute = Attribute::with_value("target_temperature", 21.0);
        assert_eq!(
            attribute.request(22.0),
            Err(SetterError::NotSupported("target_temperature".into()))
        );

        let disabled: Attribute<f64> = Attribute::new("target_temperature");
        assert_eq!(
            disabled.request(22.0),
            Err(SetterError::Disabled("target_temperature".into()))
        );
    }

    #[test]
    fn test_request_forwards_to_hook() {
        let attribute = Attribute::with_value("target_temperature", 21.0);
        attribute.set_setter_hook(Arc::new(|attr: &Attribute<f64>, value: f64| {
            attr.set_value(value);
            Ok(())
        }));

        assert!(attribute.request(23.5).is_ok());
        assert_eq!(attribute.value(), Some(23.5));
    }
}
