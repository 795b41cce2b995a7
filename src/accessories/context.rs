//! Everything a capability accessory needs from its surroundings.

use super::timers::TimerSlot;
use crate::bridge::Registry;
use crate::hap::AccessoryInfo;
use crate::store::{AccessoryKey, AccessoryRecord, FIELD_DISPLAY_UNITS};
use crate::vehicle::TemperatureUnit;
use log::error;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Write access to one accessory's entry in the identity store.
///
/// Goes through the bridge registry lock, so it must not be used while the
/// bridge is reconciling on the same thread (i.e. from constructors).
#[derive(Clone)]
pub struct StoreHandle {
    registry: Weak<Mutex<Registry>>,
    key: AccessoryKey,
}

impl StoreHandle {
    pub fn new(registry: &Arc<Mutex<Registry>>, key: AccessoryKey) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            key,
        }
    }

    pub fn key(&self) -> &AccessoryKey {
        &self.key
    }

    /// Set a field and persist the store.
    pub fn update<V: Serialize>(&self, field: &str, value: V) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        match registry.store.set_item(&self.key, field, value) {
            Ok(()) => registry.store.persist(),
            Err(e) => error!("[Store] Failed to set {}.{}: {}", self.key, field, e),
        }
    }

    pub fn get<V: DeserializeOwned>(&self, field: &str) -> Option<V> {
        let registry = self.registry.upgrade()?;
        let registry = registry.lock();
        registry.store.get_item(&self.key, field)
    }
}

/// Construction context for a capability accessory.
#[derive(Clone)]
pub struct AccessoryContext {
    pub aid: u64,
    pub key: AccessoryKey,
    /// Generated display name, e.g. `"ID.3 Climatization"`.
    pub display_name: String,
    pub info: AccessoryInfo,
    /// Snapshot of the store entry taken when the accessory was created.
    pub record: AccessoryRecord,
    pub store: StoreHandle,
    pub runtime: Handle,
    pub shutdown: CancellationToken,
}

impl AccessoryContext {
    /// A capability-specific setting from the store snapshot.
    pub fn setting<V: DeserializeOwned>(&self, field: &str) -> Option<V> {
        let value = self.record.settings.get(field)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Persisted temperature display unit, Celsius if unset.
    pub fn display_unit(&self) -> TemperatureUnit {
        self.setting::<u8>(FIELD_DISPLAY_UNITS)
            .and_then(TemperatureUnit::from_repr)
            .unwrap_or_default()
    }

    pub fn timer_slot(&self) -> TimerSlot {
        TimerSlot::new(self.runtime.clone(), self.shutdown.clone())
    }
}
