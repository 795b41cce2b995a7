//! Reconciler between the vehicle garage and the accessory host.
//!
//! The bridge owns the identity store and the registry of installed
//! accessories, both behind one lock: assigning an `aid` and installing the
//! accessory at it is a single step. At startup every known `aid` gets a
//! placeholder; each reconciliation pass then installs live accessories for
//! newly available capabilities, replacing placeholders in place.

use crate::accessories::{
    Accessory, AccessoryContext, CapabilityKind, PlaceholderAccessory, StoreHandle,
};
use crate::hap::{AccessoryHost, AccessoryInfo, Category, Service};
use crate::store::{AccessoryKey, FIELD_CATEGORY, FIELD_SERVICES, IdentityStore};
use crate::vehicle::{Garage, ObserverEvent, Subscription, Vehicle};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Weak};
use strum::IntoEnumIterator;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// `aid` of the bridge accessory itself.
pub const BRIDGE_AID: u64 = 1;

pub const BRIDGE_MANUFACTURER: &str = "CarConnectivity";
pub const BRIDGE_MODEL: &str = "CarConnectivity HomeKit Bridge";

const UNKNOWN: &str = "Unknown";

/// Identity store plus installed accessories, guarded together.
pub struct Registry {
    pub store: IdentityStore,
    pub accessories: BTreeMap<u64, Accessory>,
}

impl Registry {
    pub fn new(store: IdentityStore) -> Self {
        Self {
            store,
            accessories: BTreeMap::new(),
        }
    }
}

/// Operator settings for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub name: String,
    pub ignore_vins: BTreeSet<String>,
    pub ignore_capabilities: BTreeSet<CapabilityKind>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            name: BRIDGE_MANUFACTURER.to_string(),
            ignore_vins: BTreeSet::new(),
            ignore_capabilities: BTreeSet::new(),
        }
    }
}

/// Metadata derived from a vehicle for the accessory information service.
#[derive(Debug, Clone, PartialEq)]
struct VehicleIdentity {
    vin: String,
    name: String,
    manufacturer: String,
    model: String,
    firmware_revision: Option<String>,
}

impl VehicleIdentity {
    fn resolve(vehicle: &Vehicle, vin: &str) -> Self {
        let text = |attribute: &crate::vehicle::Attribute<String>| {
            attribute
                .value()
                .filter(|value| attribute.enabled() && !value.is_empty())
        };
        Self {
            vin: vin.to_string(),
            name: text(&vehicle.name).unwrap_or_else(|| vin.to_string()),
            manufacturer: text(&vehicle.manufacturer).unwrap_or_else(|| UNKNOWN.to_string()),
            model: text(&vehicle.model).unwrap_or_else(|| UNKNOWN.to_string()),
            firmware_revision: text(&vehicle.software_version),
        }
    }

    fn display_name(&self, kind: CapabilityKind) -> String {
        format!("{} {}", self.name, kind.label())
    }

    fn info(&self, kind: CapabilityKind) -> AccessoryInfo {
        AccessoryInfo {
            name: self.display_name(kind),
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            serial_number: format!("{}-{}", self.vin, kind.serial_suffix()),
            firmware_revision: self.firmware_revision.clone(),
        }
    }
}

pub struct Bridge {
    settings: BridgeSettings,
    info: AccessoryInfo,
    registry: Arc<Mutex<Registry>>,
    host: Arc<dyn AccessoryHost>,
    runtime: Handle,
    shutdown: CancellationToken,
    /// Vehicles whose region flags are already observed, by address.
    watched: Mutex<HashSet<usize>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Bridge {
    /// Create the bridge and install a placeholder for every `aid` the
    /// store already knows.
    pub fn new(
        store: IdentityStore,
        settings: BridgeSettings,
        host: Arc<dyn AccessoryHost>,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let info = AccessoryInfo {
            name: settings.name.clone(),
            manufacturer: BRIDGE_MANUFACTURER.to_string(),
            model: BRIDGE_MODEL.to_string(),
            serial_number: settings.name.clone(),
            firmware_revision: Some(env!("CARGO_PKG_VERSION").to_string()),
        };
        let bridge = Arc::new(Self {
            settings,
            info,
            registry: Arc::new(Mutex::new(Registry::new(store))),
            host,
            runtime,
            shutdown,
            watched: Mutex::new(HashSet::new()),
            subscriptions: Mutex::new(Vec::new()),
        });
        bridge.install_placeholders();
        bridge
    }

    fn host_ref(&self) -> Weak<dyn AccessoryHost> {
        Arc::downgrade(&self.host)
    }

    fn install_placeholders(&self) {
        let host = self.host_ref();
        let mut registry = self.registry.lock();
        let placeholders: Vec<Accessory> = registry
            .store
            .assigned()
            .map(|(key, aid, record)| Accessory::Placeholder(PlaceholderAccessory::new(aid, key, record)))
            .collect();
        for placeholder in placeholders {
            placeholder.attach(&host);
            registry.accessories.insert(placeholder.aid(), placeholder);
        }
        if !registry.accessories.is_empty() {
            info!(
                "[Bridge] Installed {} placeholder accessories",
                registry.accessories.len()
            );
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn category(&self) -> Category {
        Category::Bridge
    }

    /// Accessory information of the bridge itself (`aid` 1).
    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn info_service(&self) -> Service {
        self.info.service()
    }

    /// Snapshot of the installed accessories, ordered by `aid`.
    pub fn accessories(&self) -> Vec<Accessory> {
        self.registry.lock().accessories.values().cloned().collect()
    }

    pub fn accessory(&self, aid: u64) -> Option<Accessory> {
        self.registry.lock().accessories.get(&aid).cloned()
    }

    pub fn next_aid(&self) -> u64 {
        self.registry.lock().store.next_aid()
    }

    /// Reconcile every vehicle of `garage` now and whenever a vehicle
    /// becomes enabled later.
    pub fn attach_garage(self: &Arc<Self>, garage: &Arc<Garage>) {
        let bridge = Arc::downgrade(self);
        let subscription = garage.add_observer(move |vehicle, event| {
            if event == ObserverEvent::Enabled
                && let Some(bridge) = bridge.upgrade()
            {
                bridge.on_vehicle_enabled(vehicle);
            }
        });
        self.subscriptions.lock().push(subscription);

        for vehicle in garage.list_vehicles() {
            self.on_vehicle_enabled(&vehicle);
        }
    }

    fn on_vehicle_enabled(self: &Arc<Self>, vehicle: &Arc<Vehicle>) {
        self.watch_capabilities(vehicle);
        self.update(vehicle);
    }

    /// Re-run reconciliation when a capability region of `vehicle` is
    /// enabled after the vehicle itself.
    fn watch_capabilities(self: &Arc<Self>, vehicle: &Arc<Vehicle>) {
        if !self.watched.lock().insert(Arc::as_ptr(vehicle) as usize) {
            return;
        }
        let flags = vehicle.region_flags();
        let mut subscriptions = Vec::with_capacity(flags.len() + 1);
        for flag in flags {
            let bridge = Arc::downgrade(self);
            let weak_vehicle = Arc::downgrade(vehicle);
            subscriptions.push(flag.add_observer(ObserverEvent::Enabled, move |_, _| {
                if let (Some(bridge), Some(vehicle)) = (bridge.upgrade(), weak_vehicle.upgrade()) {
                    bridge.update(&vehicle);
                }
            }));
        }
        if let Some(temperature) = &vehicle.outside_temperature {
            let bridge = Arc::downgrade(self);
            let weak_vehicle = Arc::downgrade(vehicle);
            subscriptions.push(temperature.add_observer(ObserverEvent::Enabled, move |_, _| {
                if let (Some(bridge), Some(vehicle)) = (bridge.upgrade(), weak_vehicle.upgrade()) {
                    bridge.update(&vehicle);
                }
            }));
        }
        self.subscriptions.lock().extend(subscriptions);
    }

    /// One reconciliation pass for `vehicle`.
    ///
    /// Returns `true` if any accessory was installed. The host is told
    /// about the new configuration after the registry lock is released.
    pub fn update(&self, vehicle: &Arc<Vehicle>) -> bool {
        if !vehicle.is_enabled() {
            return false;
        }
        let Some(vin) = vehicle.vin() else {
            debug!("[Bridge] Skipping vehicle without VIN");
            return false;
        };
        if self.settings.ignore_vins.contains(&vin) {
            debug!("[Bridge] Ignoring vehicle {}", vin);
            return false;
        }
        let identity = VehicleIdentity::resolve(vehicle, &vin);

        let installed = {
            let mut registry = self.registry.lock();
            let mut installed = 0usize;
            for kind in CapabilityKind::iter() {
                if self.settings.ignore_capabilities.contains(&kind) || !kind.is_available(vehicle) {
                    continue;
                }
                if self.install(&mut registry, &identity, kind, vehicle) {
                    installed += 1;
                }
            }
            if installed > 0 {
                registry.store.persist();
            }
            installed
        };

        if installed > 0 {
            info!("[Bridge] Installed {} accessories for {}", installed, vin);
            self.host.config_changed();
        }
        installed > 0
    }

    /// Install the accessory for `kind` unless an accessory of that kind is
    /// already registered at its `aid`.
    fn install(
        &self,
        registry: &mut Registry,
        identity: &VehicleIdentity,
        kind: CapabilityKind,
        vehicle: &Arc<Vehicle>,
    ) -> bool {
        let key = AccessoryKey::new(&identity.vin, kind.as_ref());
        let existing = registry.store.get_existing(&key);
        if let Some(aid) = existing
            && registry
                .accessories
                .get(&aid)
                .is_some_and(|accessory| accessory.kind() == Some(kind))
        {
            return false;
        }

        let aid = existing.unwrap_or_else(|| registry.store.next_aid());
        let ctx = AccessoryContext {
            aid,
            key: key.clone(),
            display_name: identity.display_name(kind),
            info: identity.info(kind),
            record: registry.store.record(&key).cloned().unwrap_or_default(),
            store: StoreHandle::new(&self.registry, key.clone()),
            runtime: self.runtime.clone(),
            shutdown: self.shutdown.clone(),
        };
        let Some(accessory) = Accessory::create(kind, ctx, vehicle) else {
            warn!("[Bridge] {} has no {} region", identity.vin, kind);
            return false;
        };
        // The registry lock is held, so nothing took the aid in between.
        let aid = registry.store.resolve_or_assign(&key);

        if let Err(e) = registry
            .store
            .set_item(&key, FIELD_CATEGORY, kind.category().code())
            .and_then(|()| {
                registry
                    .store
                    .set_item(&key, FIELD_SERVICES, accessory.service_names())
            })
        {
            error!("[Bridge] Failed to record metadata for {}: {}", key, e);
        }

        accessory.attach(&self.host_ref());
        match registry.accessories.insert(aid, accessory) {
            Some(previous) if previous.is_placeholder() => {
                info!("[Bridge] {} replaces placeholder at aid {}", key, aid)
            }
            Some(previous) => {
                previous.shutdown();
                info!("[Bridge] {} replaces {:?} at aid {}", key, previous.kind(), aid);
            }
            None => info!("[Bridge] {} installed at aid {}", key, aid),
        }
        true
    }

    /// Stop all accessory timers and write the store a final time.
    pub fn shutdown(&self) {
        self.subscriptions.lock().clear();
        let registry = self.registry.lock();
        for accessory in registry.accessories.values() {
            accessory.shutdown();
        }
        registry.store.persist();
        info!("[Bridge] Shut down {} accessories", registry.accessories.len());
    }
}
