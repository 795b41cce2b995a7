//! Vehicle object graph.
//!
//! A [`Vehicle`] is assembled once by the backend (builder style, mirroring
//! how capabilities are discovered) and then shared as `Arc<Vehicle>`. All
//! mutable state lives in the contained [`Attribute`]s, so the graph itself is
//! never mutated after construction.

use super::command::Commands;
use super::observable::{Attribute, Detach, ObserverEvent, RegionFlag, Subscription};
use super::states::{
    ChargingState, ClimatizationState, ConnectionState, DriveType, HeatingState, LockState,
};
use super::units::TemperatureBounds;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Cabin climatization.
pub struct Climatization {
    pub flag: Arc<RegionFlag>,
    pub state: Arc<Attribute<ClimatizationState>>,
    /// Target temperature in Celsius.
    pub target_temperature: Arc<Attribute<f64>>,
    pub target_temperature_bounds: Option<TemperatureBounds>,
    pub estimated_date_reached: Arc<Attribute<DateTime<Utc>>>,
    pub commands: Commands,
}

impl Climatization {
    pub fn new() -> Self {
        Self {
            flag: enabled_flag("climatization"),
            state: Arc::new(Attribute::new("climatization.state")),
            target_temperature: Arc::new(Attribute::new("climatization.target_temperature")),
            target_temperature_bounds: None,
            estimated_date_reached: Arc::new(Attribute::new(
                "climatization.estimated_date_reached",
            )),
            commands: Commands::new(),
        }
    }

    pub fn with_target_temperature_bounds(mut self, bounds: TemperatureBounds) -> Self {
        self.target_temperature_bounds = Some(bounds);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }
}

impl Default for Climatization {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChargingConnector {
    pub flag: Arc<RegionFlag>,
    pub connection_state: Arc<Attribute<ConnectionState>>,
}

impl ChargingConnector {
    pub fn new() -> Self {
        Self {
            flag: enabled_flag("charging.connector"),
            connection_state: Arc::new(Attribute::new("charging.connector.connection_state")),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }
}

impl Default for ChargingConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// High-voltage charging.
pub struct Charging {
    pub flag: Arc<RegionFlag>,
    pub state: Arc<Attribute<ChargingState>>,
    /// Charging power in kW.
    pub power: Arc<Attribute<f64>>,
    pub estimated_date_reached: Arc<Attribute<DateTime<Utc>>>,
    pub connector: Option<ChargingConnector>,
    pub commands: Commands,
}

impl Charging {
    pub fn new() -> Self {
        Self {
            flag: enabled_flag("charging"),
            state: Arc::new(Attribute::new("charging.state")),
            power: Arc::new(Attribute::new("charging.power")),
            estimated_date_reached: Arc::new(Attribute::new("charging.estimated_date_reached")),
            connector: None,
            commands: Commands::new(),
        }
    }

    pub fn with_connector(mut self, connector: ChargingConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }
}

impl Default for Charging {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ElectricDrive {
    /// Battery state of charge in percent.
    pub level: Arc<Attribute<f64>>,
}

impl ElectricDrive {
    pub fn new() -> Self {
        Self {
            level: Arc::new(Attribute::new("drive.level")),
        }
    }
}

impl Default for ElectricDrive {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Doors {
    pub flag: Arc<RegionFlag>,
    pub lock_state: Arc<Attribute<LockState>>,
    pub commands: Commands,
}

impl Doors {
    pub fn new() -> Self {
        Self {
            flag: enabled_flag("doors"),
            lock_state: Arc::new(Attribute::new("doors.lock_state")),
            commands: Commands::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }
}

impl Default for Doors {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WindowHeatings {
    pub flag: Arc<RegionFlag>,
    pub heating_state: Arc<Attribute<HeatingState>>,
    pub commands: Commands,
}

impl WindowHeatings {
    pub fn new() -> Self {
        Self {
            flag: enabled_flag("window_heatings"),
            heating_state: Arc::new(Attribute::new("window_heatings.heating_state")),
            commands: Commands::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }
}

impl Default for WindowHeatings {
    fn default() -> Self {
        Self::new()
    }
}

fn enabled_flag(name: &'static str) -> Arc<RegionFlag> {
    let flag = Attribute::new(name);
    flag.set_enabled(true);
    Arc::new(flag)
}

/// One vehicle as reported by the backend.
pub struct Vehicle {
    /// Vehicle enablement; the garage re-publishes its `Enabled` events.
    pub flag: Arc<RegionFlag>,
    pub vin: Arc<Attribute<String>>,
    pub name: Arc<Attribute<String>>,
    pub manufacturer: Arc<Attribute<String>>,
    pub model: Arc<Attribute<String>>,
    pub software_version: Arc<Attribute<String>>,
    pub drive_type: DriveType,
    pub climatization: Option<Climatization>,
    pub charging: Option<Charging>,
    pub electric_drive: Option<ElectricDrive>,
    /// Outside temperature in Celsius.
    pub outside_temperature: Option<Arc<Attribute<f64>>>,
    pub doors: Option<Doors>,
    pub window_heatings: Option<WindowHeatings>,
    pub commands: Commands,
}

impl Vehicle {
    /// Create a disabled vehicle. Call `flag.set_enabled(true)` once the
    /// backend has finished populating it.
    pub fn new(vin: impl Into<String>, drive_type: DriveType) -> Self {
        Self {
            flag: Arc::new(Attribute::new("vehicle")),
            vin: Arc::new(Attribute::with_value("vin", vin.into())),
            name: Arc::new(Attribute::new("name")),
            manufacturer: Arc::new(Attribute::new("manufacturer")),
            model: Arc::new(Attribute::new("model")),
            software_version: Arc::new(Attribute::new("software.version")),
            drive_type,
            climatization: None,
            charging: None,
            electric_drive: None,
            outside_temperature: None,
            doors: None,
            window_heatings: None,
            commands: Commands::new(),
        }
    }

    pub fn with_climatization(mut self, climatization: Climatization) -> Self {
        self.climatization = Some(climatization);
        self
    }

    pub fn with_charging(mut self, charging: Charging) -> Self {
        self.charging = Some(charging);
        self
    }

    pub fn with_electric_drive(mut self, drive: ElectricDrive) -> Self {
        self.electric_drive = Some(drive);
        self
    }

    pub fn with_outside_temperature(mut self) -> Self {
        self.outside_temperature = Some(Arc::new(Attribute::new("outside_temperature")));
        self
    }

    pub fn with_doors(mut self, doors: Doors) -> Self {
        self.doors = Some(doors);
        self
    }

    pub fn with_window_heatings(mut self, heatings: WindowHeatings) -> Self {
        self.window_heatings = Some(heatings);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.enabled()
    }

    /// The identifying key, if reported.
    pub fn vin(&self) -> Option<String> {
        if !self.vin.enabled() {
            return None;
        }
        self.vin.value().filter(|vin| !vin.is_empty())
    }

    pub fn is_electric_capable(&self) -> bool {
        self.drive_type.is_electric_capable()
    }

    /// Every region flag of this vehicle, used to re-run reconciliation
    /// when a capability is enabled after the vehicle itself.
    pub fn region_flags(&self) -> Vec<Arc<RegionFlag>> {
        let mut flags = Vec::new();
        if let Some(climatization) = &self.climatization {
            flags.push(climatization.flag.clone());
        }
        if let Some(charging) = &self.charging {
            flags.push(charging.flag.clone());
            if let Some(connector) = &charging.connector {
                flags.push(connector.flag.clone());
            }
        }
        if let Some(doors) = &self.doors {
            flags.push(doors.flag.clone());
        }
        if let Some(heatings) = &self.window_heatings {
            flags.push(heatings.flag.clone());
        }
        flags
    }
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("vin", &self.vin.value())
            .field("enabled", &self.is_enabled())
            .field("drive_type", &self.drive_type)
            .finish()
    }
}

pub type GarageObserver = Arc<dyn Fn(&Arc<Vehicle>, ObserverEvent) + Send + Sync>;

/// The collection of vehicles known to the backend.
pub struct Garage {
    vehicles: RwLock<Vec<Arc<Vehicle>>>,
    observers: Mutex<Vec<(u64, GarageObserver)>>,
    next_observer_id: AtomicU64,
    vehicle_subscriptions: Mutex<Vec<Subscription>>,
}

impl Garage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vehicles: RwLock::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            vehicle_subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Add a vehicle. Observers are notified now if it is already enabled,
    /// otherwise as soon as it becomes enabled.
    pub fn add_vehicle(self: &Arc<Self>, vehicle: Arc<Vehicle>) {
        let garage = Arc::downgrade(self);
        let weak_vehicle = Arc::downgrade(&vehicle);
        let subscription = vehicle
            .flag
            .add_observer(ObserverEvent::Enabled, move |_, event| {
                if let (Some(garage), Some(vehicle)) = (garage.upgrade(), weak_vehicle.upgrade()) {
                    garage.notify(&vehicle, event);
                }
            });
        self.vehicle_subscriptions.lock().push(subscription);
        self.vehicles.write().push(vehicle.clone());

        if vehicle.is_enabled() {
            self.notify(&vehicle, ObserverEvent::Enabled);
        }
    }

    pub fn list_vehicles(&self) -> Vec<Arc<Vehicle>> {
        self.vehicles.read().clone()
    }

    pub fn get_vehicle(&self, vin: &str) -> Option<Arc<Vehicle>> {
        self.vehicles
            .read()
            .iter()
            .find(|vehicle| vehicle.vin().as_deref() == Some(vin))
            .cloned()
    }

    /// Observe vehicles becoming enabled.
    pub fn add_observer<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&Arc<Vehicle>, ObserverEvent) + Send + Sync + 'static,
    {
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().push((id, Arc::new(callback)));
        let source: Weak<dyn Detach> = Arc::downgrade(self) as Weak<dyn Detach>;
        Subscription::new(id, source)
    }

    fn notify(&self, vehicle: &Arc<Vehicle>, event: ObserverEvent) {
        let callbacks: Vec<GarageObserver> = self
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(vehicle, event);
        }
    }
}

impl Detach for Garage {
    fn detach(&self, id: u64) {
        self.observers.lock().retain(|(entry, _)| *entry != id);
    }
}
