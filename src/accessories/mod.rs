//! Capability accessories.
//!
//! One accessory exists per `(vehicle, capability)` pair. Each concrete type
//! composes the shared providers it needs:
//! - `naming`: `Name`/`ConfiguredName` backed by the identity store
//! - `fault`: `StatusFault` with timed auto-revert
//! - `battery`: battery service on electric vehicles
//! - `timers`: cancellable timers and the remaining-duration countdown
//!
//! The bridge stores accessories as the tagged [`Accessory`] enum, so
//! replacing a placeholder is a variant swap at a stable `aid`.

pub mod battery;
pub mod charging;
pub mod charging_plug;
pub mod climatization;
pub mod context;
pub mod fault;
pub mod flashing;
pub mod locking;
pub mod naming;
pub mod outside_temperature;
pub mod placeholder;
pub mod timers;
pub mod window_heating;

pub use charging::ChargingAccessory;
pub use charging_plug::ChargingPlugAccessory;
pub use climatization::ClimatizationAccessory;
pub use context::{AccessoryContext, StoreHandle};
pub use flashing::FlashingAccessory;
pub use locking::LockingAccessory;
pub use outside_temperature::OutsideTemperatureAccessory;
pub use placeholder::PlaceholderAccessory;
pub use window_heating::WindowHeatingAccessory;

use crate::hap::{
    AccessoryHost, AccessoryInfo, Category, CharValue, Characteristic, Service, ServiceKind,
};
use crate::store::AccessoryKey;
use crate::vehicle::command::HONK_FLASH;
use crate::vehicle::{
    Attribute, Command, CommandAction, ObserverEvent, SetterError, Subscription, Vehicle,
};
use fault::FaultReporter;
use log::{error, info};
use naming::NameProvider;
use std::sync::{Arc, Weak};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Capability types the bridge can expose. The string form is the
/// capability id used in identity-store keys and ignore lists.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum CapabilityKind {
    Climatization,
    Charging,
    ChargingPlug,
    OutsideTemperature,
    Locking,
    Flashing,
    WindowHeating,
}

impl CapabilityKind {
    pub fn category(self) -> Category {
        match self {
            Self::Climatization => Category::AirConditioner,
            Self::Charging => Category::Outlet,
            Self::ChargingPlug | Self::OutsideTemperature => Category::Sensor,
            Self::Locking => Category::DoorLock,
            Self::Flashing => Category::Lightbulb,
            Self::WindowHeating => Category::Switch,
        }
    }

    /// Suffix of the generated display name, e.g. `"ID.3 Charging Plug"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Climatization => "Climatization",
            Self::Charging => "Charging",
            Self::ChargingPlug => "Charging Plug",
            Self::OutsideTemperature => "Outside Temperature",
            Self::Locking => "Locking System",
            Self::Flashing => "Flashing",
            Self::WindowHeating => "Window Heating",
        }
    }

    /// Suffix of the serial number, e.g. `"WVW123-charging_plug"`.
    pub fn serial_suffix(self) -> &'static str {
        match self {
            Self::Climatization => "climatization",
            Self::Charging => "charging",
            Self::ChargingPlug => "charging_plug",
            Self::OutsideTemperature => "outside_temperature",
            Self::Locking => "locking",
            Self::Flashing => "flashing",
            Self::WindowHeating => "window_heating",
        }
    }

    pub fn requires_electric_drive(self) -> bool {
        matches!(self, Self::Charging | Self::ChargingPlug)
    }

    /// Whether `vehicle` currently offers this capability.
    pub fn is_available(self, vehicle: &Vehicle) -> bool {
        if self.requires_electric_drive() && !vehicle.is_electric_capable() {
            return false;
        }
        match self {
            Self::Climatization => vehicle
                .climatization
                .as_ref()
                .is_some_and(|climatization| climatization.is_enabled()),
            Self::Charging => vehicle
                .charging
                .as_ref()
                .is_some_and(|charging| charging.is_enabled()),
            Self::ChargingPlug => vehicle
                .charging
                .as_ref()
                .and_then(|charging| charging.connector.as_ref())
                .is_some_and(|connector| connector.is_enabled()),
            Self::OutsideTemperature => vehicle
                .outside_temperature
                .as_ref()
                .is_some_and(|temperature| temperature.enabled()),
            Self::Locking => vehicle.doors.as_ref().is_some_and(|doors| doors.is_enabled()),
            Self::Flashing => vehicle.commands.contains(HONK_FLASH),
            Self::WindowHeating => vehicle
                .window_heatings
                .as_ref()
                .is_some_and(|heatings| heatings.is_enabled()),
        }
    }
}

/// Parts every capability accessory carries.
pub struct AccessoryBase {
    aid: u64,
    kind: CapabilityKind,
    key: AccessoryKey,
    info: AccessoryInfo,
    naming: NameProvider,
    fault: FaultReporter,
    store: StoreHandle,
}

impl AccessoryBase {
    pub fn new(kind: CapabilityKind, ctx: &AccessoryContext) -> Self {
        Self {
            aid: ctx.aid,
            kind,
            key: ctx.key.clone(),
            info: ctx.info.clone(),
            naming: NameProvider::new(
                &ctx.display_name,
                ctx.record.configured_name.clone(),
                ctx.store.clone(),
            ),
            fault: FaultReporter::new(ctx.runtime.clone(), ctx.shutdown.clone()),
            store: ctx.store.clone(),
        }
    }

    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn key(&self) -> &AccessoryKey {
        &self.key
    }

    pub fn naming(&self) -> &NameProvider {
        &self.naming
    }

    pub fn fault(&self) -> &FaultReporter {
        &self.fault
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn info_service(&self) -> Service {
        self.info.service()
    }

    /// Primary service with the name pair and the fault indicator.
    pub fn primary_service(&self, kind: ServiceKind) -> Service {
        Service::new(kind)
            .with_characteristic(self.naming.name().clone())
            .with_characteristic(self.naming.configured_name().clone())
            .with_characteristic(self.fault.characteristic().clone())
    }

    /// Execute `command` with `action`. Failures are logged and returned;
    /// the caller decides how to revert before raising the fault.
    pub fn run_command(
        &self,
        command: Option<Arc<Command>>,
        action: CommandAction,
    ) -> Result<(), SetterError> {
        let Some(command) = command else {
            return Err(SetterError::NotSupported(format!(
                "{} command",
                self.kind.label().to_lowercase()
            )));
        };
        command.execute(action)?;
        info!("[{}] {}: {}", self.kind, self.key.vin(), action);
        Ok(())
    }

    /// Log a failed command and raise the timed fault indicator.
    pub fn report_failure(&self, action: CommandAction, err: &SetterError) {
        error!(
            "[{}] {} failed for {}: {}",
            self.kind,
            action,
            self.key.vin(),
            err
        );
        self.fault.raise_command_fault();
    }

    /// Start/stop mapping shared by switch-like characteristics:
    /// 1, 2 and 3 start, 0 stops.
    pub fn start_stop_action(&self, value: &CharValue) -> Option<CommandAction> {
        match value.as_i64() {
            Some(1..=3) => Some(CommandAction::Start),
            Some(0) => Some(CommandAction::Stop),
            _ => {
                error!(
                    "[{}] Input for {} not understood: {}",
                    self.kind, self.key, value
                );
                None
            }
        }
    }
}

/// Behaviour shared by every capability accessory.
pub trait CapabilityAccessory: Send + Sync {
    fn base(&self) -> &AccessoryBase;

    fn services(&self) -> &[Service];

    /// Stop all timers owned by this accessory.
    fn shutdown(&self) {
        self.base().fault().cancel();
    }
}

/// Register a client-write handler that forwards to a method of `T` while
/// the accessory is alive.
pub(crate) fn on_write<T, F>(characteristic: &Characteristic, accessory: &Weak<T>, handler: F)
where
    T: Send + Sync + 'static,
    F: Fn(&T, CharValue) + Send + Sync + 'static,
{
    let accessory = accessory.clone();
    characteristic.on_write(Arc::new(move |value: CharValue| {
        if let Some(accessory) = accessory.upgrade() {
            handler(&accessory, value);
        }
    }));
}

/// Observe `attribute` for `event` on behalf of an accessory that may be
/// dropped before the attribute.
pub(crate) fn observe<T, A, F>(
    attribute: &Arc<Attribute<A>>,
    event: ObserverEvent,
    accessory: &Weak<T>,
    handler: F,
) -> Subscription
where
    T: Send + Sync + 'static,
    A: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&T, &Attribute<A>) + Send + Sync + 'static,
{
    let accessory = accessory.clone();
    attribute.add_observer(event, move |attribute, _| {
        if let Some(accessory) = accessory.upgrade() {
            handler(&accessory, attribute);
        }
    })
}

/// An installed accessory: a placeholder or one live capability accessory.
#[derive(Clone)]
pub enum Accessory {
    Placeholder(Arc<PlaceholderAccessory>),
    Climatization(Arc<ClimatizationAccessory>),
    Charging(Arc<ChargingAccessory>),
    ChargingPlug(Arc<ChargingPlugAccessory>),
    OutsideTemperature(Arc<OutsideTemperatureAccessory>),
    Locking(Arc<LockingAccessory>),
    Flashing(Arc<FlashingAccessory>),
    WindowHeating(Arc<WindowHeatingAccessory>),
}

impl Accessory {
    /// Instantiate the accessory for `kind`, bound to `vehicle`.
    ///
    /// Returns `None` if the vehicle lacks the capability's region.
    pub fn create(
        kind: CapabilityKind,
        ctx: AccessoryContext,
        vehicle: &Arc<Vehicle>,
    ) -> Option<Self> {
        let vehicle = vehicle.clone();
        Some(match kind {
            CapabilityKind::Climatization => {
                Self::Climatization(ClimatizationAccessory::new(ctx, vehicle)?)
            }
            CapabilityKind::Charging => Self::Charging(ChargingAccessory::new(ctx, vehicle)?),
            CapabilityKind::ChargingPlug => {
                Self::ChargingPlug(ChargingPlugAccessory::new(ctx, vehicle)?)
            }
            CapabilityKind::OutsideTemperature => {
                Self::OutsideTemperature(OutsideTemperatureAccessory::new(ctx, vehicle)?)
            }
            CapabilityKind::Locking => Self::Locking(LockingAccessory::new(ctx, vehicle)?),
            CapabilityKind::Flashing => Self::Flashing(FlashingAccessory::new(ctx, vehicle)),
            CapabilityKind::WindowHeating => {
                Self::WindowHeating(WindowHeatingAccessory::new(ctx, vehicle)?)
            }
        })
    }

    fn capability(&self) -> Option<&dyn CapabilityAccessory> {
        match self {
            Self::Placeholder(_) => None,
            Self::Climatization(accessory) => Some(accessory.as_ref()),
            Self::Charging(accessory) => Some(accessory.as_ref()),
            Self::ChargingPlug(accessory) => Some(accessory.as_ref()),
            Self::OutsideTemperature(accessory) => Some(accessory.as_ref()),
            Self::Locking(accessory) => Some(accessory.as_ref()),
            Self::Flashing(accessory) => Some(accessory.as_ref()),
            Self::WindowHeating(accessory) => Some(accessory.as_ref()),
        }
    }

    /// The capability this accessory implements; `None` for placeholders.
    pub fn kind(&self) -> Option<CapabilityKind> {
        self.capability().map(|accessory| accessory.base().kind())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn aid(&self) -> u64 {
        match (self, self.capability()) {
            (Self::Placeholder(placeholder), _) => placeholder.aid(),
            (_, Some(accessory)) => accessory.base().aid(),
            (_, None) => 0,
        }
    }

    pub fn display_name(&self) -> String {
        match (self, self.capability()) {
            (Self::Placeholder(placeholder), _) => placeholder.display_name().to_string(),
            (_, Some(accessory)) => accessory.base().naming().current(),
            (_, None) => String::new(),
        }
    }

    pub fn category(&self) -> Category {
        match (self, self.kind()) {
            (Self::Placeholder(placeholder), _) => placeholder.category(),
            (_, Some(kind)) => kind.category(),
            (_, None) => Category::Other,
        }
    }

    pub fn services(&self) -> &[Service] {
        match (self, self.capability()) {
            (Self::Placeholder(placeholder), _) => placeholder.services(),
            (_, Some(accessory)) => accessory.services(),
            (_, None) => &[],
        }
    }

    /// Service names as recorded in the identity store.
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .iter()
            .map(|service| service.kind().to_string())
            .collect()
    }

    /// Placeholders report themselves unavailable to the host.
    pub fn available(&self) -> bool {
        !self.is_placeholder()
    }

    /// Wire every characteristic to the host for live notifications.
    pub fn attach(&self, host: &Weak<dyn AccessoryHost>) {
        let aid = self.aid();
        for service in self.services() {
            service.attach(host, aid);
        }
    }

    pub fn shutdown(&self) {
        if let Some(accessory) = self.capability() {
            accessory.shutdown();
        }
    }
}

impl std::fmt::Debug for Accessory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessory")
            .field("aid", &self.aid())
            .field("kind", &self.kind())
            .field("name", &self.display_name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::bridge::Registry;
    use crate::store::{AccessoryRecord, IdentityStore};
    use crate::vehicle::command::CommandHandler;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::runtime::Handle;
    use tokio_util::sync::CancellationToken;

    pub const VIN: &str = "WVW123";

    /// Temporary identity store plus the pieces an accessory context needs.
    pub struct Harness {
        _dir: TempDir,
        path: PathBuf,
        pub registry: Arc<Mutex<Registry>>,
        pub shutdown: CancellationToken,
    }

    impl Harness {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("homekit-accessory.config");
            let registry = Arc::new(Mutex::new(Registry::new(IdentityStore::new(&path))));
            Self {
                _dir: dir,
                path,
                registry,
                shutdown: CancellationToken::new(),
            }
        }

        pub fn key(&self, kind: CapabilityKind) -> AccessoryKey {
            AccessoryKey::new(VIN, kind.as_ref())
        }

        pub fn store_handle(&self, kind: CapabilityKind) -> StoreHandle {
            StoreHandle::new(&self.registry, self.key(kind))
        }

        /// Context as the bridge would build it. Must run inside a runtime.
        pub fn context(&self, kind: CapabilityKind) -> AccessoryContext {
            self.context_with(kind, AccessoryRecord::default())
        }

        pub fn context_with(&self, kind: CapabilityKind, record: AccessoryRecord) -> AccessoryContext {
            let key = self.key(kind);
            AccessoryContext {
                aid: 100,
                key: key.clone(),
                display_name: format!("ID.3 {}", kind.label()),
                info: AccessoryInfo {
                    name: format!("ID.3 {}", kind.label()),
                    manufacturer: "Volkswagen".into(),
                    model: "ID.3".into(),
                    serial_number: format!("{}-{}", VIN, kind.serial_suffix()),
                    firmware_revision: None,
                },
                record,
                store: StoreHandle::new(&self.registry, key),
                runtime: Handle::current(),
                shutdown: self.shutdown.clone(),
            }
        }

        pub fn store_file_contains(&self, text: &str) -> bool {
            std::fs::read_to_string(&self.path).is_ok_and(|content| content.contains(text))
        }
    }

    /// Command handler that records every action and answers with `result`.
    pub fn recording_handler(
        result: Result<(), SetterError>,
    ) -> (Arc<Mutex<Vec<CommandAction>>>, CommandHandler) {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let recorded = actions.clone();
        let handler: CommandHandler = Arc::new(move |action: CommandAction| {
            recorded.lock().push(action);
            result.clone()
        });
        (actions, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{Charging, ChargingConnector, Climatization, DriveType};
    use strum::IntoEnumIterator;

    #[test]
    fn test_capability_ids() {
        let ids: Vec<String> = CapabilityKind::iter().map(|kind| kind.to_string()).collect();
        assert_eq!(
            ids,
            [
                "Climatization",
                "Charging",
                "ChargingPlug",
                "OutsideTemperature",
                "Locking",
                "Flashing",
                "WindowHeating"
            ]
        );
        assert_eq!("ChargingPlug".parse::<CapabilityKind>(), Ok(CapabilityKind::ChargingPlug));
        assert!("Battery".parse::<CapabilityKind>().is_err());
    }

    #[test]
    fn test_electric_only_capabilities() {
        let hybrid = Vehicle::new("WVW123", DriveType::Hybrid)
            .with_charging(Charging::new().with_connector(ChargingConnector::new()));
        assert!(CapabilityKind::Charging.is_available(&hybrid));
        assert!(CapabilityKind::ChargingPlug.is_available(&hybrid));

        let combustion = Vehicle::new("WVW123", DriveType::Combustion)
            .with_charging(Charging::new().with_connector(ChargingConnector::new()));
        assert!(!CapabilityKind::Charging.is_available(&combustion));
        assert!(!CapabilityKind::ChargingPlug.is_available(&combustion));
    }

    #[test]
    fn test_disabled_region_is_unavailable() {
        let vehicle = Vehicle::new("WVW123", DriveType::Combustion)
            .with_climatization(Climatization::new());
        assert!(CapabilityKind::Climatization.is_available(&vehicle));
        vehicle
            .climatization
            .as_ref()
            .unwrap()
            .flag
            .set_enabled(false);
        assert!(!CapabilityKind::Climatization.is_available(&vehicle));
        assert!(!CapabilityKind::Locking.is_available(&vehicle));
    }

    #[test]
    fn test_flashing_requires_command() {
        let vehicle = Vehicle::new("WVW123", DriveType::Combustion);
        assert!(!CapabilityKind::Flashing.is_available(&vehicle));
        vehicle
            .commands
            .add(Command::new(HONK_FLASH, Arc::new(|_: CommandAction| Ok(()))));
        assert!(CapabilityKind::Flashing.is_available(&vehicle));
    }
}
