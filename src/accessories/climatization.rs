//! Thermostat accessory for cabin climatization.
//!
//! The vehicle only knows "climatization on/off", so every non-off target
//! mode starts climatization and `Off` stops it. The current state maps
//! heating to `Heat` and cooling or ventilation to `Cool`.

use super::battery::BatteryProvider;
use super::timers::Countdown;
use super::{
    AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe, on_write,
};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Properties, Service, ServiceKind};
use crate::store::FIELD_DISPLAY_UNITS;
use crate::vehicle::command::START_STOP;
use crate::vehicle::{
    Attribute, ClimatizationState, ObserverEvent, Subscription, TemperatureBounds,
    TemperatureUnit, Vehicle,
};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

pub const MODE_OFF: i64 = 0;
pub const MODE_HEAT: i64 = 1;
pub const MODE_COOL: i64 = 2;

pub struct ClimatizationAccessory {
    base: AccessoryBase,
    vehicle: Arc<Vehicle>,
    services: Vec<Service>,
    current_state: Arc<Characteristic>,
    target_state: Arc<Characteristic>,
    target_temperature: Arc<Characteristic>,
    display_units: Arc<Characteristic>,
    countdown: Countdown,
    battery: Option<BatteryProvider>,
    unit: Mutex<TemperatureUnit>,
    state_lock: Mutex<()>,
    temperature_lock: Mutex<()>,
    reached_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl ClimatizationAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let climatization = vehicle.climatization.as_ref()?;
        let unit = ctx.display_unit();

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::Climatization, &ctx);
            let current_state = Characteristic::new(CharacteristicKind::CurrentHeatingCoolingState);
            let target_state = Characteristic::new(CharacteristicKind::TargetHeatingCoolingState);
            let target_temperature = Characteristic::new(CharacteristicKind::TargetTemperature);
            let display_units =
                Characteristic::with_value(CharacteristicKind::TemperatureDisplayUnits, unit.code());
            let countdown = Countdown::new(
                Characteristic::new(CharacteristicKind::RemainingDuration),
                ctx.runtime.clone(),
                ctx.shutdown.clone(),
            );
            let battery = BatteryProvider::for_vehicle(&vehicle);

            let mut primary = base
                .primary_service(ServiceKind::Thermostat)
                .with_characteristic(current_state.clone())
                .with_characteristic(target_state.clone())
                .with_characteristic(target_temperature.clone())
                .with_characteristic(display_units.clone())
                .with_characteristic(countdown.characteristic().clone());
            let mut services = vec![base.info_service()];
            if let Some(battery) = &battery {
                primary = primary.with_linked(ServiceKind::BatteryService);
                services.push(primary);
                services.push(battery.service());
            } else {
                services.push(primary);
            }

            on_write(&target_state, weak, Self::on_mode_write);
            on_write(&target_temperature, weak, Self::on_target_temperature_write);
            on_write(&display_units, weak, Self::on_display_units_write);

            let subscriptions = vec![
                observe(
                    &climatization.state,
                    ObserverEvent::ValueChanged,
                    weak,
                    |this: &Self, attribute| this.apply_state(attribute.value()),
                ),
                observe(
                    &climatization.target_temperature,
                    ObserverEvent::ValueChanged,
                    weak,
                    |this: &Self, attribute| this.apply_target_temperature(attribute.value()),
                ),
                observe(
                    &climatization.estimated_date_reached,
                    ObserverEvent::UpdatedNewMeasurement,
                    weak,
                    |this: &Self, attribute| this.apply_estimated_date_reached(attribute),
                ),
            ];

            Self {
                base,
                vehicle: vehicle.clone(),
                services,
                current_state,
                target_state,
                target_temperature,
                display_units,
                countdown,
                battery,
                unit: Mutex::new(unit),
                state_lock: Mutex::new(()),
                temperature_lock: Mutex::new(()),
                reached_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_bounds(unit);
        accessory.apply_state(climatization.state.value());
        accessory.apply_target_temperature(climatization.target_temperature.value());
        accessory.apply_estimated_date_reached(&climatization.estimated_date_reached);
        Some(accessory)
    }

    pub fn current_state(&self) -> &Arc<Characteristic> {
        &self.current_state
    }

    pub fn target_state(&self) -> &Arc<Characteristic> {
        &self.target_state
    }

    pub fn target_temperature(&self) -> &Arc<Characteristic> {
        &self.target_temperature
    }

    pub fn display_units(&self) -> &Arc<Characteristic> {
        &self.display_units
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn battery(&self) -> Option<&BatteryProvider> {
        self.battery.as_ref()
    }

    fn apply_state(&self, state: Option<ClimatizationState>) {
        let _guard = self.state_lock.lock();
        let mode = thermostat_mode(state.as_ref());
        self.current_state.set_value(mode);
        self.target_state.set_value(mode);
    }

    fn apply_target_temperature(&self, celsius: Option<f64>) {
        let _guard = self.temperature_lock.lock();
        if let Some(celsius) = celsius {
            let unit = *self.unit.lock();
            self.target_temperature.set_value(unit.from_celsius(celsius));
        }
    }

    fn apply_estimated_date_reached(&self, attribute: &Attribute<DateTime<Utc>>) {
        let _guard = self.reached_lock.lock();
        let target = attribute.value().filter(|_| attribute.enabled());
        self.countdown.update(target);
    }

    fn apply_bounds(&self, unit: TemperatureUnit) {
        let model_bounds = self
            .vehicle
            .climatization
            .as_ref()
            .and_then(|climatization| climatization.target_temperature_bounds);
        let bounds = TemperatureBounds::for_unit(model_bounds, unit);
        self.target_temperature
            .set_properties(Properties::range(bounds.min, bounds.max, bounds.step));
    }

    fn on_mode_write(&self, value: CharValue) {
        let Some(action) = self.base.start_stop_action(&value) else {
            return;
        };
        let command = self
            .vehicle
            .climatization
            .as_ref()
            .and_then(|climatization| climatization.commands.get(START_STOP));
        if let Err(e) = self.base.run_command(command, action) {
            self.base.report_failure(action, &e);
            let state = self
                .vehicle
                .climatization
                .as_ref()
                .and_then(|climatization| climatization.state.value());
            self.apply_state(state);
        }
    }

    fn on_target_temperature_write(&self, value: CharValue) {
        let Some(climatization) = self.vehicle.climatization.as_ref() else {
            return;
        };
        let Some(requested) = value.as_f64() else {
            error!("[{}] Target temperature not understood: {}", self.base.kind(), value);
            return;
        };
        let celsius = self.unit.lock().to_celsius(requested);
        match climatization.target_temperature.request(celsius) {
            Ok(()) => info!(
                "[{}] {}: target temperature {:.1}°C",
                self.base.kind(),
                self.base.key().vin(),
                celsius
            ),
            Err(e) => {
                error!(
                    "[{}] Failed to set target temperature for {}: {}",
                    self.base.kind(),
                    self.base.key().vin(),
                    e
                );
                self.base.fault().raise_command_fault();
                self.apply_target_temperature(climatization.target_temperature.value());
            }
        }
    }

    fn on_display_units_write(&self, value: CharValue) {
        let Some(unit) = value
            .as_i64()
            .and_then(|code| u8::try_from(code).ok())
            .and_then(TemperatureUnit::from_repr)
        else {
            error!("[{}] Unknown display unit: {}", self.base.kind(), value);
            return;
        };
        *self.unit.lock() = unit;
        self.base.store().update(FIELD_DISPLAY_UNITS, unit.code());
        self.apply_bounds(unit);
        let celsius = self
            .vehicle
            .climatization
            .as_ref()
            .and_then(|climatization| climatization.target_temperature.value());
        self.apply_target_temperature(celsius);
    }
}

impl CapabilityAccessory for ClimatizationAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }

    fn shutdown(&self) {
        self.base.fault().cancel();
        self.countdown.cancel();
    }
}

fn thermostat_mode(state: Option<&ClimatizationState>) -> i64 {
    match state {
        None | Some(ClimatizationState::Off) => MODE_OFF,
        Some(ClimatizationState::Heating) => MODE_HEAT,
        Some(ClimatizationState::Cooling | ClimatizationState::Ventilation) => MODE_COOL,
        Some(other @ (ClimatizationState::Unknown | ClimatizationState::Other(_))) => {
            warn!("[Climatization] Unsupported climatization state: {:?}", other);
            MODE_OFF
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::fault::GENERAL_FAULT;
    use crate::accessories::test_support::{Harness, VIN, recording_handler};
    use crate::store::AccessoryRecord;
    use crate::vehicle::{
        Charging, Climatization, Command, CommandAction, DriveType, ElectricDrive, SetterError,
    };

    fn vehicle(drive_type: DriveType) -> Arc<Vehicle> {
        let drive = ElectricDrive::new();
        drive.level.set_value(64.0);
        Arc::new(
            Vehicle::new(VIN, drive_type)
                .with_climatization(Climatization::new())
                .with_charging(Charging::new())
                .with_electric_drive(drive),
        )
    }

    fn climatization(vehicle: &Vehicle) -> &Climatization {
        vehicle.climatization.as_ref().unwrap()
    }

    #[test]
    fn test_mode_mapping() {
        assert_eq!(thermostat_mode(None), MODE_OFF);
        assert_eq!(thermostat_mode(Some(&ClimatizationState::Heating)), MODE_HEAT);
        assert_eq!(thermostat_mode(Some(&ClimatizationState::Cooling)), MODE_COOL);
        assert_eq!(thermostat_mode(Some(&ClimatizationState::Ventilation)), MODE_COOL);
        assert_eq!(thermostat_mode(Some(&ClimatizationState::Unknown)), MODE_OFF);
        assert_eq!(
            thermostat_mode(Some(&ClimatizationState::Other("defrost".into()))),
            MODE_OFF
        );
    }

    #[tokio::test]
    async fn test_state_projection() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        climatization(&vehicle).state.set_value(ClimatizationState::Heating);
        let accessory =
            ClimatizationAccessory::new(harness.context(CapabilityKind::Climatization), vehicle.clone())
                .unwrap();
        assert_eq!(accessory.current_state().get_i64(), MODE_HEAT);
        assert_eq!(accessory.target_state().get_i64(), MODE_HEAT);

        climatization(&vehicle).state.set_value(ClimatizationState::Ventilation);
        assert_eq!(accessory.current_state().get_i64(), MODE_COOL);
        climatization(&vehicle).state.set_value(ClimatizationState::Off);
        assert_eq!(accessory.target_state().get_i64(), MODE_OFF);
    }

    #[tokio::test]
    async fn test_battery_service_only_for_electric() {
        let harness = Harness::new();
        let electric = ClimatizationAccessory::new(
            harness.context(CapabilityKind::Climatization),
            vehicle(DriveType::Electric),
        )
        .unwrap();
        assert!(electric.battery().is_some());
        let kinds: Vec<ServiceKind> = electric.services().iter().map(Service::kind).collect();
        assert_eq!(
            kinds,
            [
                ServiceKind::AccessoryInformation,
                ServiceKind::Thermostat,
                ServiceKind::BatteryService
            ]
        );

        let combustion = ClimatizationAccessory::new(
            harness.context(CapabilityKind::Climatization),
            vehicle(DriveType::Combustion),
        )
        .unwrap();
        assert!(combustion.battery().is_none());
        assert_eq!(combustion.services().len(), 2);
    }

    #[tokio::test]
    async fn test_target_mode_runs_start_stop() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        let (actions, handler) = recording_handler(Ok(()));
        climatization(&vehicle).commands.add(Command::new(START_STOP, handler));
        let accessory =
            ClimatizationAccessory::new(harness.context(CapabilityKind::Climatization), vehicle)
                .unwrap();

        accessory.target_state().client_write(3i64).unwrap();
        accessory.target_state().client_write(0i64).unwrap();
        assert_eq!(*actions.lock(), [CommandAction::Start, CommandAction::Stop]);
        assert_eq!(accessory.base().fault().value(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_command_raises_fault() {
        let harness = Harness::new();
        let accessory = ClimatizationAccessory::new(
            harness.context(CapabilityKind::Climatization),
            vehicle(DriveType::Electric),
        )
        .unwrap();

        accessory.target_state().client_write(1i64).unwrap();
        assert_eq!(accessory.base().fault().value(), GENERAL_FAULT);
        assert!(accessory.base().fault().is_reverting());
    }

    #[tokio::test]
    async fn test_target_temperature_in_fahrenheit() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        let requested = Arc::new(Mutex::new(None));
        {
            let requested = requested.clone();
            let attribute = &climatization(&vehicle).target_temperature;
            attribute.set_value(20.0);
            attribute.set_setter_hook(Arc::new(move |_: &Attribute<f64>, value: f64| {
                *requested.lock() = Some(value);
                Ok(())
            }));
        }
        let mut record = AccessoryRecord::default();
        record.settings.insert(FIELD_DISPLAY_UNITS.into(), 1.into());
        let accessory = ClimatizationAccessory::new(
            harness.context_with(CapabilityKind::Climatization, record),
            vehicle.clone(),
        )
        .unwrap();

        assert_eq!(accessory.target_temperature().get_f64(), 68.0);
        assert_eq!(accessory.target_temperature().properties().max, Some(85.0));

        accessory.target_temperature().client_write(77.0).unwrap();
        let celsius = requested.lock().take().unwrap();
        assert!((celsius - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_target_temperature_reverts() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        let attribute = &climatization(&vehicle).target_temperature;
        attribute.set_value(21.0);
        attribute.set_setter_hook(Arc::new(|_: &Attribute<f64>, _: f64| {
            Err(SetterError::Rejected("busy".into()))
        }));
        let accessory =
            ClimatizationAccessory::new(harness.context(CapabilityKind::Climatization), vehicle.clone())
                .unwrap();

        accessory.target_temperature().client_write(24.0).unwrap();
        assert_eq!(accessory.target_temperature().get_f64(), 21.0);
        assert_eq!(accessory.base().fault().value(), GENERAL_FAULT);
    }

    #[tokio::test]
    async fn test_display_unit_change_is_persisted() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        climatization(&vehicle).target_temperature.set_value(22.0);
        let accessory =
            ClimatizationAccessory::new(harness.context(CapabilityKind::Climatization), vehicle)
                .unwrap();
        assert_eq!(accessory.target_temperature().get_f64(), 22.0);

        accessory.display_units().client_write(1i64).unwrap();
        assert!((accessory.target_temperature().get_f64() - 71.6).abs() < 1e-9);
        assert!(harness.store_file_contains("\"TemperatureDisplayUnits\": 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_duration_tracks_estimate() {
        let harness = Harness::new();
        let vehicle = vehicle(DriveType::Electric);
        let accessory =
            ClimatizationAccessory::new(harness.context(CapabilityKind::Climatization), vehicle.clone())
                .unwrap();
        assert_eq!(accessory.countdown().characteristic().get_i64(), 0);

        climatization(&vehicle)
            .estimated_date_reached
            .set_value(Utc::now() + chrono::Duration::seconds(600));
        let remaining = accessory.countdown().characteristic().get_i64();
        assert!((599..=600).contains(&remaining));
        assert!(accessory.countdown().is_running());

        climatization(&vehicle).estimated_date_reached.clear_value();
        assert_eq!(accessory.countdown().characteristic().get_i64(), 0);
        assert!(!accessory.countdown().is_running());
    }
}
