//! Outlet accessory for high-voltage charging.

use super::battery::BatteryProvider;
use super::timers::Countdown;
use super::{
    AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe, on_write,
};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::command::START_STOP;
use crate::vehicle::{
    Attribute, ChargingState, ConnectionState, ObserverEvent, Subscription, Vehicle,
};
use chrono::{DateTime, Utc};
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ChargingAccessory {
    base: AccessoryBase,
    vehicle: Arc<Vehicle>,
    services: Vec<Service>,
    on: Arc<Characteristic>,
    outlet_in_use: Arc<Characteristic>,
    consumption: Arc<Characteristic>,
    countdown: Countdown,
    battery: Option<BatteryProvider>,
    state_lock: Mutex<()>,
    power_lock: Mutex<()>,
    connector_lock: Mutex<()>,
    reached_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl ChargingAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let charging = vehicle.charging.as_ref()?;

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::Charging, &ctx);
            let on = Characteristic::new(CharacteristicKind::On);
            let outlet_in_use = Characteristic::new(CharacteristicKind::OutletInUse);
            let consumption = Characteristic::new(CharacteristicKind::Consumption);
            let countdown = Countdown::new(
                Characteristic::new(CharacteristicKind::RemainingDuration),
                ctx.runtime.clone(),
                ctx.shutdown.clone(),
            );
            let battery = BatteryProvider::for_vehicle(&vehicle);

            let mut primary = base
                .primary_service(ServiceKind::Outlet)
                .with_characteristic(on.clone())
                .with_characteristic(outlet_in_use.clone())
                .with_characteristic(consumption.clone())
                .with_characteristic(countdown.characteristic().clone());
            if battery.is_some() {
                primary = primary.with_linked(ServiceKind::BatteryService);
            }
            let mut services = vec![base.info_service(), primary];
            services.extend(battery.as_ref().map(BatteryProvider::service));

            on_write(&on, weak, Self::on_switch_write);

            let mut subscriptions = vec![
                observe(
                    &charging.state,
                    ObserverEvent::ValueChanged,
                    weak,
                    |this: &Self, attribute| this.apply_state(attribute.value()),
                ),
                observe(
                    &charging.power,
                    ObserverEvent::ValueChanged,
                    weak,
                    |this: &Self, attribute| this.apply_power(attribute.value()),
                ),
                observe(
                    &charging.estimated_date_reached,
                    ObserverEvent::UpdatedNewMeasurement,
                    weak,
                    |this: &Self, attribute| this.apply_estimated_date_reached(attribute),
                ),
            ];
            if let Some(connector) = &charging.connector {
                subscriptions.push(observe(
                    &connector.connection_state,
                    ObserverEvent::ValueChanged,
                    weak,
                    |this: &Self, attribute| this.apply_connection(attribute.value()),
                ));
            }

            Self {
                base,
                vehicle: vehicle.clone(),
                services,
                on,
                outlet_in_use,
                consumption,
                countdown,
                battery,
                state_lock: Mutex::new(()),
                power_lock: Mutex::new(()),
                connector_lock: Mutex::new(()),
                reached_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_state(charging.state.value());
        accessory.apply_power(charging.power.value());
        accessory.apply_estimated_date_reached(&charging.estimated_date_reached);
        if let Some(connector) = &charging.connector {
            accessory.apply_connection(connector.connection_state.value());
        }
        Some(accessory)
    }

    pub fn on(&self) -> &Arc<Characteristic> {
        &self.on
    }

    pub fn outlet_in_use(&self) -> &Arc<Characteristic> {
        &self.outlet_in_use
    }

    pub fn consumption(&self) -> &Arc<Characteristic> {
        &self.consumption
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn battery(&self) -> Option<&BatteryProvider> {
        self.battery.as_ref()
    }

    fn apply_state(&self, state: Option<ChargingState>) {
        let _guard = self.state_lock.lock();
        self.on.set_value(is_charging(state.as_ref()));
    }

    fn apply_power(&self, kilowatts: Option<f64>) {
        let _guard = self.power_lock.lock();
        self.consumption
            .set_value(kilowatts.map_or(0.0, |kilowatts| kilowatts * 1000.0));
    }

    fn apply_connection(&self, state: Option<ConnectionState>) {
        let _guard = self.connector_lock.lock();
        self.outlet_in_use.set_value(is_plugged_in(state.as_ref()));
    }

    fn apply_estimated_date_reached(&self, attribute: &Attribute<DateTime<Utc>>) {
        let _guard = self.reached_lock.lock();
        self.countdown
            .update(attribute.value().filter(|_| attribute.enabled()));
    }

    fn on_switch_write(&self, value: CharValue) {
        let Some(action) = self.base.start_stop_action(&value) else {
            return;
        };
        let command = self
            .vehicle
            .charging
            .as_ref()
            .and_then(|charging| charging.commands.get(START_STOP));
        if let Err(e) = self.base.run_command(command, action) {
            self.base.report_failure(action, &e);
            let state = self
                .vehicle
                .charging
                .as_ref()
                .and_then(|charging| charging.state.value());
            self.apply_state(state);
        }
    }
}

impl CapabilityAccessory for ChargingAccessory {
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

fn is_charging(state: Option<&ChargingState>) -> bool {
    match state {
        None
        | Some(
            ChargingState::Off
            | ChargingState::ReadyForCharging
            | ChargingState::Error
            | ChargingState::Unsupported,
        ) => false,
        Some(ChargingState::Charging | ChargingState::Discharging | ChargingState::Conservation) => {
            true
        }
        Some(other @ (ChargingState::Unknown | ChargingState::Other(_))) => {
            warn!("[Charging] Unsupported charging state: {:?}", other);
            false
        }
    }
}

fn is_plugged_in(state: Option<&ConnectionState>) -> bool {
    match state {
        Some(ConnectionState::Connected) => true,
        None
        | Some(
            ConnectionState::Disconnected | ConnectionState::Invalid | ConnectionState::Unsupported,
        ) => false,
        Some(other @ (ConnectionState::Unknown | ConnectionState::Other(_))) => {
            warn!("[Charging] Unsupported connection state: {:?}", other);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::fault::GENERAL_FAULT;
    use crate::accessories::test_support::{Harness, VIN, recording_handler};
    use crate::vehicle::{
        Charging, ChargingConnector, Command, CommandAction, DriveType, SetterError,
    };

    fn vehicle() -> Arc<Vehicle> {
        Arc::new(
            Vehicle::new(VIN, DriveType::Electric)
                .with_charging(Charging::new().with_connector(ChargingConnector::new())),
        )
    }

    fn charging(vehicle: &Vehicle) -> &Charging {
        vehicle.charging.as_ref().unwrap()
    }

    #[test]
    fn test_on_mapping() {
        assert!(!is_charging(None));
        assert!(!is_charging(Some(&ChargingState::ReadyForCharging)));
        assert!(!is_charging(Some(&ChargingState::Error)));
        assert!(is_charging(Some(&ChargingState::Charging)));
        assert!(is_charging(Some(&ChargingState::Conservation)));
        assert!(!is_charging(Some(&ChargingState::Other("balancing".into()))));
    }

    #[test]
    fn test_outlet_in_use_mapping() {
        assert!(is_plugged_in(Some(&ConnectionState::Connected)));
        assert!(!is_plugged_in(Some(&ConnectionState::Disconnected)));
        assert!(!is_plugged_in(Some(&ConnectionState::Invalid)));
        assert!(!is_plugged_in(Some(&ConnectionState::Unknown)));
        assert!(!is_plugged_in(None));
    }

    #[tokio::test]
    async fn test_projection_follows_vehicle() {
        let harness = Harness::new();
        let vehicle = vehicle();
        let accessory =
            ChargingAccessory::new(harness.context(CapabilityKind::Charging), vehicle.clone())
                .unwrap();
        assert!(!accessory.on().get_bool());
        assert_eq!(accessory.consumption().get_f64(), 0.0);

        charging(&vehicle).state.set_value(ChargingState::Charging);
        charging(&vehicle).power.set_value(11.0);
        if let Some(connector) = &charging(&vehicle).connector {
            connector.connection_state.set_value(ConnectionState::Connected);
        }
        assert!(accessory.on().get_bool());
        assert_eq!(accessory.consumption().get_f64(), 11000.0);
        assert!(accessory.outlet_in_use().get_bool());

        charging(&vehicle).power.clear_value();
        assert_eq!(accessory.consumption().get_f64(), 0.0);
    }

    #[tokio::test]
    async fn test_switch_runs_start_stop() {
        let harness = Harness::new();
        let vehicle = vehicle();
        let (actions, handler) = recording_handler(Ok(()));
        charging(&vehicle).commands.add(Command::new(START_STOP, handler));
        let accessory =
            ChargingAccessory::new(harness.context(CapabilityKind::Charging), vehicle).unwrap();

        accessory.on().client_write(true).unwrap();
        accessory.on().client_write(false).unwrap();
        assert_eq!(*actions.lock(), [CommandAction::Start, CommandAction::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_reverts_switch() {
        let harness = Harness::new();
        let vehicle = vehicle();
        let (_, handler) = recording_handler(Err(SetterError::Rejected("not plugged in".into())));
        charging(&vehicle).commands.add(Command::new(START_STOP, handler));
        let accessory =
            ChargingAccessory::new(harness.context(CapabilityKind::Charging), vehicle).unwrap();

        accessory.on().client_write(true).unwrap();
        assert!(!accessory.on().get_bool());
        assert_eq!(accessory.base().fault().value(), GENERAL_FAULT);
    }
}
