//! Battery service for accessories of electric vehicles.
//!
//! Exposes the traction battery's state of charge as `BatteryLevel` and
//! `StatusLowBattery`, and the charging state as `ChargingState`.

use crate::hap::{Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::{Attribute, ChargingState, ObserverEvent, Subscription, Vehicle};
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;

/// State of charge at or below which the battery is reported low.
pub const LOW_BATTERY_THRESHOLD: f64 = 10.0;

const NOT_CHARGING: i64 = 0;
const CHARGING: i64 = 1;
const NOT_CHARGEABLE: i64 = 2;

pub struct BatteryProvider {
    level: Arc<Characteristic>,
    low_battery: Arc<Characteristic>,
    charging_state: Arc<Characteristic>,
    level_lock: Arc<Mutex<()>>,
    charging_state_lock: Arc<Mutex<()>>,
    _subscriptions: Vec<Subscription>,
}

impl BatteryProvider {
    /// Create the provider if `vehicle` has an electric drive with a level.
    pub fn for_vehicle(vehicle: &Vehicle) -> Option<Self> {
        if !vehicle.is_electric_capable() {
            return None;
        }
        let drive = vehicle.electric_drive.as_ref()?;
        if !drive.level.enabled() {
            return None;
        }

        let level = Characteristic::new(CharacteristicKind::BatteryLevel);
        let low_battery = Characteristic::new(CharacteristicKind::StatusLowBattery);
        let charging_state = Characteristic::with_value(CharacteristicKind::ChargingState, NOT_CHARGEABLE);
        let level_lock = Arc::new(Mutex::new(()));
        let charging_state_lock = Arc::new(Mutex::new(()));
        let mut subscriptions = Vec::new();

        {
            let level = level.clone();
            let low_battery = low_battery.clone();
            let lock = level_lock.clone();
            subscriptions.push(drive.level.add_observer(
                ObserverEvent::ValueChanged,
                move |attribute: &Attribute<f64>, _| {
                    let _guard = lock.lock();
                    if let Some(value) = attribute.value() {
                        apply_level(&level, &low_battery, Some(value));
                    }
                },
            ));
        }
        apply_level(&level, &low_battery, drive.level.value());

        if let Some(charging) = vehicle.charging.as_ref().filter(|c| c.state.enabled()) {
            let characteristic = charging_state.clone();
            let lock = charging_state_lock.clone();
            subscriptions.push(charging.state.add_observer(
                ObserverEvent::ValueChanged,
                move |attribute: &Attribute<ChargingState>, _| {
                    let _guard = lock.lock();
                    if let Some(state) = attribute.value() {
                        characteristic.set_value(charging_state_value(Some(&state)));
                    }
                },
            ));
            charging_state.set_value(charging_state_value(charging.state.value().as_ref()));
        }

        Some(Self {
            level,
            low_battery,
            charging_state,
            level_lock,
            charging_state_lock,
            _subscriptions: subscriptions,
        })
    }

    /// The `BatteryService`, to be linked from the accessory's primary service.
    pub fn service(&self) -> Service {
        Service::new(ServiceKind::BatteryService)
            .with_characteristic(self.level.clone())
            .with_characteristic(self.low_battery.clone())
            .with_characteristic(self.charging_state.clone())
    }

    pub fn level(&self) -> i64 {
        let _guard = self.level_lock.lock();
        self.level.get_i64()
    }

    pub fn is_low(&self) -> bool {
        let _guard = self.level_lock.lock();
        self.low_battery.get_i64() == 1
    }

    pub fn charging_state(&self) -> i64 {
        let _guard = self.charging_state_lock.lock();
        self.charging_state.get_i64()
    }
}

fn apply_level(level: &Characteristic, low_battery: &Characteristic, value: Option<f64>) {
    if let Some(value) = value {
        level.set_value(value.round() as i64);
    }
    let low = value.is_some_and(|value| value <= LOW_BATTERY_THRESHOLD);
    low_battery.set_value(i64::from(low));
}

fn charging_state_value(state: Option<&ChargingState>) -> i64 {
    match state {
        None => NOT_CHARGEABLE,
        Some(ChargingState::Off | ChargingState::ReadyForCharging | ChargingState::Unsupported) => {
            NOT_CHARGING
        }
        Some(ChargingState::Charging | ChargingState::Discharging | ChargingState::Conservation) => {
            CHARGING
        }
        Some(ChargingState::Error) => NOT_CHARGEABLE,
        Some(other @ (ChargingState::Unknown | ChargingState::Other(_))) => {
            warn!("[Battery] Unsupported charging state: {:?}", other);
            NOT_CHARGEABLE
        }
    }
}
