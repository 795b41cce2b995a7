//! Temperature sensor for the outside temperature.

use super::{
    AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe, on_write,
};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Properties, Service, ServiceKind};
use crate::store::FIELD_DISPLAY_UNITS;
use crate::vehicle::{Attribute, ObserverEvent, Subscription, TemperatureUnit, Vehicle};
use log::error;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct OutsideTemperatureAccessory {
    base: AccessoryBase,
    temperature_attribute: Arc<Attribute<f64>>,
    services: Vec<Service>,
    current_temperature: Arc<Characteristic>,
    display_units: Arc<Characteristic>,
    unit: Mutex<TemperatureUnit>,
    temperature_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl OutsideTemperatureAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let temperature = vehicle.outside_temperature.clone()?;
        let unit = ctx.display_unit();

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::OutsideTemperature, &ctx);
            let current_temperature = Characteristic::new(CharacteristicKind::CurrentTemperature);
            let display_units =
                Characteristic::with_value(CharacteristicKind::TemperatureDisplayUnits, unit.code());

            let primary = base
                .primary_service(ServiceKind::TemperatureSensor)
                .with_characteristic(current_temperature.clone())
                .with_characteristic(display_units.clone());
            let services = vec![base.info_service(), primary];

            on_write(&display_units, weak, Self::on_display_units_write);
            let subscriptions = vec![observe(
                &temperature,
                ObserverEvent::ValueChanged,
                weak,
                |this: &Self, attribute| this.apply_temperature(attribute),
            )];

            Self {
                base,
                temperature_attribute: temperature.clone(),
                services,
                current_temperature,
                display_units,
                unit: Mutex::new(unit),
                temperature_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_unit(unit);
        Some(accessory)
    }

    pub fn current_temperature(&self) -> &Arc<Characteristic> {
        &self.current_temperature
    }

    pub fn display_units(&self) -> &Arc<Characteristic> {
        &self.display_units
    }

    fn apply_temperature(&self, attribute: &Attribute<f64>) {
        let _guard = self.temperature_lock.lock();
        if !attribute.enabled() {
            return;
        }
        if let Some(celsius) = attribute.value() {
            let unit = *self.unit.lock();
            self.current_temperature.set_value(unit.from_celsius(celsius));
        }
    }

    fn apply_unit(&self, unit: TemperatureUnit) {
        *self.unit.lock() = unit;
        self.current_temperature.set_properties(sensor_range(unit));
        self.apply_temperature(&self.temperature_attribute);
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
        self.base.store().update(FIELD_DISPLAY_UNITS, unit.code());
        self.apply_unit(unit);
    }
}

impl CapabilityAccessory for OutsideTemperatureAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

/// Reportable range of the sensor in `unit`.
fn sensor_range(unit: TemperatureUnit) -> Properties {
    Properties::range(unit.from_celsius(-270.0), unit.from_celsius(100.0), 0.1)
}
