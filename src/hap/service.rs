//! Services group characteristics under a protocol-defined type.

use super::characteristic::{Characteristic, CharacteristicKind};
use super::notifier::{AccessoryHost, CharacteristicNotifier};
use std::sync::{Arc, Weak};
use strum::{AsRefStr, Display, EnumString};

/// HomeKit service types used by the bridge.
///
/// The string form is what the identity store records under `services`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ServiceKind {
    AccessoryInformation,
    Thermostat,
    BatteryService,
    Outlet,
    ContactSensor,
    TemperatureSensor,
    LockMechanism,
    Lightbulb,
    Switch,
}

/// A service and its characteristics.
#[derive(Debug)]
pub struct Service {
    kind: ServiceKind,
    characteristics: Vec<Arc<Characteristic>>,
    linked: Vec<ServiceKind>,
}

impl Service {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            characteristics: Vec::new(),
            linked: Vec::new(),
        }
    }

    /// Add a characteristic. Builder-style.
    pub fn with_characteristic(mut self, characteristic: Arc<Characteristic>) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Link another service of the same accessory (e.g. battery to thermostat).
    pub fn with_linked(mut self, kind: ServiceKind) -> Self {
        self.linked.push(kind);
        self
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn characteristics(&self) -> &[Arc<Characteristic>] {
        &self.characteristics
    }

    pub fn characteristic(&self, kind: CharacteristicKind) -> Option<&Arc<Characteristic>> {
        self.characteristics.iter().find(|c| c.kind() == kind)
    }

    pub fn linked(&self) -> &[ServiceKind] {
        &self.linked
    }

    /// Wire every characteristic of this service to the host.
    pub fn attach(&self, host: &Weak<dyn AccessoryHost>, aid: u64) {
        for characteristic in &self.characteristics {
            characteristic.set_notifier(CharacteristicNotifier::new(host.clone(), aid, self.kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_kind() {
        let service = Service::new(ServiceKind::Outlet)
            .with_characteristic(Characteristic::new(CharacteristicKind::On))
            .with_characteristic(Characteristic::new(CharacteristicKind::OutletInUse))
            .with_linked(ServiceKind::BatteryService);

        assert!(service.characteristic(CharacteristicKind::OutletInUse).is_some());
        assert!(service.characteristic(CharacteristicKind::Consumption).is_none());
        assert_eq!(service.linked(), &[ServiceKind::BatteryService]);
    }

    #[test]
    fn test_service_names_round_trip() {
        assert_eq!(ServiceKind::LockMechanism.to_string(), "LockMechanism");
        assert_eq!("BatteryService".parse::<ServiceKind>(), Ok(ServiceKind::BatteryService));
        assert!("Doorbell".parse::<ServiceKind>().is_err());
    }
}
