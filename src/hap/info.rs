//! Accessory information service.

use super::characteristic::{Characteristic, CharacteristicKind};
use super::service::{Service, ServiceKind};

/// Metadata shown in the client's accessory details.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: Option<String>,
}

impl AccessoryInfo {
    /// Build the `AccessoryInformation` service for this metadata.
    pub fn service(&self) -> Service {
        let text = |kind, value: &str| Characteristic::with_value(kind, value);
        let mut service = Service::new(ServiceKind::AccessoryInformation)
            .with_characteristic(Characteristic::new(CharacteristicKind::Identify))
            .with_characteristic(text(CharacteristicKind::Name, &self.name))
            .with_characteristic(text(CharacteristicKind::Manufacturer, &self.manufacturer))
            .with_characteristic(text(CharacteristicKind::Model, &self.model))
            .with_characteristic(text(CharacteristicKind::SerialNumber, &self.serial_number));
        if let Some(firmware) = &self.firmware_revision {
            service = service.with_characteristic(text(CharacteristicKind::FirmwareRevision, firmware));
        }
        service
    }
}
