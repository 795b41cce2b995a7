//! Contact sensor for the charging plug.
//!
//! "Closed" means a plug is connected. States that say nothing about the
//! plug also raise the fault indicator.

use super::fault::{GENERAL_FAULT, NO_FAULT};
use super::{AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe};
use crate::hap::{Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::{ConnectionState, ObserverEvent, Subscription, Vehicle};
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const CONTACT_DETECTED: i64 = 0;
pub const CONTACT_NOT_DETECTED: i64 = 1;

pub struct ChargingPlugAccessory {
    base: AccessoryBase,
    services: Vec<Service>,
    contact: Arc<Characteristic>,
    connection_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl ChargingPlugAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let connector = vehicle.charging.as_ref()?.connector.as_ref()?;

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::ChargingPlug, &ctx);
            let contact = Characteristic::new(CharacteristicKind::ContactSensorState);
            let services = vec![
                base.info_service(),
                base.primary_service(ServiceKind::ContactSensor)
                    .with_characteristic(contact.clone()),
            ];

            let subscriptions = vec![observe(
                &connector.connection_state,
                ObserverEvent::ValueChanged,
                weak,
                |this: &Self, attribute| this.apply_connection(attribute.value()),
            )];

            Self {
                base,
                services,
                contact,
                connection_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_connection(connector.connection_state.value());
        Some(accessory)
    }

    pub fn contact(&self) -> &Arc<Characteristic> {
        &self.contact
    }

    fn apply_connection(&self, state: Option<ConnectionState>) {
        let _guard = self.connection_lock.lock();
        let (contact, fault) = contact_state(state.as_ref());
        self.contact.set_value(contact);
        self.base.fault().set_fault(fault, Duration::ZERO, None);
    }
}

impl CapabilityAccessory for ChargingPlugAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

/// Contact state and fault value for a connector state.
fn contact_state(state: Option<&ConnectionState>) -> (i64, i64) {
    match state {
        None | Some(ConnectionState::Connected) => (CONTACT_DETECTED, NO_FAULT),
        Some(ConnectionState::Disconnected | ConnectionState::Unsupported) => {
            (CONTACT_NOT_DETECTED, NO_FAULT)
        }
        Some(other) => {
            warn!("[ChargingPlug] Unsupported connection state: {:?}", other);
            (CONTACT_NOT_DETECTED, GENERAL_FAULT)
        }
    }
}
