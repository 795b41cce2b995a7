//! Switch for the window heating.

use super::{
    AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe, on_write,
};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::command::START_STOP;
use crate::vehicle::{HeatingState, ObserverEvent, Subscription, Vehicle};
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct WindowHeatingAccessory {
    base: AccessoryBase,
    vehicle: Arc<Vehicle>,
    services: Vec<Service>,
    on: Arc<Characteristic>,
    heating_state_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl WindowHeatingAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let heatings = vehicle.window_heatings.as_ref()?;

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::WindowHeating, &ctx);
            let on = Characteristic::new(CharacteristicKind::On);
            let primary = base
                .primary_service(ServiceKind::Switch)
                .with_characteristic(on.clone());
            let services = vec![base.info_service(), primary];

            on_write(&on, weak, Self::on_switch_write);
            let subscriptions = vec![observe(
                &heatings.heating_state,
                ObserverEvent::ValueChanged,
                weak,
                |this: &Self, attribute| this.apply_heating_state(attribute.value()),
            )];

            Self {
                base,
                vehicle: vehicle.clone(),
                services,
                on,
                heating_state_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_heating_state(heatings.heating_state.value());
        Some(accessory)
    }

    pub fn on(&self) -> &Arc<Characteristic> {
        &self.on
    }

    fn apply_heating_state(&self, state: Option<HeatingState>) {
        let _guard = self.heating_state_lock.lock();
        self.on.set_value(is_heating(state.as_ref()));
    }

    fn on_switch_write(&self, value: CharValue) {
        let Some(action) = self.base.start_stop_action(&value) else {
            return;
        };
        let heatings = self.vehicle.window_heatings.as_ref();
        let command = heatings.and_then(|heatings| heatings.commands.get(START_STOP));
        if let Err(e) = self.base.run_command(command, action) {
            self.base.report_failure(action, &e);
            self.apply_heating_state(heatings.and_then(|heatings| heatings.heating_state.value()));
        }
    }
}

impl CapabilityAccessory for WindowHeatingAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

fn is_heating(state: Option<&HeatingState>) -> bool {
    match state {
        Some(HeatingState::On) => true,
        None
        | Some(
            HeatingState::Off
            | HeatingState::Invalid
            | HeatingState::Unsupported
            | HeatingState::Unknown,
        ) => false,
        Some(HeatingState::Other(state)) => {
            warn!("[WindowHeating] Unsupported heating state: {}", state);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::fault::GENERAL_FAULT;
    use crate::accessories::test_support::{Harness, VIN, recording_handler};
    use crate::vehicle::{Command, CommandAction, DriveType, SetterError, WindowHeatings};

    fn vehicle() -> Arc<Vehicle> {
        Arc::new(Vehicle::new(VIN, DriveType::Hybrid).with_window_heatings(WindowHeatings::new()))
    }

    fn heatings(vehicle: &Vehicle) -> &WindowHeatings {
        vehicle.window_heatings.as_ref().unwrap()
    }

    #[test]
    fn test_heating_mapping() {
        assert!(is_heating(Some(&HeatingState::On)));
        assert!(!is_heating(Some(&HeatingState::Off)));
        assert!(!is_heating(Some(&HeatingState::Invalid)));
        assert!(!is_heating(Some(&HeatingState::Unsupported)));
        assert!(!is_heating(Some(&HeatingState::Unknown)));
        assert!(!is_heating(Some(&HeatingState::Other("rear only".into()))));
        assert!(!is_heating(None));
    }

    #[tokio::test]
    async fn test_switch_follows_and_commands() {
        let harness = Harness::new();
        let vehicle = vehicle();
        let (actions, handler) = recording_handler(Ok(()));
        heatings(&vehicle).commands.add(Command::new(START_STOP, handler));
        let accessory =
            WindowHeatingAccessory::new(harness.context(CapabilityKind::WindowHeating), vehicle.clone())
                .unwrap();

        heatings(&vehicle).heating_state.set_value(HeatingState::On);
        assert!(accessory.on().get_bool());

        accessory.on().client_write(false).unwrap();
        assert_eq!(*actions.lock(), [CommandAction::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_raises_fault() {
        let harness = Harness::new();
        let vehicle = vehicle();
        let (_, handler) = recording_handler(Err(SetterError::Disabled(START_STOP.into())));
        heatings(&vehicle).commands.add(Command::new(START_STOP, handler));
        let accessory =
            WindowHeatingAccessory::new(harness.context(CapabilityKind::WindowHeating), vehicle)
                .unwrap();

        accessory.on().client_write(true).unwrap();
        assert!(!accessory.on().get_bool());
        assert_eq!(accessory.base().fault().value(), GENERAL_FAULT);
    }
}
