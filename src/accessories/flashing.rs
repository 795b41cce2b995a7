//! Light bulb that flashes the vehicle's lights.
//!
//! Flashing is one-shot: switching on issues the command and the switch
//! turns itself off again after [`FLASH_RESET_DELAY`].

use super::timers::TimerSlot;
use super::{AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, on_write};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::command::HONK_FLASH;
use crate::vehicle::{CommandAction, Vehicle};
use log::error;
use std::sync::Arc;
use std::time::Duration;

pub const FLASH_RESET_DELAY: Duration = Duration::from_secs(10);

pub struct FlashingAccessory {
    base: AccessoryBase,
    vehicle: Arc<Vehicle>,
    services: Vec<Service>,
    on: Arc<Characteristic>,
    reset: TimerSlot,
}

impl FlashingAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::Flashing, &ctx);
            let on = Characteristic::new(CharacteristicKind::On);
            let primary = base
                .primary_service(ServiceKind::Lightbulb)
                .with_characteristic(on.clone());
            let services = vec![base.info_service(), primary];

            on_write(&on, weak, Self::on_switch_write);

            Self {
                base,
                vehicle,
                services,
                on,
                reset: ctx.timer_slot(),
            }
        })
    }

    pub fn on(&self) -> &Arc<Characteristic> {
        &self.on
    }

    pub fn is_resetting(&self) -> bool {
        self.reset.is_pending()
    }

    fn on_switch_write(&self, value: CharValue) {
        if !value.as_bool().unwrap_or_default() {
            error!(
                "[{}] Flashing of {} cannot be stopped",
                self.base.kind(),
                self.base.key().vin()
            );
            return;
        }
        let action = CommandAction::Flash;
        let command = self.vehicle.commands.get(HONK_FLASH);
        match self.base.run_command(command, action) {
            Ok(()) => {
                let on = self.on.clone();
                self.reset.schedule(FLASH_RESET_DELAY, move || {
                    on.set_value(false);
                });
            }
            Err(e) => {
                self.reset.cancel();
                self.on.set_value(false);
                self.base.report_failure(action, &e);
            }
        }
    }
}

impl CapabilityAccessory for FlashingAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }

    fn shutdown(&self) {
        self.base.fault().cancel();
        self.reset.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessories::fault::GENERAL_FAULT;
    use crate::accessories::test_support::{Harness, VIN, recording_handler};
    use crate::vehicle::{Command, DriveType, SetterError};

    fn flashing(
        harness: &Harness,
        result: Result<(), SetterError>,
    ) -> (Arc<FlashingAccessory>, Arc<parking_lot::Mutex<Vec<CommandAction>>>) {
        let vehicle = Vehicle::new(VIN, DriveType::Combustion);
        let (actions, handler) = recording_handler(result);
        vehicle.commands.add(Command::new(HONK_FLASH, handler));
        let accessory =
            FlashingAccessory::new(harness.context(CapabilityKind::Flashing), Arc::new(vehicle));
        (accessory, actions)
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_resets_after_flash() {
        let harness = Harness::new();
        let (accessory, actions) = flashing(&harness, Ok(()));

        accessory.on().client_write(true).unwrap();
        assert_eq!(*actions.lock(), [CommandAction::Flash]);
        assert!(accessory.on().get_bool());
        assert!(accessory.is_resetting());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(accessory.on().get_bool());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!accessory.on().get_bool());
        assert!(!accessory.is_resetting());
    }

    #[tokio::test]
    async fn test_switch_off_is_rejected() {
        let harness = Harness::new();
        let (accessory, actions) = flashing(&harness, Ok(()));

        accessory.on().client_write(false).unwrap();
        assert!(actions.lock().is_empty());
        assert_eq!(accessory.base().fault().value(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flash_resets_switch() {
        let harness = Harness::new();
        let (accessory, _) = flashing(&harness, Err(SetterError::Rejected("asleep".into())));

        accessory.on().client_write(true).unwrap();
        assert!(!accessory.on().get_bool());
        assert!(!accessory.is_resetting());
        assert_eq!(accessory.base().fault().value(), GENERAL_FAULT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_reset() {
        let harness = Harness::new();
        let (accessory, _) = flashing(&harness, Ok(()));

        accessory.on().client_write(true).unwrap();
        harness.shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(accessory.on().get_bool());
    }
}
