//! Lock mechanism for the central locking.

use super::{
    AccessoryBase, AccessoryContext, CapabilityAccessory, CapabilityKind, observe, on_write,
};
use crate::hap::{CharValue, Characteristic, CharacteristicKind, Service, ServiceKind};
use crate::vehicle::command::LOCK_UNLOCK;
use crate::vehicle::{CommandAction, LockState, ObserverEvent, Subscription, Vehicle};
use log::{error, warn};
use parking_lot::Mutex;
use std::sync::Arc;

pub const UNSECURED: i64 = 0;
pub const SECURED: i64 = 1;
pub const JAMMED: i64 = 2;
pub const UNKNOWN: i64 = 3;

pub struct LockingAccessory {
    base: AccessoryBase,
    vehicle: Arc<Vehicle>,
    services: Vec<Service>,
    current_state: Arc<Characteristic>,
    target_state: Arc<Characteristic>,
    lock_state_lock: Mutex<()>,
    _subscriptions: Vec<Subscription>,
}

impl LockingAccessory {
    pub fn new(ctx: AccessoryContext, vehicle: Arc<Vehicle>) -> Option<Arc<Self>> {
        let doors = vehicle.doors.as_ref()?;

        let accessory = Arc::new_cyclic(|weak| {
            let base = AccessoryBase::new(CapabilityKind::Locking, &ctx);
            let current_state =
                Characteristic::with_value(CharacteristicKind::LockCurrentState, UNKNOWN);
            let target_state = Characteristic::with_value(CharacteristicKind::LockTargetState, SECURED);
            // Out-of-range targets reach the handler and raise the fault.
            target_state.set_allow_invalid_client_values(true);

            let primary = base
                .primary_service(ServiceKind::LockMechanism)
                .with_characteristic(current_state.clone())
                .with_characteristic(target_state.clone());
            let services = vec![base.info_service(), primary];

            on_write(&target_state, weak, Self::on_target_write);
            let subscriptions = vec![observe(
                &doors.lock_state,
                ObserverEvent::ValueChanged,
                weak,
                |this: &Self, attribute| this.apply_lock_state(attribute.value()),
            )];

            Self {
                base,
                vehicle: vehicle.clone(),
                services,
                current_state,
                target_state,
                lock_state_lock: Mutex::new(()),
                _subscriptions: subscriptions,
            }
        });

        accessory.apply_lock_state(doors.lock_state.value());
        Some(accessory)
    }

    pub fn current_state(&self) -> &Arc<Characteristic> {
        &self.current_state
    }

    pub fn target_state(&self) -> &Arc<Characteristic> {
        &self.target_state
    }

    fn apply_lock_state(&self, state: Option<LockState>) {
        let _guard = self.lock_state_lock.lock();
        let (current, target) = lock_states(state.as_ref());
        self.current_state.set_value(current);
        self.target_state.set_value(target);
    }

    fn on_target_write(&self, value: CharValue) {
        let action = match value.as_i64() {
            Some(SECURED) => CommandAction::Lock,
            Some(UNSECURED) => CommandAction::Unlock,
            _ => {
                error!(
                    "[{}] Unknown lock target for {}: {}",
                    self.base.kind(),
                    self.base.key().vin(),
                    value
                );
                self.revert_target();
                self.base.fault().raise_command_fault();
                return;
            }
        };
        let command = self
            .vehicle
            .doors
            .as_ref()
            .and_then(|doors| doors.commands.get(LOCK_UNLOCK));
        if let Err(e) = self.base.run_command(command, action) {
            self.revert_target();
            self.base.report_failure(action, &e);
        }
    }

    /// Reset the target to the state implied by the current lock state.
    fn revert_target(&self) {
        let target = if self.current_state.get_i64() == UNSECURED {
            UNSECURED
        } else {
            SECURED
        };
        self.target_state.set_value(target);
    }
}

impl CapabilityAccessory for LockingAccessory {
    fn base(&self) -> &AccessoryBase {
        &self.base
    }

    fn services(&self) -> &[Service] {
        &self.services
    }
}

/// Current and target lock characteristic values for a lock state.
fn lock_states(state: Option<&LockState>) -> (i64, i64) {
    match state {
        Some(LockState::Locked) => (SECURED, SECURED),
        Some(LockState::Unlocked) => (UNSECURED, UNSECURED),
        None => (UNKNOWN, SECURED),
        Some(LockState::Invalid | LockState::Unknown) => (JAMMED, SECURED),
        Some(LockState::Other(state)) => {
            warn!("[Locking] Unsupported lock state: {}", state);
            (JAMMED, SECURED)
        }
    }
}
