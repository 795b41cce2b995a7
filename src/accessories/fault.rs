//! Transient fault indicator.

use super::timers::TimerSlot;
use crate::hap::{Characteristic, CharacteristicKind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// How long a failed command keeps the fault indicator raised.
pub const COMMAND_FAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub const NO_FAULT: i64 = 0;
pub const GENERAL_FAULT: i64 = 1;

/// Owns the `StatusFault` characteristic and its revert timer.
pub struct FaultReporter {
    characteristic: Arc<Characteristic>,
    revert: TimerSlot,
    /// Value the pending revert timer will restore.
    pending_revert: Arc<Mutex<Option<i64>>>,
}

impl FaultReporter {
    pub fn new(runtime: Handle, shutdown: CancellationToken) -> Self {
        Self {
            characteristic: Characteristic::with_value(CharacteristicKind::StatusFault, NO_FAULT),
            revert: TimerSlot::new(runtime, shutdown),
            pending_revert: Arc::new(Mutex::new(None)),
        }
    }

    pub fn characteristic(&self) -> &Arc<Characteristic> {
        &self.characteristic
    }

    pub fn value(&self) -> i64 {
        self.characteristic.get_i64()
    }

    /// Set the fault indicator to `value`.
    ///
    /// With a non-zero `timeout`, the indicator returns to `revert_value`
    /// afterwards. Without an explicit revert value it returns to the value
    /// shown before the fault; when this call supersedes a pending revert,
    /// that earlier revert value is kept.
    pub fn set_fault(&self, value: i64, timeout: Duration, revert_value: Option<i64>) {
        let mut pending = self.pending_revert.lock();
        if timeout.is_zero() {
            self.revert.cancel();
            *pending = None;
            self.characteristic.set_value(value);
            return;
        }

        let revert_to = revert_value
            .or(*pending)
            .unwrap_or_else(|| self.characteristic.get_i64());
        self.characteristic.set_value(value);
        *pending = Some(revert_to);

        let characteristic = self.characteristic.clone();
        let pending_revert = self.pending_revert.clone();
        self.revert.schedule(timeout, move || {
            *pending_revert.lock() = None;
            characteristic.set_value(revert_to);
        });
    }

    /// Raise the standard command-failure fault.
    pub fn raise_command_fault(&self) {
        self.set_fault(GENERAL_FAULT, COMMAND_FAULT_TIMEOUT, None);
    }

    pub fn is_reverting(&self) -> bool {
        self.revert.is_pending()
    }

    pub fn cancel(&self) {
        self.revert.cancel();
        *self.pending_revert.lock() = None;
    }
}
