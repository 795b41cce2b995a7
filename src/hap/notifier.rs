//! Characteristic change notifier and the accessory host seam.
//!
//! When a characteristic changes, the host must learn about it immediately
//! so it can push the new value to subscribed clients. Characteristics get a
//! [`CharacteristicNotifier`] once their accessory is installed into the
//! bridge; before that, changes are only recorded locally.

use super::characteristic::{CharValue, CharacteristicKind};
use super::service::ServiceKind;
use log::{debug, info};
use std::sync::Weak;
use std::sync::atomic::{AtomicU32, Ordering};

/// The accessory-protocol stack the bridge registers accessories into.
pub trait AccessoryHost: Send + Sync {
    /// The set of registered accessories changed; the host re-announces
    /// its configuration to paired clients.
    fn config_changed(&self);

    /// A characteristic value changed and should be pushed to subscribers.
    fn characteristic_changed(
        &self,
        aid: u64,
        service: ServiceKind,
        characteristic: CharacteristicKind,
        value: &CharValue,
    );
}

/// Pushes characteristic changes of one service to the host.
///
/// Holds the host weakly: the host owns the bridge, not the other way round.
#[derive(Clone)]
pub struct CharacteristicNotifier {
    host: Weak<dyn AccessoryHost>,
    aid: u64,
    service: ServiceKind,
}

impl CharacteristicNotifier {
    pub fn new(host: Weak<dyn AccessoryHost>, aid: u64, service: ServiceKind) -> Self {
        Self { host, aid, service }
    }

    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Notify that `characteristic` now holds `value`.
    pub fn notify(&self, characteristic: CharacteristicKind, value: &CharValue) {
        if let Some(host) = self.host.upgrade() {
            host.characteristic_changed(self.aid, self.service, characteristic, value);
        }
    }
}

impl std::fmt::Debug for CharacteristicNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacteristicNotifier")
            .field("aid", &self.aid)
            .field("service", &self.service)
            .finish()
    }
}

/// Host that only logs what a network host would announce.
///
/// The configuration number mirrors the `c#` value a HAP host advertises;
/// it is bumped on every [`AccessoryHost::config_changed`].
#[derive(Debug)]
pub struct LogHost {
    config_number: AtomicU32,
}

impl LogHost {
    pub fn new() -> Self {
        Self {
            config_number: AtomicU32::new(1),
        }
    }

    pub fn config_number(&self) -> u32 {
        self.config_number.load(Ordering::SeqCst)
    }
}

impl Default for LogHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessoryHost for LogHost {
    fn config_changed(&self) {
        let number = self.config_number.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[HAP] Accessory configuration changed (c#={})", number);
    }

    fn characteristic_changed(
        &self,
        aid: u64,
        service: ServiceKind,
        characteristic: CharacteristicKind,
        value: &CharValue,
    ) {
        debug!(
            "[HAP] aid={} {}.{} = {}",
            aid, service, characteristic, value
        );
    }
}
