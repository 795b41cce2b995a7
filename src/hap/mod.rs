//! Accessory-host facing model.
//!
//! This module contains the pieces the bridge hands to the accessory host:
//! - `category`: accessory categories
//! - `characteristic`: thread-safe characteristic values with bounds
//! - `service`: services grouping characteristics
//! - `notifier`: live change notification and the `AccessoryHost` seam
//! - `info`: the accessory information service
//! - `setup`: pairing setup codes

pub mod category;
pub mod characteristic;
pub mod info;
pub mod notifier;
pub mod service;
pub mod setup;

pub use category::Category;
pub use characteristic::{CharValue, Characteristic, CharacteristicKind, Properties};
pub use info::AccessoryInfo;
pub use notifier::{AccessoryHost, CharacteristicNotifier, LogHost};
pub use service::{Service, ServiceKind};
