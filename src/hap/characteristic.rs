//! Thread-safe characteristic state.
//!
//! A [`Characteristic`] is the unit the accessory host exposes to paired
//! clients. It can be written from two directions:
//! - accessory side via [`Characteristic::set_value`] (telemetry projection,
//!   timers), which clamps into the advertised bounds
//! - host side via [`Characteristic::client_write`] (user command), which
//!   validates, stores and then invokes the registered setter callback
//!
//! Every accepted change bumps a version counter and, once the accessory is
//! installed, pushes the new value to the host through its notifier.

use super::notifier::CharacteristicNotifier;
use crate::error::{BridgeError, Result};
use log::warn;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use strum::{AsRefStr, Display, EnumString};

/// HomeKit characteristic types used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum CharacteristicKind {
    Name,
    ConfiguredName,
    StatusFault,
    On,
    OutletInUse,
    RemainingDuration,
    Consumption,
    ContactSensorState,
    CurrentTemperature,
    TemperatureDisplayUnits,
    CurrentHeatingCoolingState,
    TargetHeatingCoolingState,
    TargetTemperature,
    LockCurrentState,
    LockTargetState,
    BatteryLevel,
    StatusLowBattery,
    ChargingState,
    Manufacturer,
    Model,
    SerialNumber,
    FirmwareRevision,
    Identify,
}

impl CharacteristicKind {
    /// Value a freshly registered characteristic starts with.
    pub fn default_value(self) -> CharValue {
        match self {
            Self::Name
            | Self::ConfiguredName
            | Self::Manufacturer
            | Self::Model
            | Self::SerialNumber
            | Self::FirmwareRevision => CharValue::Text(String::new()),
            Self::On | Self::OutletInUse | Self::Identify => CharValue::Bool(false),
            Self::TargetTemperature => CharValue::Float(16.0),
            Self::CurrentTemperature | Self::Consumption => CharValue::Float(0.0),
            Self::StatusFault
            | Self::RemainingDuration
            | Self::ContactSensorState
            | Self::TemperatureDisplayUnits
            | Self::CurrentHeatingCoolingState
            | Self::TargetHeatingCoolingState
            | Self::LockCurrentState
            | Self::LockTargetState
            | Self::BatteryLevel
            | Self::StatusLowBattery
            | Self::ChargingState => CharValue::Int(0),
        }
    }

    /// Bounds the protocol defines for this characteristic.
    pub fn default_properties(self) -> Properties {
        match self {
            Self::StatusFault | Self::StatusLowBattery | Self::ContactSensorState => {
                Properties::valid_values([0, 1])
            }
            Self::TemperatureDisplayUnits => Properties::valid_values([0, 1]),
            Self::CurrentHeatingCoolingState => Properties::valid_values([0, 1, 2]),
            Self::TargetHeatingCoolingState => Properties::valid_values([0, 1, 2, 3]),
            Self::LockCurrentState => Properties::valid_values([0, 1, 2, 3]),
            Self::LockTargetState => Properties::valid_values([0, 1]),
            Self::ChargingState => Properties::valid_values([0, 1, 2]),
            Self::BatteryLevel => Properties::range(0.0, 100.0, 1.0),
            Self::RemainingDuration => Properties::range(0.0, 3600.0 * 24.0, 1.0),
            Self::CurrentTemperature => Properties::range(-270.0, 100.0, 0.1),
            Self::TargetTemperature => Properties::range(10.0, 38.0, 0.1),
            _ => Properties::default(),
        }
    }
}

/// A characteristic value as seen by the accessory host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CharValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CharValue {
    /// Integer view; booleans map to 0/1 and floats are rounded.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(value) => Some(i64::from(*value)),
            Self::Int(value) => Some(*value),
            Self::Float(value) => Some(value.round() as i64),
            Self::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Int(value) => Some(*value != 0),
            Self::Float(value) => Some(*value != 0.0),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Convert to the same variant as `template`, if representable.
    fn coerce_like(self, template: &CharValue) -> Option<CharValue> {
        match template {
            Self::Bool(_) => self.as_bool().map(Self::Bool),
            Self::Int(_) => self.as_i64().map(Self::Int),
            Self::Float(_) => self.as_f64().map(Self::Float),
            Self::Text(_) => match self {
                Self::Text(value) => Some(Self::Text(value)),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for CharValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for CharValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CharValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u8> for CharValue {
    fn from(value: u8) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for CharValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CharValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CharValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Value constraints advertised to clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub valid_values: Option<Vec<i64>>,
}

impl Properties {
    pub fn range(min: f64, max: f64, step: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            step: Some(step),
            valid_values: None,
        }
    }

    pub fn valid_values<const N: usize>(values: [i64; N]) -> Self {
        Self {
            valid_values: Some(values.to_vec()),
            ..Self::default()
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }

    fn allows(&self, value: &CharValue) -> bool {
        match (&self.valid_values, value) {
            (Some(valid), CharValue::Int(_) | CharValue::Bool(_) | CharValue::Float(_)) => value
                .as_i64()
                .is_some_and(|value| valid.contains(&value)),
            _ => true,
        }
    }
}

/// Callback invoked after a client write has been stored.
pub type SetterCallback = Arc<dyn Fn(CharValue) + Send + Sync>;

/// Thread-safe characteristic.
pub struct Characteristic {
    kind: CharacteristicKind,
    value: RwLock<CharValue>,
    properties: RwLock<Properties>,
    version: AtomicU32,
    allow_invalid_client_values: AtomicBool,
    setter: RwLock<Option<SetterCallback>>,
    notifier: RwLock<Option<CharacteristicNotifier>>,
}

impl Characteristic {
    /// Create a characteristic with the protocol default value and bounds.
    pub fn new(kind: CharacteristicKind) -> Arc<Self> {
        Self::with_properties(kind, kind.default_value(), kind.default_properties())
    }

    pub fn with_value(kind: CharacteristicKind, value: impl Into<CharValue>) -> Arc<Self> {
        Self::with_properties(kind, value.into(), kind.default_properties())
    }

    pub fn with_properties(
        kind: CharacteristicKind,
        value: CharValue,
        properties: Properties,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            value: RwLock::new(value),
            properties: RwLock::new(properties),
            version: AtomicU32::new(0),
            allow_invalid_client_values: AtomicBool::new(false),
            setter: RwLock::new(None),
            notifier: RwLock::new(None),
        })
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn get(&self) -> CharValue {
        self.value.read().clone()
    }

    pub fn get_i64(&self) -> i64 {
        self.value.read().as_i64().unwrap_or_default()
    }

    pub fn get_f64(&self) -> f64 {
        self.value.read().as_f64().unwrap_or_default()
    }

    pub fn get_bool(&self) -> bool {
        self.value.read().as_bool().unwrap_or_default()
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn properties(&self) -> Properties {
        self.properties.read().clone()
    }

    /// Replace the advertised bounds (e.g. after a display unit change).
    pub fn set_properties(&self, properties: Properties) {
        *self.properties.write() = properties;
    }

    /// Accept client values outside the valid-value list; the setter
    /// callback then decides how to react.
    pub fn set_allow_invalid_client_values(&self, allow: bool) {
        self.allow_invalid_client_values
            .store(allow, Ordering::SeqCst);
    }

    /// Register the callback for inbound client writes.
    pub fn on_write(&self, callback: SetterCallback) {
        *self.setter.write() = Some(callback);
    }

    pub fn set_notifier(&self, notifier: CharacteristicNotifier) {
        *self.notifier.write() = Some(notifier);
    }

    /// Accessory-side update. Returns `true` if the stored value changed.
    ///
    /// Numeric values are clamped into the advertised range; values outside
    /// the valid-value list are dropped with a warning.
    pub fn set_value(&self, value: impl Into<CharValue>) -> bool {
        let value = value.into();
        let Some(value) = value.clone().coerce_like(&self.get()) else {
            warn!(
                "[HAP] Ignoring value {} of wrong type for {}",
                value, self.kind
            );
            return false;
        };
        let value = {
            let properties = self.properties.read();
            if !properties.allows(&value) {
                warn!(
                    "[HAP] Ignoring invalid value {} for {}",
                    value, self.kind
                );
                return false;
            }
            match value {
                CharValue::Float(v) => CharValue::Float(properties.clamp(v)),
                CharValue::Int(v) if properties.min.is_some() || properties.max.is_some() => {
                    CharValue::Int(properties.clamp(v as f64).round() as i64)
                }
                other => other,
            }
        };
        self.store(value)
    }

    /// Host-side write from a paired client.
    ///
    /// The value is stored first, then the setter callback runs with no
    /// lock held so it may write this characteristic again.
    pub fn client_write(&self, value: impl Into<CharValue>) -> Result<()> {
        let value = value.into();
        let invalid = || BridgeError::InvalidValue {
            characteristic: self.kind.to_string(),
            value: value.to_string(),
        };
        let accepted = self.properties.read().allows(&value)
            || self.allow_invalid_client_values.load(Ordering::SeqCst);
        if !accepted {
            return Err(invalid());
        }
        let Some(value) = value.clone().coerce_like(&self.get()) else {
            return Err(invalid());
        };
        self.store(value.clone());
        let setter = self.setter.read().clone();
        if let Some(setter) = setter {
            setter(value);
        }
        Ok(())
    }

    fn store(&self, value: CharValue) -> bool {
        let changed = {
            let mut current = self.value.write();
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        };
        if changed {
            self.version.fetch_add(1, Ordering::SeqCst);
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.notify(self.kind, &value);
            }
        }
        changed
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("kind", &self.kind)
            .field("value", &*self.value.read())
            .field("version", &self.version())
            .finish()
    }
}
