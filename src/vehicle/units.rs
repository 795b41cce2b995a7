//! Unit handling for temperatures.
//!
//! The vehicle model stores every temperature in degrees Celsius; the
//! accessories convert on the way in and out according to the display unit
//! the user picked in the home-automation client.

use strum::FromRepr;

/// Temperature display unit, encoded the way HomeKit's
/// `TemperatureDisplayUnits` characteristic encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromRepr)]
#[repr(u8)]
pub enum TemperatureUnit {
    #[default]
    Celsius = 0,
    Fahrenheit = 1,
}

impl TemperatureUnit {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Convert a Celsius value into this unit.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// Convert a value expressed in this unit back to Celsius.
    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            Self::Celsius => value,
            Self::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }
}

/// Allowed range for a settable temperature, in Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl TemperatureBounds {
    pub const DEFAULT_CELSIUS: Self = Self {
        min: 16.0,
        max: 29.5,
        step: 0.5,
    };

    pub const DEFAULT_FAHRENHEIT: Self = Self {
        min: 61.0,
        max: 85.0,
        step: 1.0,
    };

    /// Bounds to advertise for `unit`.
    ///
    /// Model bounds (Celsius) are converted when present; otherwise the
    /// per-unit defaults apply.
    pub fn for_unit(model: Option<Self>, unit: TemperatureUnit) -> Self {
        match (model, unit) {
            (Some(bounds), TemperatureUnit::Celsius) => bounds,
            (Some(bounds), TemperatureUnit::Fahrenheit) => Self {
                min: unit.from_celsius(bounds.min).floor(),
                max: unit.from_celsius(bounds.max).ceil(),
                step: 1.0,
            },
            (None, TemperatureUnit::Celsius) => Self::DEFAULT_CELSIUS,
            (None, TemperatureUnit::Fahrenheit) => Self::DEFAULT_FAHRENHEIT,
        }
    }
}
