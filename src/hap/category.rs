//! Accessory categories.
//!
//! The category tells the home-automation client which icon and default
//! tile to show. Values follow the HAP accessory category table and are
//! persisted as plain integers in the identity store.

use strum::{Display, FromRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u16)]
pub enum Category {
    Other = 1,
    Bridge = 2,
    Fan = 3,
    GarageDoorOpener = 4,
    Lightbulb = 5,
    DoorLock = 6,
    Outlet = 7,
    Switch = 8,
    Thermostat = 9,
    Sensor = 10,
    AlarmSystem = 11,
    Door = 12,
    Window = 13,
    WindowCovering = 14,
    ProgrammableSwitch = 15,
    RangeExtender = 16,
    Camera = 17,
    VideoDoorbell = 18,
    AirPurifier = 19,
    Heater = 20,
    AirConditioner = 21,
    Humidifier = 22,
    Dehumidifier = 23,
}

impl Category {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Category for a persisted code; unknown codes fall back to `Other`.
    pub fn from_code(code: u16) -> Self {
        Self::from_repr(code).unwrap_or(Self::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Category::Thermostat.code(), 9);
        assert_eq!(Category::AirConditioner.code(), 21);
        assert_eq!(Category::from_code(6), Category::DoorLock);
        assert_eq!(Category::from_code(999), Category::Other);
    }
}
