//! State enums reported by the vehicle backend.
//!
//! Backends report states as strings. Each enum parses them with
//! [`std::str::FromStr`] and keeps an explicit `Unknown` sentinel plus an
//! `Other` catch-all, so a value the bridge has never seen still produces a
//! defined state instead of a parse failure.

use strum::EnumString;

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ClimatizationState {
    Off,
    Heating,
    Cooling,
    #[strum(serialize = "ventilation", serialize = "ventilating")]
    Ventilation,
    Unknown,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChargingState {
    Off,
    ReadyForCharging,
    Charging,
    Discharging,
    Conservation,
    Error,
    Unsupported,
    Unknown,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Invalid,
    Unsupported,
    Unknown,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LockState {
    Locked,
    Unlocked,
    Invalid,
    Unknown,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum HeatingState {
    On,
    Off,
    Invalid,
    Unsupported,
    Unknown,
    #[strum(default)]
    Other(String),
}

/// Drivetrain of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DriveType {
    Electric,
    /// Plug-in hybrid: has both a combustion engine and a chargeable battery.
    Hybrid,
    Combustion,
    Unknown,
}

impl DriveType {
    /// Whether the vehicle has a chargeable traction battery.
    pub fn is_electric_capable(self) -> bool {
        matches!(self, Self::Electric | Self::Hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_states() {
        assert_eq!(
            "ready_for_charging".parse::<ChargingState>(),
            Ok(ChargingState::ReadyForCharging)
        );
        assert_eq!("LOCKED".parse::<LockState>(), Ok(LockState::Locked));
        assert_eq!(
            "ventilating".parse::<ClimatizationState>(),
            Ok(ClimatizationState::Ventilation)
        );
    }

    #[test]
    fn test_unrecognised_states_fall_back_to_other() {
        assert_eq!(
            "half_open".parse::<LockState>(),
            Ok(LockState::Other("half_open".into()))
        );
        assert_eq!(
            "defrosting".parse::<HeatingState>(),
            Ok(HeatingState::Other("defrosting".into()))
        );
    }

    #[test]
    fn test_electric_capability() {
        assert!(DriveType::Electric.is_electric_capable());
        assert!(DriveType::Hybrid.is_electric_capable());
        assert!(!DriveType::Combustion.is_electric_capable());
        assert!(!DriveType::Unknown.is_electric_capable());
    }
}
