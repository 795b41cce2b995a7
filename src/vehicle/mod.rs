//! Vehicle model consumed by the bridge.
//!
//! This is the seam to the vehicle telemetry/control backend:
//! - `observable`: attributes with enabled flag, value and observers
//! - `states`: state enums reported by the backend
//! - `command`: remote commands and their error type
//! - `units`: temperature unit conversion
//! - `model`: the vehicle graph and the garage collection

pub mod command;
pub mod model;
pub mod observable;
pub mod states;
pub mod units;

pub use command::{Command, CommandAction, Commands, SetterError};
pub use model::{
    Charging, ChargingConnector, Climatization, Doors, ElectricDrive, Garage, Vehicle,
    WindowHeatings,
};
pub use observable::{Attribute, ObserverEvent, RegionFlag, Subscription};
pub use states::{
    ChargingState, ClimatizationState, ConnectionState, DriveType, HeatingState, LockState,
};
pub use units::{TemperatureBounds, TemperatureUnit};
