//! Simulated vehicle for development and testing.

mod vehicle;

pub use vehicle::{DEMO_VIN, SIMULATION_INTERVAL, demo_vehicle, run_vehicle_simulation};
