//! Vehicle data sources for the bridge.
//!
//! - `simulation`: a demo vehicle with simulated telemetry, used by the
//!   binary when no vehicle backend is wired in

pub mod simulation;
