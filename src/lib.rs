//! CarConnectivity HomeKit bridge library.
//!
//! Exposes the capabilities of connected vehicles (climatization, charging,
//! locking, ...) as smart-home accessories behind a single bridge, keeping
//! accessory identifiers stable across restarts.

pub mod accessories;
pub mod bridge;
pub mod config;
pub mod error;
pub mod hap;
pub mod input;
pub mod instance_lock;
pub mod store;
pub mod vehicle;
