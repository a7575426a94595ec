//! Firmware-specific application state
//!
//! Wraps the esp-hal peripherals in the traits `geiger_core` drives and
//! assembles the deployment configuration.

mod config;
mod hardware;

pub use config::*;
pub use hardware::*;

// Re-export the shared measurement types from geiger-core
pub use geiger_core::*;
