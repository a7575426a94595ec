//! Hardware-independent measurement core for geiger-rs
//!
//! This crate holds everything between the tube and the published numbers:
//! pulse counting, high-voltage pump regulation, tube calibration, window
//! aggregation with a rolling average, and the serial line format.
//!
//! It is `#![no_std]` and allocation-free so it compiles on the ESP32-S3
//! firmware and on desktop hosts (for the simulator and tests).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod aggregator;
pub mod calibration;
pub mod config;
pub mod error;
pub mod pulse_counter;
pub mod readings;
pub mod regulator;
pub mod serial;

pub use aggregator::{WindowAggregator, WindowChannel, WindowPhase, WindowReport};
pub use calibration::{Calibration, TubeProfile, calibrate};
pub use config::{MeterConfig, SENSOR_SUM};
pub use error::MeterError;
pub use pulse_counter::{EdgeAck, PulseCounter};
pub use readings::{MeterReadings, SharedReadings, StatusSnapshot};
pub use regulator::{PumpTick, SpinDelay, SupplySense, VoltageRegulator};
