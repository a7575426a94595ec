//! ESP32-S3 firmware-specific modules for geiger-rs
//!
//! This crate contains the code that cannot compile on desktop targets: the
//! esp-hal adapters behind the core's hardware seams and the build-time
//! configuration baked in from `.env`.

#![no_std]

pub mod app_state;
