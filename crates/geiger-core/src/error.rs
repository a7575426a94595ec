//! Crate-level error type
//!
//! The measurement loop itself never fails; these cover bring-up (bad
//! configuration, channel slots) and the hardware seams of the regulator.

use thiserror_no_std::Error;

use crate::config::ConfigError;
use crate::regulator::RegulatorError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Regulator error: {0}")]
    Regulator(#[from] RegulatorError),
    #[error("Window channel has no free publisher or subscriber slot")]
    ChannelExhausted,
}
