//! Deployment configuration for the meter
//!
//! Every constant the measurement core consumes lives in [`MeterConfig`]. The
//! defaults reproduce the reference board: an SBM-20 tube on GPIO5 and the
//! high-voltage pump transistor on GPIO4, sampled over 36 second windows and
//! averaged across the last 10 of them.
//!
//! Overrides arrive as `KEY=value` pairs (a `.env` file at firmware build time,
//! process environment in the simulator) and are applied through
//! [`MeterConfig::apply_override`].

use core::str::FromStr;

use embassy_time::Duration;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Number of finished windows kept in the rolling average.
///
/// This is the const generic depth of [`PulseHistory`](crate::aggregator::PulseHistory);
/// the runtime `history_depth` must agree with it.
pub const SENSOR_SUM: usize = 10;

/// Upper bound on a single pump pulse. The pulse is a spin on some targets and
/// must stay far below the 5 ms pump period.
pub const MAX_PUMP_PULSE_NS: u32 = 100_000;

/// Prefix for override keys coming from `.env` files and the environment.
pub const OVERRIDE_PREFIX: &str = "GEIGER_";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown configuration key")]
    UnknownKey,
    #[error("Invalid value for {key}")]
    InvalidValue { key: &'static str },
    #[error("{field} out of range: {details}")]
    OutOfRange {
        field: &'static str,
        details: &'static str,
    },
}

/// High-voltage pump settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// GPIO driving the pump transistor
    pub pin: u8,
    /// Width of one drive pulse in nanoseconds
    pub pulse_ns: u32,
    /// Regulation tick period in milliseconds
    pub period_ms: u32,
    /// Supply value represented by the divider at ADC full scale (`PUMPING_ADC`)
    pub adc_reference: u16,
    /// ADC full-scale count
    pub adc_full_scale: u16,
    /// Safety ceiling for the derived supply value (`PUMPING_POWER`)
    pub supply_ceiling: u16,
}

/// Tube and sampling settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorConfig {
    /// GPIO wired to the tube's pulse output
    pub pin: u8,
    /// Calibration curve selector: 1 = SBM-20/STS-5/BOI-33, 2 = SBM-19/STS-6
    pub tube_profile: u8,
    /// Tubes wired in parallel on the same input
    pub tube_count: u8,
    /// Length of one sampling window in seconds
    pub window_secs: u32,
    /// Number of windows averaged
    pub history_depth: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterConfig {
    pub pump: PumpConfig,
    pub sensor: SensorConfig,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl MeterConfig {
    pub const DEFAULT: Self = Self {
        pump: PumpConfig {
            pin: 4,
            pulse_ns: 2_500,
            period_ms: 5,
            adc_reference: 450,
            adc_full_scale: 1024,
            supply_ceiling: 400,
        },
        sensor: SensorConfig {
            pin: 5,
            tube_profile: 1,
            tube_count: 1,
            window_secs: 36,
            history_depth: SENSOR_SUM,
        },
    };

    /// Period of the voltage regulation tick
    pub fn pump_period(&self) -> Duration {
        Duration::from_millis(self.pump.period_ms as u64)
    }

    /// Period of the window aggregation tick
    pub const fn aggregation_period(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Check every field against the limits the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pump = &self.pump;
        let sensor = &self.sensor;

        if pump.period_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "pump.period_ms",
                details: "must be at least 1",
            });
        }
        if pump.pulse_ns == 0 || pump.pulse_ns > MAX_PUMP_PULSE_NS {
            return Err(ConfigError::OutOfRange {
                field: "pump.pulse_ns",
                details: "must be between 1 and 100000",
            });
        }
        if pump.adc_reference == 0 || pump.adc_reference > pump.adc_full_scale {
            return Err(ConfigError::OutOfRange {
                field: "pump.adc_reference",
                details: "must be between 1 and the ADC full scale",
            });
        }
        if sensor.tube_count == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sensor.tube_count",
                details: "at least one tube is required",
            });
        }
        if sensor.window_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sensor.window_secs",
                details: "must be at least 1",
            });
        }
        if sensor.history_depth == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sensor.history_depth",
                details: "must be at least 1",
            });
        }
        if sensor.history_depth != SENSOR_SUM {
            return Err(ConfigError::OutOfRange {
                field: "sensor.history_depth",
                details: "must match the compiled history depth",
            });
        }

        Ok(())
    }

    /// Apply a single `KEY=value` override.
    ///
    /// Keys may carry the [`OVERRIDE_PREFIX`]. Values are parsed but not
    /// range-checked here; call [`validate`](Self::validate) once all
    /// overrides are in.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.strip_prefix(OVERRIDE_PREFIX).unwrap_or(key);
        let value = value.trim();

        match key {
            "PUMP_PIN" => self.pump.pin = parse("PUMP_PIN", value)?,
            "PUMP_PULSE_NS" => self.pump.pulse_ns = parse("PUMP_PULSE_NS", value)?,
            "PUMP_PERIOD_MS" => self.pump.period_ms = parse("PUMP_PERIOD_MS", value)?,
            "PUMP_ADC" => self.pump.adc_reference = parse("PUMP_ADC", value)?,
            "ADC_FULL_SCALE" => self.pump.adc_full_scale = parse("ADC_FULL_SCALE", value)?,
            "PUMP_POWER" => self.pump.supply_ceiling = parse("PUMP_POWER", value)?,
            "SENSOR_PIN" => self.sensor.pin = parse("SENSOR_PIN", value)?,
            "SENSOR_TYPE" => self.sensor.tube_profile = parse("SENSOR_TYPE", value)?,
            "SENSOR_NUM" => self.sensor.tube_count = parse("SENSOR_NUM", value)?,
            "SENSOR_TIME" => self.sensor.window_secs = parse("SENSOR_TIME", value)?,
            "SENSOR_SUM" => self.sensor.history_depth = parse("SENSOR_SUM", value)?,
            _ => {
                warn!("Ignoring unknown configuration key {}", key);
                return Err(ConfigError::UnknownKey);
            }
        }

        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| {
        warn!("Could not parse {}={}", key, value);
        ConfigError::InvalidValue { key }
    })
}
