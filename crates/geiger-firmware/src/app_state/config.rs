//! Build-time configuration
//!
//! `build.rs` forwards any `GEIGER_*` key found in `.env` (or the build
//! environment) as a compile-time variable; they are layered over
//! [`MeterConfig::DEFAULT`] here.

use geiger_core::MeterConfig;
use log::{info, warn};

const BAKED_OVERRIDES: &[(&str, Option<&str>)] = &[
    ("GEIGER_PUMP_PIN", option_env!("GEIGER_PUMP_PIN")),
    ("GEIGER_PUMP_PULSE_NS", option_env!("GEIGER_PUMP_PULSE_NS")),
    ("GEIGER_PUMP_PERIOD_MS", option_env!("GEIGER_PUMP_PERIOD_MS")),
    ("GEIGER_PUMP_ADC", option_env!("GEIGER_PUMP_ADC")),
    ("GEIGER_ADC_FULL_SCALE", option_env!("GEIGER_ADC_FULL_SCALE")),
    ("GEIGER_PUMP_POWER", option_env!("GEIGER_PUMP_POWER")),
    ("GEIGER_SENSOR_PIN", option_env!("GEIGER_SENSOR_PIN")),
    ("GEIGER_SENSOR_TYPE", option_env!("GEIGER_SENSOR_TYPE")),
    ("GEIGER_SENSOR_NUM", option_env!("GEIGER_SENSOR_NUM")),
    ("GEIGER_SENSOR_TIME", option_env!("GEIGER_SENSOR_TIME")),
    ("GEIGER_SENSOR_SUM", option_env!("GEIGER_SENSOR_SUM")),
];

/// Defaults plus baked overrides. An override set that does not validate is
/// discarded as a whole.
pub fn load_config() -> MeterConfig {
    let mut config = MeterConfig::DEFAULT;

    for (key, value) in BAKED_OVERRIDES {
        let Some(value) = value else { continue };
        match config.apply_override(key, value) {
            Ok(()) => info!("Config override {}={}", key, value),
            Err(e) => warn!("Ignoring override {}: {}", key, e),
        }
    }

    if let Err(e) = config.validate() {
        warn!("Configuration rejected ({}), using defaults", e);
        return MeterConfig::DEFAULT;
    }

    config
}
