//! Forward `GEIGER_*` settings from a `.env` file into the firmware build.
//!
//! The firmware has no filesystem, so deployment overrides are baked in at
//! compile time and read back with `option_env!`.

const KEYS: &[&str] = &[
    "GEIGER_PUMP_PIN",
    "GEIGER_PUMP_PULSE_NS",
    "GEIGER_PUMP_PERIOD_MS",
    "GEIGER_PUMP_ADC",
    "GEIGER_ADC_FULL_SCALE",
    "GEIGER_PUMP_POWER",
    "GEIGER_SENSOR_PIN",
    "GEIGER_SENSOR_TYPE",
    "GEIGER_SENSOR_NUM",
    "GEIGER_SENSOR_TIME",
    "GEIGER_SENSOR_SUM",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    // A missing .env just means the defaults are used
    let from_file: Vec<(String, String)> = match dotenvy::dotenv_iter() {
        Ok(iter) => iter.filter_map(Result::ok).collect(),
        Err(_) => Vec::new(),
    };

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");

        let value = std::env::var(key).ok().or_else(|| {
            from_file
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        });

        if let Some(value) = value {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
