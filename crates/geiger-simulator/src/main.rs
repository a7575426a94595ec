//! Desktop simulator for the geiger-rs radiation meter.
//!
//! Wires `geiger-core` the same way the firmware does, with the hardware
//! swapped for models: a high-voltage supply that charges on each pump pulse
//! and leaks every tick, and a tube that clicks at a configurable background
//! rate. Time runs accelerated.
//!
//! Serial report lines go to stdout; everything else is logged through
//! `env_logger` (set `RUST_LOG=debug` for per-window detail).
//!
//! # Settings
//!
//! | Variable            | Default | Meaning                                   |
//! |---------------------|---------|-------------------------------------------|
//! | `GEIGER_*`          |         | Meter overrides, same keys as the firmware |
//! | `SIM_PULSE_RATE`    | 10      | Tube pulses per second                    |
//! | `SIM_DURATION_SECS` | 1800    | Simulated run length                      |
//! | `SIM_SPEEDUP`       | 120     | Simulated seconds per wall second, 0 = unpaced |

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use log::{debug, error, info, warn};

use geiger_core::aggregator::WindowChannel;
use geiger_core::config::OVERRIDE_PREFIX;
use geiger_core::serial::{STARTUP_LINE, window_line};
use geiger_core::{
    EdgeAck, MeterConfig, MeterError, PulseCounter, SENSOR_SUM, SharedReadings, SupplySense,
    VoltageRegulator, WindowAggregator, WindowPhase,
};

/// Divider counts added by one pump pulse.
const CHARGE_PER_PULSE: f32 = 12.0;

/// Fraction of the divider reading lost every pump tick.
const LEAK_PER_TICK: f32 = 0.005;

/// Simulated seconds between status snapshots.
const STATUS_EVERY_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct SimSettings {
    pulse_rate: f64,
    duration_secs: u64,
    speedup: u32,
}

impl SimSettings {
    fn from_env() -> Self {
        Self {
            pulse_rate: env_or("SIM_PULSE_RATE", 10.0),
            duration_secs: env_or("SIM_DURATION_SECS", 1800),
            speedup: env_or("SIM_SPEEDUP", 120),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Could not parse {}={}, using default", key, value);
            default
        }),
        Err(_) => default,
    }
}

/// Defaults layered with every `GEIGER_*` variable in the environment.
fn load_config() -> Result<MeterConfig, MeterError> {
    let mut config = MeterConfig::DEFAULT;

    for (key, value) in std::env::vars().filter(|(k, _)| k.starts_with(OVERRIDE_PREFIX)) {
        match config.apply_override(&key, &value) {
            Ok(()) => info!("Config override {}={}", key, value),
            Err(e) => warn!("Ignoring override {}: {}", key, e),
        }
    }

    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Hardware models
// ---------------------------------------------------------------------------

/// Divider reading of the high-voltage rail, in raw ADC counts.
struct HvSupply {
    raw: Cell<f32>,
    full_scale: f32,
    pulses: Cell<u64>,
}

impl HvSupply {
    fn new(full_scale: u16) -> Self {
        Self {
            raw: Cell::new(0.0),
            full_scale: f32::from(full_scale) - 1.0,
            pulses: Cell::new(0),
        }
    }

    fn charge(&self) {
        self.raw
            .set((self.raw.get() + CHARGE_PER_PULSE).min(self.full_scale));
        self.pulses.set(self.pulses.get() + 1);
    }

    fn leak(&self) {
        self.raw.set(self.raw.get() * (1.0 - LEAK_PER_TICK));
    }
}

struct Divider(Rc<HvSupply>);

impl SupplySense for Divider {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Infallible> {
        Ok(self.0.raw.get() as u16)
    }
}

/// Pump transistor: the rising edge of each drive pulse charges the rail.
struct PumpDrive {
    supply: Rc<HvSupply>,
    high: bool,
}

impl ErrorType for PumpDrive {
    type Error = Infallible;
}

impl OutputPin for PumpDrive {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        if !self.high {
            self.supply.charge();
        }
        self.high = true;
        Ok(())
    }
}

/// Pulse width is irrelevant to the model.
struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Stand-in for the GPIO interrupt line.
#[derive(Default)]
struct TubeLine {
    acknowledged: u64,
}

impl EdgeAck for TubeLine {
    fn acknowledge(&mut self) {
        self.acknowledged += 1;
    }
}

/// Deterministic tube clicks at a mean rate (linear congruential generator).
struct MockTube {
    state: u64,
    pulses_per_tick: f64,
}

impl MockTube {
    fn new(pulse_rate: f64, tick: Duration) -> Self {
        Self {
            state: 0x2545_F491_4F6C_DD1D,
            pulses_per_tick: pulse_rate.max(0.0) * tick.as_secs_f64(),
        }
    }

    fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Pulses that occur during one pump tick.
    fn pulses(&mut self) -> u32 {
        let whole = self.pulses_per_tick.floor();
        let extra = u32::from(self.uniform() < self.pulses_per_tick - whole);
        whole as u32 + extra
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();
    info!("Starting geiger-rs simulator");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    let settings = SimSettings::from_env();

    if let Err(e) = run(&config, &settings) {
        error!("Simulation stopped: {}", e);
    }

    info!("Simulator exiting");
}

fn run(config: &MeterConfig, settings: &SimSettings) -> Result<(), MeterError> {
    let pump_period = Duration::from_millis(u64::from(config.pump.period_ms));
    let ticks_per_second = (1000 / config.pump.period_ms).max(1);

    info!(
        "Tube profile {}, {} tube(s), {} s windows, {:.1} pulses/s, {} s at {}x",
        config.sensor.tube_profile,
        config.sensor.tube_count,
        config.sensor.window_secs,
        settings.pulse_rate,
        settings.duration_secs,
        settings.speedup
    );

    let counter = PulseCounter::new();
    let readings = SharedReadings::new();
    let channel = WindowChannel::new();

    let supply = Rc::new(HvSupply::new(config.pump.adc_full_scale));
    let mut regulator = VoltageRegulator::new(
        Divider(Rc::clone(&supply)),
        PumpDrive {
            supply: Rc::clone(&supply),
            high: false,
        },
        NoDelay,
        &config.pump,
    )?;
    let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&config.sensor, &channel)?;
    let mut reports = channel
        .subscriber()
        .map_err(|_| MeterError::ChannelExhausted)?;

    let mut tube = MockTube::new(settings.pulse_rate, pump_period);
    let mut line = TubeLine::default();

    print!("{}", STARTUP_LINE);

    for second in 1..=settings.duration_secs {
        for _ in 0..ticks_per_second {
            for _ in 0..tube.pulses() {
                // Rising and falling edge
                counter.on_edge(&mut line);
                counter.on_edge(&mut line);
            }
            regulator.tick(&readings)?;
            supply.leak();
        }

        if let WindowPhase::Finalized(report) = aggregator.tick(&counter, &readings) {
            debug!(
                "Window {}: {} edges, sample {} uR/h, history {:?}",
                report.windows_completed,
                report.edges,
                report.sample,
                aggregator.history().as_slice()
            );
        }

        while let Some(report) = reports.try_next_message_pure() {
            print!("{}", window_line(&report));
        }

        if second % STATUS_EVERY_SECS == 0 {
            let status = readings.status(&counter);
            let dose = match status.dose_rate {
                Some(dose) => format!("{} uR/h ({}%)", dose, status.accuracy_percent),
                None => "N/A".to_string(),
            };
            info!(
                "t={}s | {} V | {} pulses | {} | {} pump pulses",
                second,
                status.supply_voltage,
                status.pulses,
                dose,
                supply.pulses.get()
            );
        }

        if settings.speedup > 0 {
            std::thread::sleep(Duration::from_secs(1) / settings.speedup);
        }
    }

    info!("{} edges acknowledged", line.acknowledged);
    Ok(())
}
