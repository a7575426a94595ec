//! High-voltage pump regulation
//!
//! A bang-bang controller: every tick the supply is sampled through the
//! divider, and if it sits below the ceiling the pump transistor gets one short
//! pulse. There is no loop filter and no PID. The drive output is never
//! asserted while the sampled supply is at or above the ceiling.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::error;
use thiserror_no_std::Error;

use crate::config::PumpConfig;
use crate::readings::SharedReadings;

/// Approximate CPU cycles consumed by one iteration of the [`SpinDelay`] loop.
pub const CYCLES_PER_SPIN: u32 = 4;

/// Raw analog sample of the high-voltage divider.
///
/// `embedded-hal` 1.0 has no ADC trait, so the firmware adapts its one-shot
/// ADC read to this.
pub trait SupplySense {
    type Error: core::fmt::Debug;

    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulatorError {
    #[error("Supply sense read failed")]
    Sense,
    #[error("Pump drive failed to {operation}")]
    Drive { operation: &'static str },
}

/// Integer scaling from raw ADC counts to the supply value compared against
/// the ceiling: `(raw + 1) / (full_scale / reference)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoltageScale {
    divisor: u16,
}

impl VoltageScale {
    pub fn new(adc_full_scale: u16, adc_reference: u16) -> Self {
        let divisor = adc_full_scale
            .checked_div(adc_reference)
            .unwrap_or(1)
            .max(1);
        Self { divisor }
    }

    pub fn from_config(pump: &PumpConfig) -> Self {
        Self::new(pump.adc_full_scale, pump.adc_reference)
    }

    pub fn to_supply(self, raw: u16) -> u16 {
        raw.saturating_add(1) / self.divisor
    }

    pub fn divisor(self) -> u16 {
        self.divisor
    }
}

/// What one regulation tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpTick {
    /// Supply was below the ceiling and the pump was pulsed
    Pulsed { supply: u16 },
    /// Supply was at or above the ceiling; output left low
    Holding { supply: u16 },
}

impl PumpTick {
    pub fn supply(self) -> u16 {
        match self {
            Self::Pulsed { supply } | Self::Holding { supply } => supply,
        }
    }

    pub fn pulsed(self) -> bool {
        matches!(self, Self::Pulsed { .. })
    }
}

pub struct VoltageRegulator<S, P, D> {
    sense: S,
    drive: P,
    delay: D,
    scale: VoltageScale,
    ceiling: u16,
    pulse_ns: u32,
}

impl<S, P, D> VoltageRegulator<S, P, D>
where
    S: SupplySense,
    P: OutputPin,
    D: DelayNs,
{
    /// Build a regulator and force the drive output low.
    pub fn new(
        sense: S,
        mut drive: P,
        delay: D,
        pump: &PumpConfig,
    ) -> Result<Self, RegulatorError> {
        drive.set_low().map_err(|e| {
            error!("Pump drive could not be parked low: {:?}", e);
            RegulatorError::Drive {
                operation: "park low",
            }
        })?;

        Ok(Self {
            sense,
            drive,
            delay,
            scale: VoltageScale::from_config(pump),
            ceiling: pump.supply_ceiling,
            pulse_ns: pump.pulse_ns,
        })
    }

    /// Run one regulation tick and publish the sampled supply.
    pub fn tick(&mut self, readings: &SharedReadings) -> Result<PumpTick, RegulatorError> {
        let raw = self.sense.read_raw().map_err(|e| {
            error!("Supply sense read failed: {:?}", e);
            RegulatorError::Sense
        })?;

        let supply = self.scale.to_supply(raw);
        readings.record_supply(supply);

        if supply >= self.ceiling {
            return Ok(PumpTick::Holding { supply });
        }

        self.fire_pulse()?;
        Ok(PumpTick::Pulsed { supply })
    }

    fn fire_pulse(&mut self) -> Result<(), RegulatorError> {
        if let Err(e) = self.drive.set_high() {
            error!("Pump drive could not be asserted: {:?}", e);
            // Leave the transistor off even if the assert half-happened
            let _ = self.drive.set_low();
            return Err(RegulatorError::Drive {
                operation: "assert",
            });
        }

        self.delay.delay_ns(self.pulse_ns);

        self.drive.set_low().map_err(|e| {
            error!("Pump drive could not be released: {:?}", e);
            RegulatorError::Drive {
                operation: "release",
            }
        })
    }

    pub fn scale(&self) -> VoltageScale {
        self.scale
    }
}

/// Busy-wait [`DelayNs`] for targets without a spare hardware timer.
///
/// Loop length is derived from the CPU clock and [`CYCLES_PER_SPIN`], so it
/// is only as accurate as that estimate. Keep it to sub-10 µs pulses.
#[derive(Debug, Clone, Copy)]
pub struct SpinDelay {
    cpu_hz: u32,
}

impl SpinDelay {
    pub const fn new(cpu_hz: u32) -> Self {
        Self { cpu_hz }
    }

    pub fn spins_for(&self, ns: u32) -> u32 {
        let cycles = u64::from(ns) * u64::from(self.cpu_hz) / 1_000_000_000;
        (cycles / u64::from(CYCLES_PER_SPIN)) as u32
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        for _ in 0..self.spins_for(ns) {
            core::hint::spin_loop();
        }
    }
}
