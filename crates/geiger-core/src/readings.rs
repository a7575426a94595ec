//! Published meter values
//!
//! The regulator writes the supply voltage, the aggregator writes the
//! dose-rate and accuracy. Everything else (serial output, status page,
//! simulator) only reads. All values sit behind one blocking mutex so a reader
//! always sees a consistent set.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::aggregator::WindowReport;
use crate::pulse_counter::PulseCounter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterReadings {
    /// Latest derived supply value from the regulator
    pub supply_voltage: u16,
    /// Rolling-average dose rate in µR/h, `None` until the first window closes
    pub dose_rate: Option<u32>,
    pub accuracy_percent: u8,
    pub windows_completed: u32,
    /// Raw edges counted in the last closed window
    pub last_window_edges: u32,
}

impl MeterReadings {
    pub const ZERO: Self = Self {
        supply_voltage: 0,
        dose_rate: None,
        accuracy_percent: 0,
        windows_completed: 0,
        last_window_edges: 0,
    };
}

/// The four values shown on the status fragment.
///
/// Formatting and markup belong to whoever renders it; `dose_rate` is `None`
/// where the fragment shows "N/A".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub supply_voltage: u16,
    /// Pulses in the running window (edges halved)
    pub pulses: u32,
    pub dose_rate: Option<u32>,
    pub accuracy_percent: u8,
}

pub struct SharedReadings {
    inner: Mutex<CriticalSectionRawMutex, Cell<MeterReadings>>,
}

impl Default for SharedReadings {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedReadings {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(MeterReadings::ZERO)),
        }
    }

    pub fn get(&self) -> MeterReadings {
        self.inner.lock(|readings| readings.get())
    }

    fn update(&self, f: impl FnOnce(&mut MeterReadings)) {
        self.inner.lock(|cell| {
            let mut readings = cell.get();
            f(&mut readings);
            cell.set(readings);
        });
    }

    pub fn record_supply(&self, supply_voltage: u16) {
        self.update(|r| r.supply_voltage = supply_voltage);
    }

    pub fn record_window(&self, report: &WindowReport) {
        self.update(|r| {
            r.dose_rate = Some(report.dose_rate);
            r.accuracy_percent = report.accuracy_percent;
            r.windows_completed = report.windows_completed;
            r.last_window_edges = report.edges;
        });
    }

    /// Snapshot for the status fragment, using the live edge count of the
    /// window still being accumulated.
    pub fn status(&self, counter: &PulseCounter) -> StatusSnapshot {
        let readings = self.get();
        StatusSnapshot {
            supply_voltage: readings.supply_voltage,
            pulses: counter.peek() / 2,
            dose_rate: readings.dose_rate,
            accuracy_percent: readings.accuracy_percent,
        }
    }
}
