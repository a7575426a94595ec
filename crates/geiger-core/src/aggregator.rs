//! Window aggregation and rolling average
//!
//! The aggregator is ticked once per second. Every `window_secs` ticks it
//! closes a window: the edge count is taken from the [`PulseCounter`],
//! converted to counts-per-second, calibrated, and pushed into a fixed-depth
//! history. The published dose rate is the rounded mean of the populated part
//! of that history, and the accuracy tracks how much of it is populated.
//!
//! Finished windows are published as [`WindowReport`] events so the serial
//! writer (and anything else) can react without polling.
//!
//! ## Usage
//!
//! ```rust,ignore
//! static WINDOWS: WindowChannel = PubSubChannel::new();
//!
//! let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&config.sensor, &WINDOWS)?;
//!
//! // Once per second
//! aggregator.tick(&PULSES, &READINGS);
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};
use log::{debug, error, info};

use crate::calibration::Calibration;
use crate::config::{ConfigError, SensorConfig};
use crate::error::MeterError;
use crate::pulse_counter::PulseCounter;
use crate::readings::SharedReadings;

/// Window events kept for lagging subscribers
pub const EVENT_CHANNEL_CAPACITY: usize = 4;

/// - Subscriber 0: serial line writer
/// - Subscriber 1: status / diagnostics
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Only the aggregator publishes
pub const EVENT_PUBLISHERS: usize = 1;

pub type WindowChannel = PubSubChannel<
    CriticalSectionRawMutex,
    WindowReport,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type WindowPublisher<'a> = Publisher<
    'a,
    CriticalSectionRawMutex,
    WindowReport,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type WindowSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    WindowReport,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

/// Result of one closed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReport {
    /// Windows closed since boot, including this one
    pub windows_completed: u32,
    /// Raw edges counted during this window
    pub edges: u32,
    /// Calibrated dose rate of this window alone (µR/h)
    pub sample: u32,
    /// Rolling-average dose rate (µR/h)
    pub dose_rate: u32,
    pub accuracy_percent: u8,
}

/// Outcome of a one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    /// Still inside the window; `elapsed_secs` since it opened
    Accumulating { elapsed_secs: u32 },
    /// The window just closed and its values were published
    Finalized(WindowReport),
}

/// The last `N` per-window dose rates, oldest first.
///
/// Always exactly `N` long; slots that have not been filled yet read zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseHistory<const N: usize> {
    samples: [u32; N],
}

impl<const N: usize> Default for PulseHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PulseHistory<N> {
    pub const fn new() -> Self {
        Self { samples: [0; N] }
    }

    /// Drop the oldest sample and append `sample` at the end.
    pub fn push(&mut self, sample: u32) {
        if N == 0 {
            return;
        }
        self.samples.copy_within(1.., 0);
        self.samples[N - 1] = sample;
    }

    pub fn sum(&self) -> u64 {
        self.samples.iter().map(|&s| u64::from(s)).sum()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.samples
    }

    pub fn latest(&self) -> Option<u32> {
        self.samples.last().copied()
    }
}

pub struct WindowAggregator<'a, const N: usize> {
    calibration: Calibration,
    window_secs: u32,
    /// Free-running one-second tick counter
    ticks: u32,
    windows_completed: u32,
    history: PulseHistory<N>,
    publisher: WindowPublisher<'a>,
}

impl<'a, const N: usize> WindowAggregator<'a, N> {
    /// Create an aggregator publishing on `channel`.
    ///
    /// `sensor.history_depth` must equal `N`.
    pub fn new(sensor: &SensorConfig, channel: &'a WindowChannel) -> Result<Self, MeterError> {
        if sensor.window_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sensor.window_secs",
                details: "must be at least 1",
            }
            .into());
        }
        if N == 0 || sensor.history_depth != N {
            return Err(ConfigError::OutOfRange {
                field: "sensor.history_depth",
                details: "must match the compiled history depth",
            }
            .into());
        }

        let publisher = channel.publisher().map_err(|e| {
            error!("No window publisher slot available: {:?}", e);
            MeterError::ChannelExhausted
        })?;

        info!(
            "Aggregating {} s windows, averaging the last {}",
            sensor.window_secs, N
        );

        Ok(Self {
            calibration: Calibration::from_config(sensor),
            window_secs: sensor.window_secs,
            ticks: 0,
            windows_completed: 0,
            history: PulseHistory::new(),
            publisher,
        })
    }

    /// One-second tick. Closes the window when the tick counter reaches a
    /// multiple of the window length.
    pub fn tick(&mut self, counter: &PulseCounter, readings: &SharedReadings) -> WindowPhase {
        self.ticks = self.ticks.wrapping_add(1);

        let elapsed_secs = self.ticks % self.window_secs;
        if elapsed_secs != 0 {
            return WindowPhase::Accumulating { elapsed_secs };
        }

        let report = self.close_window(counter.take());
        readings.record_window(&report);
        self.publisher.publish_immediate(report);

        WindowPhase::Finalized(report)
    }

    /// Fold an already-taken edge count into the history and recompute the
    /// published values.
    pub fn close_window(&mut self, edges: u32) -> WindowReport {
        let cps = self.counts_per_second(edges);
        let sample = self.calibration.calibrate(cps);

        self.windows_completed = self.windows_completed.saturating_add(1);
        self.history.push(sample);

        let report = WindowReport {
            windows_completed: self.windows_completed,
            edges,
            sample,
            dose_rate: self.dose_rate().unwrap_or(0),
            accuracy_percent: self.accuracy_percent(),
        };

        debug!(
            "Window {} closed: {} edges, {} cps, {} uR/h (avg {} uR/h, {}%)",
            report.windows_completed,
            edges,
            cps,
            sample,
            report.dose_rate,
            report.accuracy_percent
        );

        report
    }

    /// Each tube pulse shows up as two edges on the input, so the count is
    /// halved before dividing by the window length.
    pub fn counts_per_second(&self, edges: u32) -> f32 {
        (edges / 2) as f32 / self.window_secs as f32
    }

    /// Rounded mean over the populated history, `None` before the first window.
    pub fn dose_rate(&self) -> Option<u32> {
        if self.windows_completed == 0 {
            return None;
        }

        let divisor = u64::from(self.windows_completed.min(N as u32));
        let mean = div_round(self.history.sum(), divisor);
        Some(u32::try_from(mean).unwrap_or(u32::MAX))
    }

    /// Share of the history holding real data, 100 once it has wrapped.
    pub fn accuracy_percent(&self) -> u8 {
        let completed = u64::from(self.windows_completed);
        let depth = N as u64;
        if completed > depth {
            return 100;
        }

        div_round(100 * completed, depth) as u8
    }

    pub fn windows_completed(&self) -> u32 {
        self.windows_completed
    }

    pub fn history(&self) -> &PulseHistory<N> {
        &self.history
    }
}

/// `num / den` rounded half away from zero (both non-negative).
fn div_round(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MeterConfig, SENSOR_SUM};
    use pretty_assertions::assert_eq;

    fn sensor() -> SensorConfig {
        MeterConfig::DEFAULT.sensor
    }

    #[test]
    fn test_history_shifts_left() {
        let mut history = PulseHistory::<3>::new();
        assert_eq!(history.as_slice(), &[0, 0, 0]);

        history.push(1);
        history.push(2);
        assert_eq!(history.as_slice(), &[0, 1, 2]);

        history.push(3);
        history.push(4);
        assert_eq!(history.as_slice(), &[2, 3, 4]);
        assert_eq!(history.sum(), 9);
        assert_eq!(history.latest(), Some(4));
    }

    #[test]
    fn test_window_closes_on_boundary_only() {
        let channel = WindowChannel::new();
        let counter = PulseCounter::new();
        let readings = SharedReadings::new();
        let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        for second in 1..36 {
            counter.record_edge();
            assert_eq!(
                aggregator.tick(&counter, &readings),
                WindowPhase::Accumulating {
                    elapsed_secs: second
                }
            );
        }
        assert_eq!(readings.get().dose_rate, None);

        counter.record_edge();
        let phase = aggregator.tick(&counter, &readings);
        assert!(matches!(phase, WindowPhase::Finalized(r) if r.edges == 36));
        assert_eq!(counter.peek(), 0);
        assert_eq!(
            aggregator.tick(&counter, &readings),
            WindowPhase::Accumulating { elapsed_secs: 1 }
        );
    }

    #[test]
    fn test_reference_window() {
        let channel = WindowChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let counter = PulseCounter::new();
        let readings = SharedReadings::new();
        let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        for _ in 0..720 {
            counter.record_edge();
        }
        for _ in 0..36 {
            aggregator.tick(&counter, &readings);
        }

        let expected = WindowReport {
            windows_completed: 1,
            edges: 720,
            sample: 360,
            dose_rate: 360,
            accuracy_percent: 10,
        };
        assert_eq!(subscriber.try_next_message_pure(), Some(expected));
        assert_eq!(readings.get().dose_rate, Some(360));
        assert_eq!(readings.get().accuracy_percent, 10);
    }

    #[test]
    fn test_odd_edge_is_dropped_by_halving() {
        let channel = WindowChannel::new();
        let aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        assert_eq!(aggregator.counts_per_second(721), 10.0);
        assert_eq!(aggregator.counts_per_second(1), 0.0);
    }

    #[test]
    fn test_average_uses_populated_windows_only() {
        let channel = WindowChannel::new();
        let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        // 10 cps -> 360, 20 cps -> 720
        aggregator.close_window(720);
        let report = aggregator.close_window(1440);

        assert_eq!(report.dose_rate, 540);
        assert_eq!(report.accuracy_percent, 20);
    }

    #[test]
    fn test_accuracy_caps_after_history_wraps() {
        let channel = WindowChannel::new();
        let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        for _ in 0..SENSOR_SUM {
            aggregator.close_window(0);
        }
        assert_eq!(aggregator.accuracy_percent(), 100);

        aggregator.close_window(0);
        assert_eq!(aggregator.accuracy_percent(), 100);
        assert_eq!(aggregator.dose_rate(), Some(0));
    }

    #[test]
    fn test_unknown_profile_publishes_zero() {
        let channel = WindowChannel::new();
        let mut config = sensor();
        config.tube_profile = 9;
        let mut aggregator = WindowAggregator::<SENSOR_SUM>::new(&config, &channel).unwrap();

        let report = aggregator.close_window(720);
        assert_eq!(report.sample, 0);
        assert_eq!(report.dose_rate, 0);
        assert_eq!(report.accuracy_percent, 10);
    }

    #[test]
    fn test_rejects_mismatched_depth() {
        let channel = WindowChannel::new();
        let mut config = sensor();
        config.history_depth = 4;

        assert!(matches!(
            WindowAggregator::<SENSOR_SUM>::new(&config, &channel),
            Err(MeterError::Config(ConfigError::OutOfRange {
                field: "sensor.history_depth",
                ..
            }))
        ));
    }

    #[test]
    fn test_single_publisher_slot() {
        let channel = WindowChannel::new();
        let _first = WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel).unwrap();

        assert!(matches!(
            WindowAggregator::<SENSOR_SUM>::new(&sensor(), &channel),
            Err(MeterError::ChannelExhausted)
        ));
    }

    #[test]
    fn test_div_round() {
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(7, 3), 2);
        assert_eq!(div_round(8, 3), 3);
        assert_eq!(div_round(0, 10), 0);
    }
}
