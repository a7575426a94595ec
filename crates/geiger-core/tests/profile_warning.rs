//! An unknown tube profile is reported once, when the calibration is bound,
//! not on every conversion.

use std::sync::atomic::{AtomicUsize, Ordering};

use geiger_core::{Calibration, calibrate};
use log::{Level, LevelFilter, Log, Metadata, Record};

struct WarningCounter {
    unknown_profile: AtomicUsize,
}

impl Log for WarningCounter {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Warn
            && record.args().to_string().contains("Unknown tube profile")
        {
            self.unknown_profile.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn flush(&self) {}
}

static LOGGER: WarningCounter = WarningCounter {
    unknown_profile: AtomicUsize::new(0),
};

#[test]
fn unknown_profile_warns_once_per_setup() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Warn);

    let calibration = Calibration::new(9, 1);
    assert_eq!(LOGGER.unknown_profile.load(Ordering::SeqCst), 1);

    for cps in 0..100 {
        assert_eq!(calibration.calibrate(cps as f32), 0);
        assert_eq!(calibrate(cps as f32, 9, 1), 0);
    }
    assert_eq!(LOGGER.unknown_profile.load(Ordering::SeqCst), 1);

    // Known profiles stay silent
    assert_eq!(calibrate(10.0, 1, 1), 360);
    assert_eq!(LOGGER.unknown_profile.load(Ordering::SeqCst), 1);
}
