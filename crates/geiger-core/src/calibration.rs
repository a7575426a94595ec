//! Counts-per-second to dose-rate conversion
//!
//! Each supported tube has a piecewise linear fit of its published
//! sensitivity graph. A curve is an ordered table of segments; the first
//! segment whose upper bound lies above the input rate is evaluated as
//! `a * cps + b` and the result is split across the tubes wired in parallel.
//! At and above [`SATURATION_CPS`] every curve reports [`DOSE_RATE_CEILING`],
//! the measuring range limit of the instrument.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::SensorConfig;

/// Reading reported once the input rate leaves the calibrated range (µR/h).
pub const DOSE_RATE_CEILING: u32 = 130_000;

/// First input rate that is reported as [`DOSE_RATE_CEILING`].
pub const SATURATION_CPS: f32 = 2000.0;

/// One range of a calibration curve, valid below `upper_cps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub upper_cps: f32,
    /// µR/h per count-per-second
    pub a: f32,
    /// µR/h offset
    pub b: f32,
}

impl Segment {
    const fn new(upper_cps: f32, a: f32, b: f32) -> Self {
        Self { upper_cps, a, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeCurve {
    pub name: &'static str,
    pub segments: [Segment; 5],
}

/// SBM-20, STS-5 and BOI-33.
pub const SBM20_CURVE: TubeCurve = TubeCurve {
    name: "SBM-20",
    segments: [
        Segment::new(200.0, 36.0, 0.0),
        Segment::new(400.0, 39.0, -600.0),
        Segment::new(800.0, 56.25, -7500.0),
        Segment::new(1400.0, 66.6667, -15833.3),
        Segment::new(SATURATION_CPS, 87.5, -45000.0),
    ],
};

/// SBM-19 and STS-6.
pub const SBM19_CURVE: TubeCurve = TubeCurve {
    name: "SBM-19",
    segments: [
        Segment::new(200.0, 9.0, 0.0),
        Segment::new(400.0, 9.75, -150.0),
        Segment::new(800.0, 14.0625, -1875.0),
        Segment::new(1400.0, 16.6667, -3958.33),
        Segment::new(SATURATION_CPS, 21.875, -11250.0),
    ],
};

impl TubeCurve {
    /// Dose rate in µR/h for `cps` shared across `tube_count` tubes.
    ///
    /// Negative and NaN rates read as zero. The result is rounded half away
    /// from zero and never exceeds [`DOSE_RATE_CEILING`].
    pub fn dose_rate(&self, cps: f32, tube_count: u8) -> u32 {
        if cps.is_nan() || cps <= 0.0 {
            return 0;
        }

        let Some(segment) = self.segments.iter().find(|s| cps < s.upper_cps) else {
            return DOSE_RATE_CEILING;
        };

        let tubes = f32::from(tube_count.max(1));
        let rounded = libm::roundf((segment.a * cps + segment.b) / tubes);

        if rounded <= 0.0 {
            0
        } else if rounded >= DOSE_RATE_CEILING as f32 {
            DOSE_RATE_CEILING
        } else {
            rounded as u32
        }
    }
}

/// Supported tube models.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeProfile {
    Sbm20,
    Sbm19,
}

impl TubeProfile {
    /// Map the numeric selector used in deployment config to a profile.
    pub const fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            1 => Some(Self::Sbm20),
            2 => Some(Self::Sbm19),
            _ => None,
        }
    }

    pub const fn selector(self) -> u8 {
        match self {
            Self::Sbm20 => 1,
            Self::Sbm19 => 2,
        }
    }

    pub const fn curve(self) -> &'static TubeCurve {
        match self {
            Self::Sbm20 => &SBM20_CURVE,
            Self::Sbm19 => &SBM19_CURVE,
        }
    }
}

/// Calibration bound to one deployment: a curve (if the selector was known)
/// and the number of parallel tubes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    curve: Option<&'static TubeCurve>,
    tube_count: u8,
}

impl Calibration {
    /// Bind a selector, warning once if it names no known tube.
    pub fn new(selector: u8, tube_count: u8) -> Self {
        let calibration = Self::lookup(selector, tube_count);
        if calibration.curve.is_none() {
            warn!(
                "Unknown tube profile {}, dose rate will read as zero",
                selector
            );
        }

        calibration
    }

    const fn lookup(selector: u8, tube_count: u8) -> Self {
        let curve = match TubeProfile::from_selector(selector) {
            Some(profile) => Some(profile.curve()),
            None => None,
        };

        Self { curve, tube_count }
    }

    pub fn from_config(sensor: &SensorConfig) -> Self {
        Self::new(sensor.tube_profile, sensor.tube_count)
    }

    /// Dose rate in µR/h. Always zero for an unknown tube profile.
    pub fn calibrate(&self, cps: f32) -> u32 {
        match self.curve {
            Some(curve) => curve.dose_rate(cps, self.tube_count),
            None => 0,
        }
    }

    pub fn curve(&self) -> Option<&'static TubeCurve> {
        self.curve
    }
}

/// Convenience form of [`Calibration::calibrate`]. Does not log; an unknown
/// selector is reported once by [`Calibration::new`] when the meter is set up.
pub fn calibrate(cps: f32, selector: u8, tube_count: u8) -> u32 {
    Calibration::lookup(selector, tube_count).calibrate(cps)
}
