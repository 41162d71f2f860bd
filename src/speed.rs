use nalgebra as na;

use crate::config::SpeedConfig;
use crate::track::{Sample, Track};

/// Converts consecutive track samples into a calibrated speed.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    calibration_factor: f64,
    unit: String,
}

impl SpeedEstimator {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            calibration_factor: config.calibration_factor,
            unit: config.unit.clone(),
        }
    }

    /// Speed between two samples. A missing previous sample or a non-positive
    /// time delta is a cold start and yields 0.
    pub fn estimate(&self, previous: Option<&Sample>, current: &Sample) -> f64 {
        let Some(previous) = previous else {
            return 0.0;
        };

        let elapsed = current.ts - previous.ts;
        if elapsed <= 0.0 {
            return 0.0;
        }

        let displacement = na::distance(&previous.center, &current.center) as f64;

        displacement / elapsed * self.calibration_factor
    }

    #[inline]
    pub fn estimate_track(&self, track: &Track) -> f64 {
        match track.last_sample() {
            Some(current) => self.estimate(track.previous_sample(), current),
            None => 0.0,
        }
    }

    #[inline]
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// `"12.34 km/h"`, the form used in reports and notifications.
pub fn format_speed(speed: f64, unit: &str) -> String {
    format!("{:.2} {}", speed, unit)
}
