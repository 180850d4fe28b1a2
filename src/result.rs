//! Immutable jump result handed to the presentation layer.

use crate::calibration::CalibrationHeight;
use crate::measurement::VerticalTrace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Measured jump, frozen once constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpResult {
    jump_height_cm: f64,
    jump_duration_sec: f64,
    vertical_trace: BTreeMap<u64, f64>,
    calibration_height_cm: u32,
}

impl JumpResult {
    /// Jump height in centimeters
    #[must_use]
    pub fn jump_height_cm(&self) -> f64 {
        self.jump_height_cm
    }

    /// Time between takeoff and landing in seconds
    #[must_use]
    pub fn jump_duration_sec(&self) -> f64 {
        self.jump_duration_sec
    }

    /// Reference keypoint position in pixels, keyed by timestamp in milliseconds
    #[must_use]
    pub fn vertical_trace(&self) -> &BTreeMap<u64, f64> {
        &self.vertical_trace
    }

    /// Height the scale was calibrated against
    #[must_use]
    pub fn calibration_height_cm(&self) -> u32 {
        self.calibration_height_cm
    }
}

impl fmt::Display for JumpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "You jumped {:.2} cm high! Your jump duration was {:.2} seconds.",
            self.jump_height_cm, self.jump_duration_sec
        )
    }
}

/// Package a successful measurement into its final form
#[must_use]
pub fn aggregate(
    jump_height_cm: f64,
    jump_duration_sec: f64,
    vertical_trace: VerticalTrace,
    calibration_height: CalibrationHeight,
) -> JumpResult {
    JumpResult {
        jump_height_cm,
        jump_duration_sec,
        vertical_trace: vertical_trace.into_map(),
        calibration_height_cm: calibration_height.cm(),
    }
}
