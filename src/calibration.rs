//! Pixel-to-centimeter calibration from a standing body and the user's height.

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::keypoints::{KeypointFrame, Landmark};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// User-entered standing height, the sole ground-truth measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CalibrationHeight(NonZeroU32);

impl CalibrationHeight {
    /// Validate a height in centimeters
    pub fn new(cm: u32) -> Result<Self> {
        NonZeroU32::new(cm)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput("Invalid height".to_string()))
    }

    /// Height in centimeters
    #[must_use]
    pub fn cm(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for CalibrationHeight {
    type Error = Error;

    fn try_from(cm: u32) -> Result<Self> {
        Self::new(cm)
    }
}

impl From<CalibrationHeight> for u32 {
    fn from(height: CalibrationHeight) -> Self {
        height.cm()
    }
}

impl fmt::Display for CalibrationHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cm", self.cm())
    }
}

/// Centimeters represented by one pixel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    cm_per_px: f64,
}

impl ScaleFactor {
    /// Centimeters per pixel
    #[must_use]
    pub fn cm_per_px(self) -> f64 {
        self.cm_per_px
    }

    /// Convert a pixel distance to centimeters
    #[must_use]
    pub fn to_cm(self, px: f64) -> f64 {
        px * self.cm_per_px
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} cm/px", self.cm_per_px)
    }
}

/// Derive the scale from a frame showing the subject standing still.
///
/// The pixel height is measured from the topmost confident landmark to the
/// lowest ground-contact landmark. All mandatory landmarks must be detected;
/// a pixel height at or below `config.min_pixel_height` is rejected.
pub fn compute_scale(
    frame: &KeypointFrame,
    height: CalibrationHeight,
    config: &CalibrationConfig,
) -> std::result::Result<ScaleFactor, CalibrationError> {
    let min_confidence = config.min_landmark_confidence;
    let body = frame.body.as_ref().ok_or(CalibrationError::InsufficientKeypoints)?;

    if !Landmark::MANDATORY
        .iter()
        .all(|&lm| body.get(lm, min_confidence).is_some())
    {
        return Err(CalibrationError::InsufficientKeypoints);
    }

    let top = body.top_y(min_confidence).ok_or(CalibrationError::InsufficientKeypoints)?;
    let ground = body.ground_y(min_confidence).ok_or(CalibrationError::InsufficientKeypoints)?;
    let pixel_height = ground - top;

    // NaN compares false, so test for the accepted range rather than the rejected one
    if !(pixel_height > config.min_pixel_height) {
        return Err(CalibrationError::DegeneratePixelHeight {
            pixel_height,
            minimum: config.min_pixel_height,
        });
    }

    Ok(ScaleFactor {
        cm_per_px: f64::from(height.cm()) / pixel_height,
    })
}
