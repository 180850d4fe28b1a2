//! Configuration management for jump analysis sessions

use crate::constants::{
    COUNTDOWN_TICK_MS, DEFAULT_COUNTDOWN_SECS, DEFAULT_DROPOUT_DEBOUNCE_MS, DEFAULT_FRAME_MARGIN_PX, DEFAULT_FRAME_QUEUE_CAPACITY,
    DEFAULT_LANDING_TOLERANCE_PX, DEFAULT_MAX_FLIGHT_MS, DEFAULT_MIN_LANDMARK_CONFIDENCE, DEFAULT_MIN_PIXEL_HEIGHT,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_STILLNESS_DWELL_MS, DEFAULT_STILLNESS_TOLERANCE_PX, DEFAULT_STILLNESS_WINDOW,
    DEFAULT_SUSTAIN_FRAMES, DEFAULT_TAKEOFF_THRESHOLD_PX,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scale calibration and framing
    pub calibration: CalibrationConfig,

    /// Stationary-body detection
    pub stillness: StillnessConfig,

    /// Pre-jump countdown
    pub countdown: CountdownConfig,

    /// Takeoff and landing detection
    pub jump: JumpConfig,

    /// Detector dropout handling
    pub dropout: DropoutConfig,

    /// Analysis thread settings
    pub session: SessionConfig,
}

/// Calibration and framing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// User height in centimeters, usually supplied on the command line
    pub height_cm: Option<u32>,

    /// Minimum standing pixel height accepted for a scale
    pub min_pixel_height: f64,

    /// Minimum landmark confidence (0.0-1.0)
    pub min_landmark_confidence: f32,

    /// Keypoints closer than this to the frame edge count as clipped
    pub frame_margin_px: f64,
}

/// Stillness parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillnessConfig {
    /// Minimum number of samples in a still run
    pub window_size: usize,

    /// Maximum vertical range of the reference keypoint within a still run
    pub tolerance_px: f64,

    /// Minimum duration of a still run
    pub dwell_ms: u64,
}

/// Countdown parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Countdown length in whole seconds
    pub seconds: u32,

    /// Wall-clock time per countdown second, shorter only for simulations
    pub tick_interval_ms: u64,
}

/// Jump detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    /// Rise above the baseline that counts as leaving the ground
    pub takeoff_threshold_px: f64,

    /// Distance from the baseline that counts as back on the ground
    pub landing_tolerance_px: f64,

    /// Consecutive frames required to confirm takeoff or landing
    pub sustain_frames: usize,

    /// Maximum time spent tracking flight before giving up
    pub max_flight_ms: u64,
}

/// Dropout parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoutConfig {
    /// Time without a usable body before the subject counts as gone
    pub debounce_ms: u64,
}

/// Analysis thread parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames buffered ahead of the analysis thread before new ones are dropped
    pub frame_queue_capacity: usize,

    /// Idle time after which the analysis thread checks timeouts
    pub poll_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            height_cm: None,
            min_pixel_height: DEFAULT_MIN_PIXEL_HEIGHT,
            min_landmark_confidence: DEFAULT_MIN_LANDMARK_CONFIDENCE,
            frame_margin_px: DEFAULT_FRAME_MARGIN_PX,
        }
    }
}

impl Default for StillnessConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_STILLNESS_WINDOW,
            tolerance_px: DEFAULT_STILLNESS_TOLERANCE_PX,
            dwell_ms: DEFAULT_STILLNESS_DWELL_MS,
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: DEFAULT_COUNTDOWN_SECS,
            tick_interval_ms: COUNTDOWN_TICK_MS,
        }
    }
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            takeoff_threshold_px: DEFAULT_TAKEOFF_THRESHOLD_PX,
            landing_tolerance_px: DEFAULT_LANDING_TOLERANCE_PX,
            sustain_frames: DEFAULT_SUSTAIN_FRAMES,
            max_flight_ms: DEFAULT_MAX_FLIGHT_MS,
        }
    }
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DROPOUT_DEBOUNCE_MS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.calibration.height_cm == Some(0) {
            return Err(Error::ConfigError("Calibration height must be greater than 0".to_string()));
        }
        if !(self.calibration.min_pixel_height > 0.0) {
            return Err(Error::ConfigError("Minimum pixel height must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.calibration.min_landmark_confidence) {
            return Err(Error::ConfigError(
                "Landmark confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(self.calibration.frame_margin_px >= 0.0) {
            return Err(Error::ConfigError("Frame margin must be non-negative".to_string()));
        }

        if self.stillness.window_size == 0 {
            return Err(Error::ConfigError(
                "Stillness window size must be greater than 0".to_string(),
            ));
        }
        if !(self.stillness.tolerance_px > 0.0) {
            return Err(Error::ConfigError("Stillness tolerance must be positive".to_string()));
        }

        if self.countdown.seconds == 0 {
            return Err(Error::ConfigError("Countdown must last at least one second".to_string()));
        }
        if self.countdown.tick_interval_ms == 0 {
            return Err(Error::ConfigError("Countdown tick interval must be greater than 0".to_string()));
        }

        if !(self.jump.takeoff_threshold_px > 0.0) {
            return Err(Error::ConfigError("Takeoff threshold must be positive".to_string()));
        }
        if !(self.jump.landing_tolerance_px >= 0.0) {
            return Err(Error::ConfigError("Landing tolerance must be non-negative".to_string()));
        }
        if self.jump.landing_tolerance_px >= self.jump.takeoff_threshold_px {
            return Err(Error::ConfigError(
                "Landing tolerance must be smaller than the takeoff threshold".to_string(),
            ));
        }
        if self.jump.sustain_frames == 0 {
            return Err(Error::ConfigError("Sustain frames must be greater than 0".to_string()));
        }
        if self.jump.max_flight_ms == 0 {
            return Err(Error::ConfigError("Maximum flight time must be greater than 0".to_string()));
        }

        if self.session.frame_queue_capacity == 0 {
            return Err(Error::ConfigError("Frame queue capacity must be greater than 0".to_string()));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(Error::ConfigError("Poll interval must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Vertimeter Configuration

# Scale calibration and framing
calibration:
  height_cm: 180
  min_pixel_height: 100.0
  min_landmark_confidence: 0.5
  frame_margin_px: 4.0

# Stationary-body detection
stillness:
  window_size: 10
  tolerance_px: 8.0
  dwell_ms: 1000

# Pre-jump countdown
countdown:
  seconds: 6
  tick_interval_ms: 1000

# Takeoff and landing detection
jump:
  takeoff_threshold_px: 15.0
  landing_tolerance_px: 10.0
  sustain_frames: 2
  max_flight_ms: 5000

# Detector dropout handling
dropout:
  debounce_ms: 500

# Analysis thread
session:
  frame_queue_capacity: 8
  poll_interval_ms: 50
"#;
