//! Error types for the jump estimation library.

use thiserror::Error;

/// Failure to derive a pixel-to-centimeter scale from a standing body
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// Shoulders, hips or ankles missing or below the confidence threshold
    #[error("insufficient keypoints for calibration, please step back into the frame")]
    InsufficientKeypoints,

    /// Standing pixel height too small to give a meaningful scale
    #[error("standing pixel height {pixel_height:.1}px is below the minimum of {minimum:.1}px, please recalibrate")]
    DegeneratePixelHeight {
        /// Measured top-to-ground distance in pixels
        pixel_height: f64,
        /// Configured minimum
        minimum: f64,
    },
}

/// Failure to measure a jump once flight tracking has started
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementError {
    /// Flight tracking ended before a sustained rise above the baseline
    #[error("jump not detected, try again")]
    NoTakeoffDetected,

    /// Takeoff was seen but the body never settled back on the baseline
    #[error("landing not detected, try again")]
    NoLandingDetected,
}

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Scale calibration failed
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Jump measurement failed
    #[error("Measurement error: {0}")]
    Measurement(#[from] MeasurementError),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic I/O error with description
    #[error("I/O error: {0}")]
    IoError(String),

    /// The analysis thread of a session is no longer running
    #[error("Session closed")]
    SessionClosed,
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
