//! Constants used throughout the library

/// Length of the pre-jump countdown in seconds
pub const DEFAULT_COUNTDOWN_SECS: u32 = 6;

/// Interval between countdown ticks in milliseconds
pub const COUNTDOWN_TICK_MS: u64 = 1000;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f64 = 9.806_65;

/// Centimeters per meter
pub const CM_PER_M: f64 = 100.0;

/// Milliseconds per second
pub const MS_PER_SEC: f64 = 1000.0;

/// Minimum top-to-ground distance accepted for calibration
pub const DEFAULT_MIN_PIXEL_HEIGHT: f64 = 100.0;

/// Minimum per-landmark confidence for a keypoint to count as detected
pub const DEFAULT_MIN_LANDMARK_CONFIDENCE: f32 = 0.5;

/// Distance from the frame edge below which a keypoint counts as clipped
pub const DEFAULT_FRAME_MARGIN_PX: f64 = 4.0;

/// Stillness detection defaults
pub const DEFAULT_STILLNESS_WINDOW: usize = 10;
pub const DEFAULT_STILLNESS_TOLERANCE_PX: f64 = 8.0;
pub const DEFAULT_STILLNESS_DWELL_MS: u64 = 1000;

/// Jump detection defaults
pub const DEFAULT_TAKEOFF_THRESHOLD_PX: f64 = 15.0;
pub const DEFAULT_LANDING_TOLERANCE_PX: f64 = 10.0;
pub const DEFAULT_SUSTAIN_FRAMES: usize = 2;
pub const DEFAULT_MAX_FLIGHT_MS: u64 = 5000;

/// Time without a usable body before the subject counts as gone
pub const DEFAULT_DROPOUT_DEBOUNCE_MS: u64 = 500;

/// Analysis thread defaults
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 8;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
