//! Vertical jump estimation from per-frame body keypoints.
//!
//! This library turns the output of an external pose detector into a jump
//! height and duration, using the user's standing height as the only
//! calibration reference:
//! 1. Wait for a whole body to be framed and standing still
//! 2. Derive a centimeters-per-pixel scale from the standing body
//! 3. Count down, then track the hips through takeoff and landing
//! 4. Report the peak rise above the standing baseline in centimeters
//!
//! # Examples
//!
//! ## Replaying a recording
//!
//! ```no_run
//! use vertimeter::{calibration::CalibrationHeight, config::Config, replay};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frames = replay::load_recording("jump.yaml")?;
//! let outcome = replay::replay(&Config::default(), CalibrationHeight::new(180)?, frames);
//!
//! match outcome.result {
//!     Some(result) => println!("{}", result),
//!     None => println!("Jump not detected: {:?}", outcome.aborts),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Live session
//!
//! ```no_run
//! use vertimeter::{
//!     calibration::CalibrationHeight,
//!     config::Config,
//!     keypoints::KeypointFrame,
//!     session::{JumpSession, SessionEvent},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = JumpSession::new(Config::default(), CalibrationHeight::new(180)?)?;
//! let events = session.subscribe();
//! session.start()?;
//!
//! // Called from the camera callback for every frame
//! let clock = session.clock();
//! session.submit_frame(KeypointFrame::absent(clock.now_ms(), 1280, 720));
//!
//! for event in events {
//!     match event {
//!         SessionEvent::StateChanged(state) => println!("{}", state),
//!         SessionEvent::CountdownTick(n) => println!("{}", n),
//!         SessionEvent::Completed(result) => {
//!             println!("{}", result);
//!             break;
//!         }
//!         SessionEvent::Aborted(e) => println!("{}", e),
//!         SessionEvent::CalibrationFailed(e) => println!("{}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Keypoint frames produced by the external pose detector
pub mod keypoints;

/// Pixel-to-centimeter scale calibration
pub mod calibration;

/// Stationary-body detection over the reference keypoint
pub mod stillness;

/// Takeoff, landing and jump height measurement
pub mod measurement;

/// Immutable jump result
pub mod result;

/// Jump phase state machine
pub mod phase;

/// Wall-clock countdown timer
pub mod countdown;

/// Threaded measurement session and application state
pub mod session;

/// Deterministic replay of recorded frames
pub mod replay;

/// Error types and result handling
pub mod error;

/// Constants used throughout the library
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{CalibrationError, Error, MeasurementError, Result};
