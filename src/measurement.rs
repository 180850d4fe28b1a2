//! Takeoff, landing and height measurement during flight tracking.
//!
//! The measurer records the reference keypoint for every frame of the flight
//! phase. Displacement is measured upwards from the pre-flight baseline, so a
//! positive value means the body is above its standing position. Takeoff and
//! landing each need `sustain_frames` consecutive frames past their threshold
//! and are stamped with the first frame of that run.

use crate::calibration::ScaleFactor;
use crate::config::JumpConfig;
use crate::constants::{CM_PER_M, MS_PER_SEC, STANDARD_GRAVITY};
use crate::error::MeasurementError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded position of the reference keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Capture time in milliseconds
    pub timestamp_ms: u64,
    /// Vertical pixel position
    pub y_px: f64,
}

/// Append-only time series of the reference keypoint during flight
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerticalTrace {
    samples: Vec<TraceSample>,
}

impl VerticalTrace {
    /// Create an empty trace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, timestamp_ms: u64, y_px: f64) {
        self.samples.push(TraceSample { timestamp_ms, y_px });
    }

    /// Samples in capture order
    #[must_use]
    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp to position mapping; a repeated timestamp keeps its last sample
    #[must_use]
    pub fn into_map(self) -> BTreeMap<u64, f64> {
        self.samples
            .into_iter()
            .map(|s| (s.timestamp_ms, s.y_px))
            .collect()
    }
}

/// Outcome of a completed jump
#[derive(Debug, Clone, PartialEq)]
pub struct JumpMeasurement {
    /// Peak displacement converted with the calibrated scale
    pub height_cm: f64,
    /// Landing time minus takeoff time
    pub duration_sec: f64,
    /// Flight-time estimate g·t²/8, for cross-checking only
    pub ballistic_height_cm: f64,
    /// Peak rise above the baseline in pixels
    pub peak_displacement_px: f64,
    /// First frame of the sustained rise
    pub takeoff_ms: u64,
    /// First frame of the sustained return to the baseline
    pub landing_ms: u64,
    /// Every sample recorded during flight tracking
    pub trace: VerticalTrace,
}

/// Where the subject is relative to the ground
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightStatus {
    /// No confirmed takeoff yet
    Grounded,
    /// Takeoff confirmed, landing not yet
    Airborne,
    /// Landing confirmed, the measurement can be finished
    Landed,
}

/// Tracks one jump from the end of the countdown to landing
#[derive(Debug, Clone)]
pub struct JumpMeasurer {
    config: JumpConfig,
    baseline_y: f64,
    scale: ScaleFactor,
    started_ms: u64,
    trace: VerticalTrace,
    takeoff: Option<usize>,
    landing: Option<usize>,
    run_start: Option<usize>,
    run_len: usize,
}

impl JumpMeasurer {
    /// Start tracking with the standing baseline and the scale frozen for this jump
    #[must_use]
    pub fn new(config: &JumpConfig, baseline_y: f64, scale: ScaleFactor, started_ms: u64) -> Self {
        Self {
            config: config.clone(),
            baseline_y,
            scale,
            started_ms,
            trace: VerticalTrace::new(),
            takeoff: None,
            landing: None,
            run_start: None,
            run_len: 0,
        }
    }

    /// Record the reference keypoint for one frame
    pub fn push(&mut self, timestamp_ms: u64, y_px: f64) -> FlightStatus {
        if self.landing.is_some() {
            return FlightStatus::Landed;
        }

        let index = self.trace.len();
        self.trace.push(timestamp_ms, y_px);
        let displacement = self.baseline_y - y_px;

        if self.takeoff.is_none() {
            if self.extend_run(index, displacement > self.config.takeoff_threshold_px) {
                self.takeoff = self.run_start.take();
                self.run_len = 0;
                debug!(
                    "Takeoff at {}ms ({:.1}px above baseline)",
                    self.sample_at(self.takeoff).map_or(timestamp_ms, |s| s.timestamp_ms),
                    displacement
                );
            }
        } else if self.extend_run(index, displacement <= self.config.landing_tolerance_px) {
            self.landing = self.run_start.take();
            self.run_len = 0;
            debug!(
                "Landing at {}ms",
                self.sample_at(self.landing).map_or(timestamp_ms, |s| s.timestamp_ms)
            );
        }

        self.status()
    }

    fn extend_run(&mut self, index: usize, condition: bool) -> bool {
        if condition {
            self.run_start.get_or_insert(index);
            self.run_len += 1;
        } else {
            self.run_start = None;
            self.run_len = 0;
        }
        self.run_len >= self.config.sustain_frames
    }

    fn sample_at(&self, index: Option<usize>) -> Option<TraceSample> {
        index.and_then(|i| self.trace.samples().get(i).copied())
    }

    /// Current flight status
    #[must_use]
    pub fn status(&self) -> FlightStatus {
        match (self.takeoff, self.landing) {
            (_, Some(_)) => FlightStatus::Landed,
            (Some(_), None) => FlightStatus::Airborne,
            (None, None) => FlightStatus::Grounded,
        }
    }

    /// Whether flight tracking has run past its time limit
    #[must_use]
    pub fn is_timed_out(&self, now_ms: u64) -> bool {
        now_ms >= self.timeout_deadline_ms()
    }

    /// First time at which tracking counts as timed out
    #[must_use]
    pub fn timeout_deadline_ms(&self) -> u64 {
        self.started_ms
            .saturating_add(self.config.max_flight_ms)
            .saturating_add(1)
    }

    /// Samples recorded so far
    #[must_use]
    pub fn trace(&self) -> &VerticalTrace {
        &self.trace
    }

    /// Error describing why tracking that ends now produced no jump
    #[must_use]
    pub fn abort(&self) -> MeasurementError {
        if self.takeoff.is_none() {
            MeasurementError::NoTakeoffDetected
        } else {
            MeasurementError::NoLandingDetected
        }
    }

    /// Compute the jump once landing has been confirmed
    pub fn finish(self) -> Result<JumpMeasurement, MeasurementError> {
        let takeoff = self.takeoff.ok_or(MeasurementError::NoTakeoffDetected)?;
        let landing = self.landing.ok_or(MeasurementError::NoLandingDetected)?;
        let samples = self.trace.samples();

        let takeoff_ms = samples[takeoff].timestamp_ms;
        let landing_ms = samples[landing].timestamp_ms;
        let peak_displacement_px = samples[takeoff..landing]
            .iter()
            .map(|s| self.baseline_y - s.y_px)
            .fold(0.0, f64::max);

        let duration_sec = landing_ms.saturating_sub(takeoff_ms) as f64 / MS_PER_SEC;
        let height_cm = self.scale.to_cm(peak_displacement_px);
        let ballistic_height_cm = ballistic_height_cm(duration_sec);
        debug!(
            "Jump measured: {:.1}cm over {:.3}s (ballistic estimate {:.1}cm)",
            height_cm, duration_sec, ballistic_height_cm
        );

        Ok(JumpMeasurement {
            height_cm,
            duration_sec,
            ballistic_height_cm,
            peak_displacement_px,
            takeoff_ms,
            landing_ms,
            trace: self.trace,
        })
    }
}

/// Height reached by a projectile airborne for `flight_sec`, assuming a symmetric rise and fall
#[must_use]
pub fn ballistic_height_cm(flight_sec: f64) -> f64 {
    STANDARD_GRAVITY * flight_sec * flight_sec / 8.0 * CM_PER_M
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{compute_scale, CalibrationHeight};
    use crate::config::CalibrationConfig;
    use crate::keypoints::{BodyKeypoints, Keypoint, KeypointFrame, Landmark};

    const BASELINE: f64 = 500.0;

    fn scale_0_3() -> ScaleFactor {
        let body = BodyKeypoints::new()
            .with(Landmark::LeftShoulder, Keypoint::new(300.0, 60.0, 0.9))
            .with(Landmark::RightShoulder, Keypoint::new(340.0, 60.0, 0.9))
            .with(Landmark::LeftHip, Keypoint::new(305.0, 360.0, 0.9))
            .with(Landmark::RightHip, Keypoint::new(335.0, 360.0, 0.9))
            .with(Landmark::LeftAnkle, Keypoint::new(305.0, 660.0, 0.9))
            .with(Landmark::RightAnkle, Keypoint::new(335.0, 660.0, 0.9));
        let frame = KeypointFrame::detected(0, 640, 720, body);
        compute_scale(&frame, CalibrationHeight::new(180).unwrap(), &CalibrationConfig::default()).unwrap()
    }

    fn measurer() -> JumpMeasurer {
        JumpMeasurer::new(&JumpConfig::default(), BASELINE, scale_0_3(), 0)
    }

    fn feed(m: &mut JumpMeasurer, start_ms: u64, displacements: &[f64]) -> FlightStatus {
        let mut status = m.status();
        for (i, d) in displacements.iter().enumerate() {
            status = m.push(start_ms + i as u64 * 50, BASELINE - d);
        }
        status
    }

    #[test]
    fn test_round_trip_jump() {
        let mut m = measurer();
        assert_eq!(feed(&mut m, 0, &[0.0; 20]), FlightStatus::Grounded);
        let flight = [40.0, 70.0, 85.0, 95.0, 99.0, 100.0, 99.0, 95.0, 85.0, 40.0, 0.0, 0.0];
        assert_eq!(feed(&mut m, 1000, &flight), FlightStatus::Landed);

        let jump = m.finish().unwrap();
        assert!((jump.height_cm - 30.0).abs() < 1e-9);
        assert!((jump.duration_sec - 0.5).abs() < 1e-12);
        assert_eq!(jump.takeoff_ms, 1000);
        assert_eq!(jump.landing_ms, 1500);
        assert_eq!(jump.trace.len(), 32);
        // g·t²/8 for half a second is about 30.6cm
        assert!((jump.ballistic_height_cm - 30.645_781_25).abs() < 1e-6);
    }

    #[test]
    fn test_single_frame_spike_is_ignored() {
        let mut m = measurer();
        assert_eq!(feed(&mut m, 0, &[0.0, 60.0, 0.0, 0.0]), FlightStatus::Grounded);
        assert_eq!(m.abort(), MeasurementError::NoTakeoffDetected);

        assert_eq!(feed(&mut m, 200, &[60.0, 60.0]), FlightStatus::Airborne);
    }

    #[test]
    fn test_landing_requires_sustained_return() {
        let mut m = measurer();
        feed(&mut m, 0, &[50.0, 80.0]);
        assert_eq!(feed(&mut m, 100, &[0.0, 60.0]), FlightStatus::Airborne);
        assert_eq!(m.abort(), MeasurementError::NoLandingDetected);

        // Knees bending on landing put the hips below the baseline
        assert_eq!(feed(&mut m, 200, &[-20.0, -25.0]), FlightStatus::Landed);
        let jump = m.finish().unwrap();
        assert_eq!(jump.landing_ms, 200);
        assert!((jump.height_cm - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_finish_without_landing_fails() {
        let mut m = measurer();
        feed(&mut m, 0, &[50.0, 80.0, 90.0]);
        assert_eq!(m.finish().unwrap_err(), MeasurementError::NoLandingDetected);

        let m = measurer();
        assert_eq!(m.finish().unwrap_err(), MeasurementError::NoTakeoffDetected);
    }

    #[test]
    fn test_timeout() {
        let m = measurer();
        assert!(!m.is_timed_out(5000));
        assert!(m.is_timed_out(5001));
        assert_eq!(m.timeout_deadline_ms(), 5001);
    }

    #[test]
    fn test_samples_after_landing_are_not_recorded() {
        let mut m = measurer();
        feed(&mut m, 0, &[50.0, 80.0, 0.0, 0.0]);
        let len = m.trace().len();
        assert_eq!(m.push(1000, 300.0), FlightStatus::Landed);
        assert_eq!(m.trace().len(), len);
    }
}
