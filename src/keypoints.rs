//! Per-frame body landmarks delivered by the external pose detector.
//!
//! Coordinates are in frame pixels with the origin at the top-left corner,
//! so a body moving up has a decreasing `y`. A keypoint whose coordinates are
//! not finite is treated as missing, and a frame without a usable body is
//! treated as an absence for that frame.

use crate::config::CalibrationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named body landmarks used by the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
}

impl Landmark {
    /// Landmarks that must be detected and unclipped for a body to count as framed
    pub const MANDATORY: [Landmark; 6] = [
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    /// Landmarks in contact with the ground while standing
    pub const GROUND: [Landmark; 4] = [
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
        Landmark::LeftHeel,
        Landmark::RightHeel,
    ];
}

/// Single detected keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// X coordinate in pixels
    pub x: f64,
    /// Y coordinate in pixels, growing downwards
    pub y: f64,
    /// Detector confidence (0.0-1.0)
    pub confidence: f32,
}

impl Keypoint {
    /// Create a new keypoint
    #[must_use]
    pub fn new(x: f64, y: f64, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// Whether the keypoint is finite and at least as confident as `threshold`
    #[must_use]
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.confidence >= threshold
    }

    fn is_inside(&self, width: u32, height: u32, margin: f64) -> bool {
        self.x >= margin
            && self.y >= margin
            && self.x <= f64::from(width) - margin
            && self.y <= f64::from(height) - margin
    }
}

/// Landmarks of the single detected body in a frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyKeypoints {
    points: BTreeMap<Landmark, Keypoint>,
}

impl BodyKeypoints {
    /// Create an empty landmark set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, landmark: Landmark, keypoint: Keypoint) -> Self {
        self.points.insert(landmark, keypoint);
        self
    }

    /// Insert or replace a landmark
    pub fn insert(&mut self, landmark: Landmark, keypoint: Keypoint) {
        self.points.insert(landmark, keypoint);
    }

    /// Landmark if it was detected with at least `min_confidence`
    #[must_use]
    pub fn get(&self, landmark: Landmark, min_confidence: f32) -> Option<Keypoint> {
        self.points
            .get(&landmark)
            .copied()
            .filter(|kp| kp.is_valid(min_confidence))
    }

    /// Number of landmarks, regardless of confidence
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no landmarks were reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest `y` among all valid landmarks
    #[must_use]
    pub fn top_y(&self, min_confidence: f32) -> Option<f64> {
        self.points
            .values()
            .filter(|kp| kp.is_valid(min_confidence))
            .map(|kp| kp.y)
            .reduce(f64::min)
    }

    /// Largest `y` among the valid ground-contact landmarks
    #[must_use]
    pub fn ground_y(&self, min_confidence: f32) -> Option<f64> {
        Landmark::GROUND
            .iter()
            .filter_map(|&lm| self.get(lm, min_confidence))
            .map(|kp| kp.y)
            .reduce(f64::max)
    }

    /// Vertical position of the hip midpoint, the reference keypoint for motion
    #[must_use]
    pub fn hip_midpoint_y(&self, min_confidence: f32) -> Option<f64> {
        let left = self.get(Landmark::LeftHip, min_confidence)?;
        let right = self.get(Landmark::RightHip, min_confidence)?;
        Some((left.y + right.y) / 2.0)
    }

    /// All mandatory landmarks detected and at least `margin` px inside the frame
    #[must_use]
    pub fn is_fully_in_frame(&self, width: u32, height: u32, min_confidence: f32, margin: f64) -> bool {
        Landmark::MANDATORY.iter().all(|&lm| {
            self.get(lm, min_confidence)
                .is_some_and(|kp| kp.is_inside(width, height, margin))
        })
    }
}

/// Detector output for one camera frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointFrame {
    /// Monotonic capture time in milliseconds
    pub timestamp_ms: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Detected body, `None` when the detector saw nobody
    #[serde(default)]
    pub body: Option<BodyKeypoints>,
}

impl KeypointFrame {
    /// Frame in which the detector found nobody
    #[must_use]
    pub fn absent(timestamp_ms: u64, width: u32, height: u32) -> Self {
        Self {
            timestamp_ms,
            width,
            height,
            body: None,
        }
    }

    /// Frame with a detected body
    #[must_use]
    pub fn detected(timestamp_ms: u64, width: u32, height: u32, body: BodyKeypoints) -> Self {
        Self {
            timestamp_ms,
            width,
            height,
            body: Some(body),
        }
    }

    /// Presence flag as reported by the detector
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Body, if it is detected with confidence and not clipped by the frame edges
    #[must_use]
    pub fn framed_body(&self, config: &CalibrationConfig) -> Option<&BodyKeypoints> {
        self.body.as_ref().filter(|b| {
            b.is_fully_in_frame(
                self.width,
                self.height,
                config.min_landmark_confidence,
                config.frame_margin_px,
            )
        })
    }

    /// Reference keypoint height for a framed body
    #[must_use]
    pub fn framed_reference_y(&self, config: &CalibrationConfig) -> Option<f64> {
        self.framed_body(config)?
            .hip_midpoint_y(config.min_landmark_confidence)
    }

    /// Reference keypoint height, without requiring the rest of the body to be framed
    #[must_use]
    pub fn reference_y(&self, config: &CalibrationConfig) -> Option<f64> {
        self.body
            .as_ref()?
            .hip_midpoint_y(config.min_landmark_confidence)
    }
}
