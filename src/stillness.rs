//! Stillness detection for the reference keypoint.
//!
//! The subject counts as stationary once the reference keypoint has stayed
//! within a pixel tolerance for a minimum number of samples and a minimum
//! dwell time. A sample that would stretch the range beyond the tolerance
//! starts a new run from that sample, so a single outlier restarts the dwell.
//!
//! Independently of the run, the detector keeps the latest `window_size`
//! samples. Their median is the standing baseline, which one stray sample
//! cannot move.

use crate::config::StillnessConfig;
use std::collections::VecDeque;

/// Sliding-window stillness detector with dwell timing
#[derive(Debug, Clone)]
pub struct StillnessDetector {
    window_size: usize,
    tolerance_px: f64,
    dwell_ms: u64,
    history: VecDeque<f64>,
    run_min: f64,
    run_max: f64,
    run_len: usize,
    run_start_ms: Option<u64>,
}

impl StillnessDetector {
    /// Create a new stillness detector
    #[must_use]
    pub fn new(config: &StillnessConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            tolerance_px: config.tolerance_px,
            dwell_ms: config.dwell_ms,
            history: VecDeque::with_capacity(config.window_size.max(1)),
            run_min: f64::INFINITY,
            run_max: f64::NEG_INFINITY,
            run_len: 0,
            run_start_ms: None,
        }
    }

    /// Add a sample and report whether the subject is now confirmed stationary
    pub fn update(&mut self, timestamp_ms: u64, y: f64) -> bool {
        let run_min = self.run_min.min(y);
        let run_max = self.run_max.max(y);

        if run_max - run_min < self.tolerance_px {
            self.run_min = run_min;
            self.run_max = run_max;
            self.run_len += 1;
        } else {
            self.run_min = y;
            self.run_max = y;
            self.run_len = 1;
            self.run_start_ms = None;
        }

        if self.history.len() >= self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(y);
        let run_start = *self.run_start_ms.get_or_insert(timestamp_ms);

        self.run_len >= self.window_size && timestamp_ms.saturating_sub(run_start) >= self.dwell_ms
    }

    /// Median of the most recent samples, `None` before the first one
    #[must_use]
    pub fn baseline(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        self.history.clear();
        self.run_min = f64::INFINITY;
        self.run_max = f64::NEG_INFINITY;
        self.run_len = 0;
        self.run_start_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StillnessConfig {
        StillnessConfig {
            window_size: 5,
            tolerance_px: 4.0,
            dwell_ms: 200,
        }
    }

    #[test]
    fn test_still_after_window_and_dwell() {
        let mut detector = StillnessDetector::new(&config());
        let mut confirmed_at = None;
        for i in 0..10u64 {
            let y = 400.0 + (i % 3) as f64;
            if detector.update(i * 50, y) && confirmed_at.is_none() {
                confirmed_at = Some(i);
            }
        }
        // Needs 5 samples and 200ms since the first one
        assert_eq!(confirmed_at, Some(4));
    }

    #[test]
    fn test_outlier_restarts_run() {
        let mut detector = StillnessDetector::new(&config());
        for i in 0..4u64 {
            assert!(!detector.update(i * 50, 400.0));
        }
        assert!(!detector.update(200, 430.0));

        let mut confirmed_at = None;
        for i in 5..20u64 {
            if detector.update(i * 50, 430.0) {
                confirmed_at = Some(i);
                break;
            }
        }
        assert_eq!(confirmed_at, Some(8));
    }

    #[test]
    fn test_slow_drift_is_not_still() {
        let mut detector = StillnessDetector::new(&config());
        for i in 0..40u64 {
            assert!(!detector.update(i * 50, 400.0 + i as f64 * 1.5));
        }
    }

    #[test]
    fn test_baseline_ignores_single_outlier() {
        let mut detector = StillnessDetector::new(&config());
        for i in 0..8u64 {
            detector.update(i * 50, 400.0);
        }
        detector.update(400, 414.0);
        assert_eq!(detector.baseline(), Some(400.0));

        // A real change of stance takes over once it fills half the window
        for i in 9..11u64 {
            detector.update(i * 50, 420.0);
        }
        assert_eq!(detector.baseline(), Some(414.0));
        detector.update(550, 420.0);
        assert_eq!(detector.baseline(), Some(420.0));
    }

    #[test]
    fn test_baseline_of_even_window() {
        let mut detector = StillnessDetector::new(&StillnessConfig {
            window_size: 4,
            ..config()
        });
        for (i, y) in [401.0, 399.0, 402.0, 400.0].into_iter().enumerate() {
            detector.update(i as u64 * 50, y);
        }
        assert_eq!(detector.baseline(), Some(400.5));
    }

    #[test]
    fn test_reset() {
        let mut detector = StillnessDetector::new(&config());
        detector.update(0, 400.0);
        assert_eq!(detector.baseline(), Some(400.0));
        detector.reset();
        assert!(detector.baseline().is_none());
    }
}
