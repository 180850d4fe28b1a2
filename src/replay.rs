//! Offline replay of recorded keypoint streams.
//!
//! Replaying drives a [`PhaseDetector`] directly from a list of frames, with
//! countdown ticks simulated on the frames' own clock instead of a timer
//! thread. A tick is delivered before the first frame stamped at or after its
//! due time, which makes runs deterministic and lets recordings be analysed
//! faster than real time. Gaps between frames are treated like a live clock
//! would see them: a body missing for longer than the dropout debounce is
//! lost before the next frame arrives. The end of the recording counts as
//! the subject leaving the frame.

use crate::calibration::CalibrationHeight;
use crate::config::Config;
use crate::error::MeasurementError;
use crate::keypoints::KeypointFrame;
use crate::phase::{CountdownId, PhaseDetector, PhaseEvent, PhaseInput, PhaseState};
use crate::result::JumpResult;
use crate::{Error, Result};
use std::path::Path;

/// Everything observed while replaying a recording
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    /// Events with the frame-clock time they were emitted at
    pub events: Vec<(u64, PhaseEvent)>,
    /// Attempts that ended without a result
    pub aborts: Vec<MeasurementError>,
    /// First completed jump, replay stops there
    pub result: Option<JumpResult>,
    /// Phase after the last input
    pub final_phase: Option<PhaseState>,
}

impl ReplayOutcome {
    /// Countdown values in the order they were announced
    #[must_use]
    pub fn countdown_ticks(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|(_, e)| match e {
                PhaseEvent::CountdownTick(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Phases entered, in order
    #[must_use]
    pub fn phases(&self) -> Vec<PhaseState> {
        self.events
            .iter()
            .filter_map(|(_, e)| match e {
                PhaseEvent::PhaseChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

struct SimulatedCountdown {
    id: CountdownId,
    due_ms: u64,
    remaining: u32,
}

/// Replay frames through a fresh detector
pub fn replay<I>(config: &Config, height: CalibrationHeight, frames: I) -> ReplayOutcome
where
    I: IntoIterator<Item = KeypointFrame>,
{
    let mut replayer = Replayer {
        detector: PhaseDetector::new(config, height),
        interval: config.countdown.tick_interval_ms,
        countdown: None,
        outcome: ReplayOutcome::default(),
    };

    for frame in frames {
        let ts = frame.timestamp_ms;
        replayer.advance(ts);
        let events = replayer.detector.handle(PhaseInput::Frame(frame));
        replayer.record(ts, events);
        if replayer.outcome.result.is_some() {
            break;
        }
    }

    // Nothing follows the last frame, so every pending deadline passes
    if replayer.outcome.result.is_none() {
        replayer.advance(u64::MAX);
    }

    let mut outcome = replayer.outcome;
    outcome.final_phase = Some(replayer.detector.phase());
    outcome
}

struct Replayer {
    detector: PhaseDetector,
    interval: u64,
    countdown: Option<SimulatedCountdown>,
    outcome: ReplayOutcome,
}

impl Replayer {
    /// Deliver the countdown ticks and clock deadlines that fall before an input at `ts`.
    ///
    /// A deadline must pass strictly before `ts` to fire, since the input at
    /// `ts` may itself bring the body back. Ticks due at `ts` are delivered
    /// before that input, and a deadline due no later than a tick goes first.
    fn advance(&mut self, ts: u64) {
        loop {
            let deadline = self.detector.next_deadline().filter(|&d| d < ts);
            let tick_due = self.countdown.as_ref().map(|c| c.due_ms).filter(|&due| due <= ts);

            match (deadline, tick_due) {
                (Some(deadline), tick) if tick.map_or(true, |due| deadline <= due) => {
                    let events = self.detector.handle(PhaseInput::Clock { now_ms: deadline });
                    self.record(deadline, events);
                }
                (_, Some(_)) => self.tick(),
                (None, None) => return,
                // The first arm's guard always holds when no tick is due
                (Some(_), None) => unreachable!(),
            }
        }
    }

    fn tick(&mut self) {
        let Some(tick) = self.countdown.take() else {
            return;
        };
        self.countdown = (tick.remaining > 0).then(|| SimulatedCountdown {
            id: tick.id,
            due_ms: tick.due_ms + self.interval,
            remaining: tick.remaining - 1,
        });
        let events = self.detector.handle(PhaseInput::CountdownTick {
            id: tick.id,
            remaining: tick.remaining,
            now_ms: tick.due_ms,
        });
        self.record(tick.due_ms, events);
    }

    fn record(&mut self, now_ms: u64, events: Vec<PhaseEvent>) {
        for event in events {
            match &event {
                PhaseEvent::CountdownStarted { id, seconds } => {
                    self.countdown = Some(SimulatedCountdown {
                        id: *id,
                        due_ms: now_ms + self.interval,
                        remaining: seconds.saturating_sub(1),
                    });
                }
                PhaseEvent::CountdownCancelled(_) => self.countdown = None,
                PhaseEvent::Aborted(e) => self.outcome.aborts.push(*e),
                PhaseEvent::Completed(result) => self.outcome.result = Some(result.clone()),
                _ => {}
            }
            self.outcome.events.push((now_ms, event));
        }
    }
}

/// Load a recording saved as a YAML list of frames
pub fn load_recording<P: AsRef<Path>>(path: P) -> Result<Vec<KeypointFrame>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;
    serde_yaml::from_str(&content).map_err(|e| Error::InvalidInput(format!("Failed to parse recording: {}", e)))
}

/// Save frames as a YAML recording
pub fn save_recording<P: AsRef<Path>>(path: P, frames: &[KeypointFrame]) -> Result<()> {
    let content = serde_yaml::to_string(frames)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize recording: {}", e)))?;
    std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))
}
