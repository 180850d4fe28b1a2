//! Jump phase state machine.
//!
//! `PhaseDetector` owns everything a single attempt needs: the current
//! phase, the stillness window, the frozen scale, the countdown and the jump
//! measurer. Every input goes through [`PhaseDetector::handle`], which applies
//! the transition and returns the events it produced, so the detector can be
//! driven by a camera thread, a replayed recording or a test alike.
//!
//! The countdown itself is timed outside the detector. Each countdown gets a
//! fresh [`CountdownId`] and ticks carrying any other id are ignored, so once
//! a countdown has expired or been cancelled nothing can revive it.

use crate::calibration::{compute_scale, CalibrationHeight, ScaleFactor};
use crate::config::{CalibrationConfig, Config, JumpConfig};
use crate::error::{CalibrationError, MeasurementError};
use crate::keypoints::KeypointFrame;
use crate::measurement::{FlightStatus, JumpMeasurer, VerticalTrace};
use crate::result::{aggregate, JumpResult};
use crate::stillness::StillnessDetector;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a jump attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    /// Nobody usable in frame
    Absent,
    /// Body framed, waiting for it to stand still
    Present,
    /// Stillness confirmed, counting down to the jump
    Countdown,
    /// Tracking the jump
    Flight,
    /// Jump measured
    Complete,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "ABSENT",
            Self::Present => "PRESENT",
            Self::Countdown => "COUNTDOWN",
            Self::Flight => "FLIGHT",
            Self::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

/// Identifies one countdown so late ticks from a cancelled timer can be told apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountdownId(u64);

#[cfg(test)]
impl CountdownId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CountdownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input to the state machine
#[derive(Debug, Clone)]
pub enum PhaseInput {
    /// Detector output for one frame
    Frame(KeypointFrame),
    /// Countdown timer tick; `remaining` reaches 0 on expiry
    CountdownTick {
        /// Countdown the tick belongs to
        id: CountdownId,
        /// Whole seconds left
        remaining: u32,
        /// Time of the tick on the frame clock
        now_ms: u64,
    },
    /// Time passing without frames
    Clock {
        /// Current time on the frame clock
        now_ms: u64,
    },
    /// Abandon the attempt
    Reset,
}

/// Observable outcome of a transition
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    /// Phase changed
    PhaseChanged {
        /// Previous phase
        from: PhaseState,
        /// New phase
        to: PhaseState,
    },
    /// Scale computed from the standing body and frozen for the attempt
    Calibrated(ScaleFactor),
    /// Standing body could not be used for calibration
    CalibrationFailed(CalibrationError),
    /// A countdown must now be timed
    CountdownStarted {
        /// Id the timer must attach to its ticks
        id: CountdownId,
        /// Countdown length
        seconds: u32,
    },
    /// Whole seconds left in the countdown
    CountdownTick(u32),
    /// The countdown was abandoned and its timer should stop
    CountdownCancelled(CountdownId),
    /// Jump measured
    Completed(JumpResult),
    /// Flight tracking ended without a jump
    Aborted(MeasurementError),
}

#[derive(Debug, Clone, Copy)]
struct ActiveCountdown {
    id: CountdownId,
    remaining: u32,
}

/// State machine for one measurement session
#[derive(Debug)]
pub struct PhaseDetector {
    calibration: CalibrationConfig,
    jump: JumpConfig,
    countdown_secs: u32,
    debounce_ms: u64,
    height: CalibrationHeight,
    phase: PhaseState,
    stillness: StillnessDetector,
    scale: Option<ScaleFactor>,
    countdown: Option<ActiveCountdown>,
    next_countdown: u64,
    measurer: Option<JumpMeasurer>,
    result: Option<JumpResult>,
    last_body_ms: Option<u64>,
    last_frame_ms: Option<u64>,
}

impl PhaseDetector {
    /// Create a detector in the `Absent` phase
    #[must_use]
    pub fn new(config: &Config, height: CalibrationHeight) -> Self {
        Self {
            calibration: config.calibration.clone(),
            jump: config.jump.clone(),
            countdown_secs: config.countdown.seconds,
            debounce_ms: config.dropout.debounce_ms,
            height,
            phase: PhaseState::Absent,
            stillness: StillnessDetector::new(&config.stillness),
            scale: None,
            countdown: None,
            next_countdown: 0,
            measurer: None,
            result: None,
            last_body_ms: None,
            last_frame_ms: None,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> PhaseState {
        self.phase
    }

    /// Scale of the current attempt, once calibrated
    #[must_use]
    pub fn scale(&self) -> Option<ScaleFactor> {
        self.scale
    }

    /// Seconds left while counting down
    #[must_use]
    pub fn countdown_remaining(&self) -> Option<u32> {
        self.countdown.map(|c| c.remaining)
    }

    /// Trace recorded so far during flight
    #[must_use]
    pub fn trace(&self) -> Option<&VerticalTrace> {
        self.measurer.as_ref().map(JumpMeasurer::trace)
    }

    /// Result of a completed attempt
    #[must_use]
    pub fn result(&self) -> Option<&JumpResult> {
        self.result.as_ref()
    }

    /// Earliest frame-clock time at which a `Clock` input would change the phase.
    ///
    /// This is when the body counts as lost or, in `Flight`, when tracking
    /// times out. Drivers without a live clock feed `Clock` at this time
    /// whenever their next input comes later.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        let dropout = self
            .last_body_ms
            .map_or(0, |seen| seen.saturating_add(self.debounce_ms).saturating_add(1));
        match self.phase {
            PhaseState::Present | PhaseState::Countdown => Some(dropout),
            PhaseState::Flight => Some(
                self.measurer
                    .as_ref()
                    .map_or(dropout, |m| dropout.min(m.timeout_deadline_ms())),
            ),
            PhaseState::Absent | PhaseState::Complete => None,
        }
    }

    /// Apply one input and return the events it produced, in order
    pub fn handle(&mut self, input: PhaseInput) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        match input {
            PhaseInput::Frame(frame) => self.on_frame(&frame, &mut events),
            PhaseInput::CountdownTick { id, remaining, now_ms } => {
                self.on_countdown_tick(id, remaining, now_ms, &mut events);
            }
            PhaseInput::Clock { now_ms } => self.on_clock(now_ms, &mut events),
            PhaseInput::Reset => self.reset(&mut events),
        }
        events
    }

    fn on_frame(&mut self, frame: &KeypointFrame, events: &mut Vec<PhaseEvent>) {
        let ts = frame.timestamp_ms;
        if self.last_frame_ms.is_some_and(|last| ts < last) {
            debug!("Ignoring out-of-order frame at {}ms", ts);
            return;
        }
        self.last_frame_ms = Some(ts);

        match self.phase {
            PhaseState::Absent => {
                if let Some(y) = frame.framed_reference_y(&self.calibration) {
                    self.last_body_ms = Some(ts);
                    self.stillness.reset();
                    self.stillness.update(ts, y);
                    self.transition(PhaseState::Present, events);
                }
            }
            PhaseState::Present => match frame.framed_reference_y(&self.calibration) {
                Some(y) => {
                    self.last_body_ms = Some(ts);
                    if self.stillness.update(ts, y) {
                        self.calibrate(frame, events);
                    }
                }
                None => self.check_dropout(ts, events),
            },
            PhaseState::Countdown => match frame.framed_reference_y(&self.calibration) {
                Some(y) => {
                    self.last_body_ms = Some(ts);
                    // Baseline follows the stance until takeoff tracking starts
                    self.stillness.update(ts, y);
                }
                None => self.check_dropout(ts, events),
            },
            PhaseState::Flight => {
                if let Some(y) = frame.reference_y(&self.calibration) {
                    self.last_body_ms = Some(ts);
                    let status = self.measurer.as_mut().map(|m| m.push(ts, y));
                    if status == Some(FlightStatus::Landed) {
                        self.complete(events);
                        return;
                    }
                } else {
                    self.check_dropout(ts, events);
                }
                self.check_flight_timeout(ts, events);
            }
            PhaseState::Complete => {}
        }
    }

    fn on_countdown_tick(&mut self, id: CountdownId, remaining: u32, now_ms: u64, events: &mut Vec<PhaseEvent>) {
        let Some(countdown) = self.countdown.as_mut().filter(|c| c.id == id) else {
            debug!("Ignoring stale countdown tick {} ({}s)", id, remaining);
            return;
        };
        if remaining >= countdown.remaining {
            return;
        }

        countdown.remaining = remaining;
        events.push(PhaseEvent::CountdownTick(remaining));
        if remaining == 0 {
            self.countdown = None;
            self.start_flight(now_ms, events);
        }
    }

    fn on_clock(&mut self, now_ms: u64, events: &mut Vec<PhaseEvent>) {
        match self.phase {
            PhaseState::Present | PhaseState::Countdown => self.check_dropout(now_ms, events),
            PhaseState::Flight => {
                self.check_dropout(now_ms, events);
                self.check_flight_timeout(now_ms, events);
            }
            PhaseState::Absent | PhaseState::Complete => {}
        }
    }

    fn calibrate(&mut self, frame: &KeypointFrame, events: &mut Vec<PhaseEvent>) {
        match compute_scale(frame, self.height, &self.calibration) {
            Ok(scale) => {
                info!("Calibrated at {} for {}", scale, self.height);
                self.scale = Some(scale);
                events.push(PhaseEvent::Calibrated(scale));

                let id = CountdownId(self.next_countdown);
                self.next_countdown += 1;
                self.countdown = Some(ActiveCountdown {
                    id,
                    remaining: self.countdown_secs,
                });
                self.transition(PhaseState::Countdown, events);
                events.push(PhaseEvent::CountdownStarted {
                    id,
                    seconds: self.countdown_secs,
                });
                events.push(PhaseEvent::CountdownTick(self.countdown_secs));
            }
            Err(e) => {
                warn!("Calibration failed: {}", e);
                self.stillness.reset();
                events.push(PhaseEvent::CalibrationFailed(e));
            }
        }
    }

    fn start_flight(&mut self, now_ms: u64, events: &mut Vec<PhaseEvent>) {
        let baseline = self.stillness.baseline();
        let (Some(baseline), Some(scale)) = (baseline, self.scale) else {
            warn!("No standing baseline when the countdown expired");
            events.push(PhaseEvent::Aborted(MeasurementError::NoTakeoffDetected));
            self.transition(PhaseState::Absent, events);
            return;
        };

        debug!("Flight tracking from baseline {:.1}px", baseline);
        self.measurer = Some(JumpMeasurer::new(&self.jump, baseline, scale, now_ms));
        self.transition(PhaseState::Flight, events);
    }

    fn complete(&mut self, events: &mut Vec<PhaseEvent>) {
        let Some(measurer) = self.measurer.take() else {
            return;
        };
        match measurer.finish() {
            Ok(jump) => {
                let result = aggregate(jump.height_cm, jump.duration_sec, jump.trace, self.height);
                info!("{}", result);
                self.result = Some(result.clone());
                self.transition(PhaseState::Complete, events);
                events.push(PhaseEvent::Completed(result));
            }
            Err(e) => self.abort_flight(e, events),
        }
    }

    fn check_dropout(&mut self, now_ms: u64, events: &mut Vec<PhaseEvent>) {
        let lost = self
            .last_body_ms
            .map_or(true, |seen| now_ms.saturating_sub(seen) > self.debounce_ms);
        if !lost {
            return;
        }

        match self.phase {
            PhaseState::Present => {
                info!("Body left the frame");
                self.stillness.reset();
                self.transition(PhaseState::Absent, events);
            }
            PhaseState::Countdown => {
                info!("Body left the frame during the countdown");
                self.cancel_countdown(events);
                self.stillness.reset();
                self.transition(PhaseState::Absent, events);
            }
            PhaseState::Flight => {
                let error = self
                    .measurer
                    .as_ref()
                    .map_or(MeasurementError::NoTakeoffDetected, JumpMeasurer::abort);
                self.abort_flight(error, events);
            }
            PhaseState::Absent | PhaseState::Complete => {}
        }
    }

    fn check_flight_timeout(&mut self, now_ms: u64, events: &mut Vec<PhaseEvent>) {
        if self.phase != PhaseState::Flight {
            return;
        }
        let timed_out = self
            .measurer
            .as_ref()
            .filter(|m| m.is_timed_out(now_ms))
            .map(JumpMeasurer::abort);
        if let Some(error) = timed_out {
            info!("Flight tracking timed out");
            self.abort_flight(error, events);
        }
    }

    fn abort_flight(&mut self, error: MeasurementError, events: &mut Vec<PhaseEvent>) {
        warn!("Jump aborted: {}", error);
        self.measurer = None;
        self.stillness.reset();
        events.push(PhaseEvent::Aborted(error));
        self.transition(PhaseState::Absent, events);
    }

    fn cancel_countdown(&mut self, events: &mut Vec<PhaseEvent>) {
        if let Some(countdown) = self.countdown.take() {
            debug!("Cancelling countdown {}", countdown.id);
            events.push(PhaseEvent::CountdownCancelled(countdown.id));
        }
    }

    fn reset(&mut self, events: &mut Vec<PhaseEvent>) {
        self.cancel_countdown(events);
        self.stillness.reset();
        self.measurer = None;
        self.scale = None;
        self.result = None;
        self.last_body_ms = None;
        self.last_frame_ms = None;
        self.transition(PhaseState::Absent, events);
    }

    fn transition(&mut self, to: PhaseState, events: &mut Vec<PhaseEvent>) {
        let from = self.phase;
        if from == to {
            return;
        }
        info!("Phase {} -> {}", from, to);
        self.phase = to;
        events.push(PhaseEvent::PhaseChanged { from, to });
    }
}
