//! Threaded measurement session exposing application-level state.
//!
//! A [`JumpSession`] owns one analysis thread. Frames, countdown ticks and
//! control commands all reach that thread through a single channel, so every
//! transition of the underlying [`PhaseDetector`] is applied by exactly one
//! consumer in arrival order. Whichever of countdown expiry or body loss is
//! consumed first decides the outcome; the detector ignores the other.
//!
//! Observers either subscribe to [`SessionEvent`]s or read a
//! [`SessionSnapshot`]. Both are updated once per processed input, after all
//! of its transitions have been applied.

use crate::calibration::CalibrationHeight;
use crate::config::Config;
use crate::countdown::CountdownTimer;
use crate::error::{CalibrationError, MeasurementError};
use crate::keypoints::KeypointFrame;
use crate::phase::{CountdownId, PhaseDetector, PhaseEvent, PhaseInput, PhaseState};
use crate::result::JumpResult;
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Application-level analysis state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    NotStarted,
    WaitingForBody,
    BodyInFrame,
    Countdown,
    Jump,
    Done,
}

impl From<PhaseState> for AnalysisState {
    fn from(phase: PhaseState) -> Self {
        match phase {
            PhaseState::Absent => Self::WaitingForBody,
            PhaseState::Present => Self::BodyInFrame,
            PhaseState::Countdown => Self::Countdown,
            PhaseState::Flight => Self::Jump,
            PhaseState::Complete => Self::Done,
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::WaitingForBody => "WAITING_FOR_BODY",
            Self::BodyInFrame => "BODY_IN_FRAME",
            Self::Countdown => "COUNTDOWN",
            Self::Jump => "JUMP",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Notification delivered to session subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Analysis state changed
    StateChanged(AnalysisState),
    /// Whole seconds left before the jump
    CountdownTick(u32),
    /// The standing body could not be used, the user should step back
    CalibrationFailed(CalibrationError),
    /// Jump measured
    Completed(JumpResult),
    /// Attempt ended without a result, the user should try again
    Aborted(MeasurementError),
}

/// Committed state of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Application-level state
    pub state: AnalysisState,
    /// Seconds left in the countdown, 0 outside of it
    pub countdown: u32,
    /// Result of the last completed attempt
    pub result: Option<JumpResult>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: AnalysisState::NotStarted,
            countdown: 0,
            result: None,
        }
    }
}

/// Monotonic millisecond clock frames must be stamped with
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Milliseconds since the session was created
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

enum Command {
    Frame(KeypointFrame),
    Tick { id: CountdownId, remaining: u32 },
    Start,
    Reset,
    Shutdown,
}

#[derive(Default)]
struct Shared {
    snapshot: SessionSnapshot,
    subscribers: Vec<Sender<SessionEvent>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Jump measurement session running on its own analysis thread
pub struct JumpSession {
    commands: Sender<Command>,
    pending_frames: Arc<AtomicUsize>,
    frame_capacity: usize,
    shared: Arc<Mutex<Shared>>,
    clock: SessionClock,
    worker: Option<JoinHandle<()>>,
}

impl JumpSession {
    /// Create a session for a user of the given height
    pub fn new(config: Config, height: CalibrationHeight) -> Result<Self> {
        config.validate()?;

        let (commands, inbox) = mpsc::channel();
        let pending_frames = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(Mutex::new(Shared::default()));
        let clock = SessionClock::new();

        let worker = Worker {
            detector: PhaseDetector::new(&config, height),
            timer: None,
            started: false,
            tick_interval: Duration::from_millis(config.countdown.tick_interval_ms),
            poll_interval: Duration::from_millis(config.session.poll_interval_ms),
            commands: commands.clone(),
            pending_frames: Arc::clone(&pending_frames),
            shared: Arc::clone(&shared),
            clock,
        };
        let handle = thread::Builder::new()
            .name("jump-analysis".to_string())
            .spawn(move || worker.run(&inbox))
            .map_err(|e| Error::IoError(format!("Failed to spawn analysis thread: {}", e)))?;

        info!("Session created for {}", height);
        Ok(Self {
            commands,
            pending_frames,
            frame_capacity: config.session.frame_queue_capacity,
            shared,
            clock,
            worker: Some(handle),
        })
    }

    /// Create a session using the height stored in the configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let height = config
            .calibration
            .height_cm
            .ok_or_else(|| Error::InvalidInput("Please set your height first".to_string()))?;
        Self::new(config, CalibrationHeight::new(height)?)
    }

    /// Clock to stamp frames with
    #[must_use]
    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    /// Subscribe to session events; the current state is delivered first
    #[must_use]
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        let mut shared = lock(&self.shared);
        // A send can only fail if `rx` is gone, which it is not yet
        let _ = tx.send(SessionEvent::StateChanged(shared.snapshot.state));
        shared.subscribers.push(tx);
        rx
    }

    /// Latest committed state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.shared).snapshot.clone()
    }

    /// Begin looking for a body
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// Abandon the current attempt and return to `NotStarted`
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Queue a frame without blocking.
    ///
    /// Returns `false` when the frame was dropped because the analysis thread
    /// is behind by more than the configured queue capacity.
    pub fn submit_frame(&self, frame: KeypointFrame) -> bool {
        if self.pending_frames.fetch_add(1, Ordering::AcqRel) >= self.frame_capacity {
            self.pending_frames.fetch_sub(1, Ordering::AcqRel);
            debug!("Analysis behind, dropping frame at {}ms", frame.timestamp_ms);
            return false;
        }
        if self.commands.send(Command::Frame(frame)).is_err() {
            self.pending_frames.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::SessionClosed)
    }
}

impl Drop for JumpSession {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Analysis thread panicked");
            }
        }
    }
}

struct Worker {
    detector: PhaseDetector,
    timer: Option<CountdownTimer>,
    started: bool,
    tick_interval: Duration,
    poll_interval: Duration,
    commands: Sender<Command>,
    pending_frames: Arc<AtomicUsize>,
    shared: Arc<Mutex<Shared>>,
    clock: SessionClock,
}

impl Worker {
    fn run(mut self, inbox: &Receiver<Command>) {
        loop {
            match inbox.recv_timeout(self.poll_interval) {
                Ok(Command::Frame(frame)) => {
                    self.pending_frames.fetch_sub(1, Ordering::AcqRel);
                    if self.started {
                        let events = self.detector.handle(PhaseInput::Frame(frame));
                        self.apply(events);
                    }
                }
                Ok(Command::Tick { id, remaining }) => {
                    let now_ms = self.clock.now_ms();
                    let events = self.detector.handle(PhaseInput::CountdownTick { id, remaining, now_ms });
                    self.apply(events);
                }
                Ok(Command::Start) => self.start(),
                Ok(Command::Reset) => self.reset(),
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.started {
                        let events = self.detector.handle(PhaseInput::Clock {
                            now_ms: self.clock.now_ms(),
                        });
                        self.apply(events);
                    }
                }
            }
        }
        self.timer = None;
        debug!("Analysis thread stopped");
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let state = AnalysisState::from(self.detector.phase());
        info!("Analysis started");
        self.publish(|snapshot| {
            snapshot.state = state;
            snapshot.result = None;
            vec![SessionEvent::StateChanged(state)]
        });
    }

    fn reset(&mut self) {
        self.detector.handle(PhaseInput::Reset);
        self.timer = None;
        self.started = false;
        info!("Session reset");
        self.publish(|snapshot| {
            let changed = snapshot.state != AnalysisState::NotStarted;
            *snapshot = SessionSnapshot::default();
            if changed {
                vec![SessionEvent::StateChanged(AnalysisState::NotStarted)]
            } else {
                Vec::new()
            }
        });
    }

    fn apply(&mut self, events: Vec<PhaseEvent>) {
        if events.is_empty() {
            return;
        }

        let mut followups = Vec::new();
        for event in &events {
            match event {
                PhaseEvent::CountdownStarted { id, seconds } => {
                    if let Err(e) = self.start_timer(*id, *seconds) {
                        // Without a timer the countdown can never expire
                        warn!("{}", e);
                        followups = self.detector.handle(PhaseInput::Reset);
                    }
                }
                PhaseEvent::CountdownCancelled(id) => {
                    if self.timer.as_ref().is_some_and(|t| t.id() == *id) {
                        self.timer = None;
                    }
                }
                PhaseEvent::PhaseChanged { to, .. } if *to != PhaseState::Countdown => self.timer = None,
                _ => {}
            }
        }

        self.publish(|snapshot| {
            let mut notifications = Vec::new();
            for event in events {
                match event {
                    PhaseEvent::PhaseChanged { to, .. } => {
                        let state = AnalysisState::from(to);
                        snapshot.state = state;
                        if to != PhaseState::Countdown {
                            snapshot.countdown = 0;
                        }
                        if to != PhaseState::Complete {
                            snapshot.result = None;
                        }
                        notifications.push(SessionEvent::StateChanged(state));
                    }
                    PhaseEvent::CountdownTick(remaining) => {
                        snapshot.countdown = remaining;
                        notifications.push(SessionEvent::CountdownTick(remaining));
                    }
                    PhaseEvent::CalibrationFailed(e) => notifications.push(SessionEvent::CalibrationFailed(e)),
                    PhaseEvent::Completed(result) => {
                        snapshot.result = Some(result.clone());
                        notifications.push(SessionEvent::Completed(result));
                    }
                    PhaseEvent::Aborted(e) => notifications.push(SessionEvent::Aborted(e)),
                    PhaseEvent::Calibrated(_)
                    | PhaseEvent::CountdownStarted { .. }
                    | PhaseEvent::CountdownCancelled(_) => {}
                }
            }
            notifications
        });

        self.apply(followups);
    }

    fn start_timer(&mut self, id: CountdownId, seconds: u32) -> Result<()> {
        let commands = self.commands.clone();
        let timer = CountdownTimer::start(id, seconds, self.tick_interval, move |id, remaining| {
            commands.send(Command::Tick { id, remaining }).is_ok()
        })?;
        self.timer = Some(timer);
        Ok(())
    }

    /// Commit a snapshot change and notify subscribers under one lock
    fn publish<F>(&self, update: F)
    where
        F: FnOnce(&mut SessionSnapshot) -> Vec<SessionEvent>,
    {
        let mut shared = lock(&self.shared);
        let notifications = update(&mut shared.snapshot);
        shared.subscribers.retain(|subscriber| {
            notifications
                .iter()
                .all(|event| subscriber.send(event.clone()).is_ok())
        });
    }
}
