//! Jump analysis over recorded keypoint streams.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use vertimeter::{
    calibration::CalibrationHeight,
    config::{Config, EXAMPLE_CONFIG},
    keypoints::KeypointFrame,
    phase::PhaseEvent,
    replay,
    result::JumpResult,
    session::{JumpSession, SessionEvent},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Your standing height in centimeters
    #[arg(long)]
    height: Option<u32>,

    /// Keypoint recording to analyse (YAML list of frames)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Override the countdown length in seconds
    #[arg(long)]
    countdown: Option<u32>,

    /// Play the recording through a live session at its original pace
    #[arg(long)]
    realtime: bool,

    /// Write an example configuration file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if let Some(path) = &args.write_config {
        std::fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("writing {}", path.display()))?;
        info!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(height) = args.height {
        config.calibration.height_cm = Some(height);
    }
    if let Some(seconds) = args.countdown {
        config.countdown.seconds = seconds;
    }
    config.validate()?;

    let Some(height) = config.calibration.height_cm else {
        bail!("Please set your height first (--height <cm>)");
    };
    let height = CalibrationHeight::new(height)?;

    let Some(input) = &args.input else {
        bail!("No recording given (--input <file>)");
    };
    let frames = replay::load_recording(input)?;
    info!("Loaded {} frames from {}", frames.len(), input.display());

    let result = if args.realtime {
        run_realtime(config, height, frames)?
    } else {
        run_replay(&config, height, frames)
    };

    match result {
        Some(result) => {
            print!("{}", serde_yaml::to_string(&result)?);
            println!("{}", result);
            Ok(())
        }
        None => bail!("Jump not detected, try again"),
    }
}

fn run_replay(config: &Config, height: CalibrationHeight, frames: Vec<KeypointFrame>) -> Option<JumpResult> {
    let outcome = replay::replay(config, height, frames);
    for (ts, event) in &outcome.events {
        match event {
            PhaseEvent::PhaseChanged { to, .. } => println!("[{:>7}ms] {}", ts, to),
            PhaseEvent::CountdownTick(n) => println!("[{:>7}ms] countdown {}", ts, n),
            PhaseEvent::CalibrationFailed(e) => println!("[{:>7}ms] {}", ts, e),
            PhaseEvent::Aborted(e) => println!("[{:>7}ms] {}", ts, e),
            _ => {}
        }
    }
    outcome.result
}

fn run_realtime(config: Config, height: CalibrationHeight, frames: Vec<KeypointFrame>) -> Result<Option<JumpResult>> {
    let settle = Duration::from_millis(config.dropout.debounce_ms + config.jump.max_flight_ms);
    let session = JumpSession::new(config, height)?;
    let events = session.subscribe();
    let clock = session.clock();
    session.start()?;

    let origin = Instant::now();
    let first_ms = frames.first().map_or(0, |f| f.timestamp_ms);
    let mut dropped = 0usize;
    let mut outcome = None;

    for mut frame in frames {
        let due = Duration::from_millis(frame.timestamp_ms.saturating_sub(first_ms));
        std::thread::sleep(due.saturating_sub(origin.elapsed()));
        frame.timestamp_ms = clock.now_ms();
        if !session.submit_frame(frame) {
            dropped += 1;
        }
        if let Some(done) = drain(&events, Duration::ZERO)? {
            outcome = Some(done);
            break;
        }
    }
    if dropped > 0 {
        warn!("{} frames dropped while the analysis was busy", dropped);
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => drain(&events, settle)?.unwrap_or(None),
    };
    session.reset()?;
    Ok(outcome)
}

/// Print session events until an attempt finishes or `wait` passes without one
fn drain(
    events: &std::sync::mpsc::Receiver<SessionEvent>,
    wait: Duration,
) -> Result<Option<Option<JumpResult>>> {
    let deadline = Instant::now() + wait;
    loop {
        let timeout = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(timeout) {
            Ok(SessionEvent::StateChanged(state)) => println!("{}", state),
            Ok(SessionEvent::CountdownTick(n)) => println!("countdown {}", n),
            Ok(SessionEvent::CalibrationFailed(e)) => println!("{}", e),
            Ok(SessionEvent::Completed(result)) => return Ok(Some(Some(result))),
            Ok(SessionEvent::Aborted(e)) => {
                println!("{}", e);
                return Ok(Some(None));
            }
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("Analysis session stopped unexpectedly"),
        }
    }
}
