//! State machine behaviour driven through the public input API


use proptest::prelude::*;
use test_helpers::*;
use vertimeter::config::Config;
use vertimeter::keypoints::{BodyKeypoints, Keypoint, KeypointFrame, Landmark};
use vertimeter::phase::{CountdownId, PhaseDetector, PhaseEvent, PhaseInput, PhaseState};
use vertimeter::MeasurementError;

fn detector() -> PhaseDetector {
    PhaseDetector::new(&Config::default(), height_180())
}

fn feed(d: &mut PhaseDetector, frames: Vec<KeypointFrame>) -> Vec<PhaseEvent> {
    frames
        .into_iter()
        .flat_map(|f| d.handle(PhaseInput::Frame(f)))
        .collect()
}

fn entered(events: &[PhaseEvent], phase: PhaseState) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PhaseEvent::PhaseChanged { to, .. } if *to == phase))
        .count()
}

/// Drive a fresh detector to `Countdown`, returning the live countdown id
fn into_countdown(d: &mut PhaseDetector) -> CountdownId {
    let events = feed(d, standing_frames(0, 21));
    countdown_started(&events).expect("countdown after one second of standing")
}

/// Drive a detector through the countdown into `Flight` at 7000ms
fn into_flight(d: &mut PhaseDetector) {
    let id = into_countdown(d);
    for (i, remaining) in (0..6u32).rev().enumerate() {
        d.handle(PhaseInput::CountdownTick {
            id,
            remaining,
            now_ms: 2000 + i as u64 * 1000,
        });
    }
    assert_eq!(d.phase(), PhaseState::Flight);
}

#[test]
fn test_stationary_body_starts_countdown_exactly_once() {
    let mut d = detector();
    let events = feed(&mut d, standing_frames(0, 60));

    assert_eq!(entered(&events, PhaseState::Present), 1);
    assert_eq!(entered(&events, PhaseState::Countdown), 1);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, PhaseEvent::CountdownStarted { .. }))
            .count(),
        1
    );
    assert_eq!(d.phase(), PhaseState::Countdown);
}

#[test]
fn test_countdown_waits_for_dwell() {
    let mut d = detector();
    feed(&mut d, standing_frames(0, 20));
    // 950ms of standing is not enough
    assert_eq!(d.phase(), PhaseState::Present);
    feed(&mut d, vec![frame(1000, STANDING_HIP_Y)]);
    assert_eq!(d.phase(), PhaseState::Countdown);
}

#[test]
fn test_outlier_restarts_dwell_without_leaving_present() {
    let mut d = detector();
    feed(&mut d, standing_frames(0, 16));
    feed(&mut d, vec![frame(800, STANDING_HIP_Y + 40.0)]);
    assert_eq!(d.phase(), PhaseState::Present);

    // Back in place at 850ms, the dwell counts from there
    let resumed: Vec<_> = (17..=36u64).map(|i| frame(i * FRAME_MS, STANDING_HIP_Y)).collect();
    feed(&mut d, resumed);
    assert_eq!(d.phase(), PhaseState::Present);

    feed(&mut d, vec![frame(1850, STANDING_HIP_Y)]);
    assert_eq!(d.phase(), PhaseState::Countdown);
}

#[test]
fn test_clipped_body_is_not_present() {
    let mut d = detector();
    // Ankles 900px down in a 720px frame
    let events = feed(&mut d, vec![frame(0, 600.0)]);
    assert!(events.is_empty());
    assert_eq!(d.phase(), PhaseState::Absent);
}

#[test]
fn test_countdown_ticks_in_order_then_flight() {
    let mut d = detector();
    let id = into_countdown(&mut d);
    assert_eq!(d.countdown_remaining(), Some(6));

    let mut ticks = vec![];
    let mut events = vec![];
    for (i, remaining) in (0..6u32).rev().enumerate() {
        let batch = d.handle(PhaseInput::CountdownTick {
            id,
            remaining,
            now_ms: 2000 + i as u64 * 1000,
        });
        ticks.extend(batch.iter().filter_map(|e| match e {
            PhaseEvent::CountdownTick(n) => Some(*n),
            _ => None,
        }));
        events.extend(batch);
    }

    assert_eq!(ticks, vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(entered(&events, PhaseState::Flight), 1);
    assert!(d.trace().is_some_and(|t| t.is_empty()));
}

#[test]
fn test_body_loss_during_flight_before_takeoff() {
    let mut d = detector();
    into_flight(&mut d);
    feed(&mut d, standing_frames(7000, 4));

    let events = feed(&mut d, vec![absent(7200), absent(7500)]);
    assert!(events.is_empty());
    let events = feed(&mut d, vec![absent(7651)]);
    assert_eq!(
        events,
        vec![
            PhaseEvent::Aborted(MeasurementError::NoTakeoffDetected),
            PhaseEvent::PhaseChanged {
                from: PhaseState::Flight,
                to: PhaseState::Absent
            },
        ]
    );
    assert!(d.result().is_none());
}

#[test]
fn test_flight_timeout_after_takeoff() {
    let mut d = detector();
    into_flight(&mut d);
    feed(&mut d, jump_frames(7000, &[60.0, 80.0, 90.0]));
    assert_eq!(d.phase(), PhaseState::Flight);

    // Hanging in the air past the flight limit
    let stuck: Vec<_> = (3..=101u64)
        .map(|i| frame(7000 + i * FRAME_MS, STANDING_HIP_Y - 90.0))
        .collect();
    let events = feed(&mut d, stuck);
    assert!(events.contains(&PhaseEvent::Aborted(MeasurementError::NoLandingDetected)));
    assert_eq!(d.phase(), PhaseState::Absent);
    assert!(d.result().is_none());
}

#[test]
fn test_partial_body_keeps_flight_alive() {
    let mut d = detector();
    into_flight(&mut d);
    // Only the hips are visible at the top of the jump
    let hips_only = BodyKeypoints::new()
        .with(Landmark::LeftHip, Keypoint::new(305.0, 300.0, 0.9))
        .with(Landmark::RightHip, Keypoint::new(335.0, 300.0, 0.9));
    feed(&mut d, jump_frames(7000, &[60.0]));
    feed(
        &mut d,
        vec![
            KeypointFrame::detected(7050, WIDTH, HEIGHT, hips_only.clone()),
            KeypointFrame::detected(7600, WIDTH, HEIGHT, hips_only),
        ],
    );
    assert_eq!(d.phase(), PhaseState::Flight);
    assert_eq!(d.trace().map(|t| t.len()), Some(3));
}

#[test]
fn test_complete_ignores_further_frames() {
    let mut d = detector();
    into_flight(&mut d);
    let events = feed(&mut d, jump_frames(7000, &HALF_SECOND_JUMP));
    assert_eq!(entered(&events, PhaseState::Complete), 1);

    let result = d.result().cloned().expect("completed jump");
    assert!((result.jump_height_cm() - 30.0).abs() < 1e-9);
    assert!((result.jump_duration_sec() - 0.5).abs() < 1e-12);

    assert!(feed(&mut d, standing_frames(8000, 20)).is_empty());
    assert!(d.handle(PhaseInput::Clock { now_ms: 60_000 }).is_empty());
    assert_eq!(d.result(), Some(&result));
}

fn assert_reset_clears(d: &mut PhaseDetector) {
    d.handle(PhaseInput::Reset);
    assert_eq!(d.phase(), PhaseState::Absent);
    assert!(d.scale().is_none());
    assert!(d.countdown_remaining().is_none());
    assert!(d.trace().is_none());
    assert!(d.result().is_none());

    assert!(d.handle(PhaseInput::Reset).is_empty());
    assert_eq!(d.phase(), PhaseState::Absent);
}

#[test]
fn test_reset_from_every_phase() {
    let mut d = detector();
    assert_reset_clears(&mut d);

    let mut d = detector();
    feed(&mut d, standing_frames(0, 5));
    assert_eq!(d.phase(), PhaseState::Present);
    assert_reset_clears(&mut d);

    let mut d = detector();
    into_countdown(&mut d);
    assert_reset_clears(&mut d);

    let mut d = detector();
    into_flight(&mut d);
    feed(&mut d, jump_frames(7000, &[50.0, 80.0, 95.0]));
    assert_eq!(d.trace().map(|t| t.len()), Some(3));
    assert_reset_clears(&mut d);

    let mut d = detector();
    into_flight(&mut d);
    feed(&mut d, jump_frames(7000, &HALF_SECOND_JUMP));
    assert_eq!(d.phase(), PhaseState::Complete);
    assert_reset_clears(&mut d);
}

#[test]
fn test_detector_is_reusable_after_reset() {
    let mut d = detector();
    let first = into_countdown(&mut d);
    d.handle(PhaseInput::Reset);
    let second = into_countdown(&mut d);
    assert_ne!(first, second);

    // The old countdown can no longer expire
    assert!(d
        .handle(PhaseInput::CountdownTick { id: first, remaining: 0, now_ms: 1100 })
        .is_empty());
    assert_eq!(d.phase(), PhaseState::Countdown);
}

fn unusable_frame(ts: u64, kind: u8) -> KeypointFrame {
    match kind {
        0 => absent(ts),
        1 => frame(ts, 600.0),
        2 => KeypointFrame::detected(ts, WIDTH, HEIGHT, BodyKeypoints::new()),
        _ => {
            let faint = BodyKeypoints::new()
                .with(Landmark::LeftShoulder, Keypoint::new(300.0, 100.0, 0.1))
                .with(Landmark::RightShoulder, Keypoint::new(340.0, 100.0, 0.1))
                .with(Landmark::LeftHip, Keypoint::new(305.0, 400.0, 0.1))
                .with(Landmark::RightHip, Keypoint::new(335.0, 400.0, 0.1))
                .with(Landmark::LeftAnkle, Keypoint::new(305.0, 700.0, 0.1))
                .with(Landmark::RightAnkle, Keypoint::new(335.0, 700.0, 0.1));
            KeypointFrame::detected(ts, WIDTH, HEIGHT, faint)
        }
    }
}

proptest! {
    #[test]
    fn prop_unusable_frames_never_start_a_countdown(
        steps in prop::collection::vec((1u64..400, 0u8..5), 1..200)
    ) {
        let mut d = detector();
        let mut ts = 0;
        for (delta, kind) in steps {
            ts += delta;
            let input = if kind == 4 {
                PhaseInput::Clock { now_ms: ts }
            } else {
                PhaseInput::Frame(unusable_frame(ts, kind))
            };
            let events = d.handle(input);
            prop_assert!(events.is_empty());
            prop_assert_eq!(d.phase(), PhaseState::Absent);
        }
    }

    #[test]
    fn prop_countdown_only_decreases(
        ticks in prop::collection::vec((0u32..9, any::<bool>()), 0..40)
    ) {
        let mut d = detector();
        let stale = into_countdown(&mut d);
        d.handle(PhaseInput::Reset);
        let live = into_countdown(&mut d);

        let mut announced = vec![6];
        let mut flights = 0;
        for (i, (remaining, is_live)) in ticks.iter().enumerate() {
            let id = if *is_live { live } else { stale };
            let events = d.handle(PhaseInput::CountdownTick {
                id,
                remaining: *remaining,
                now_ms: 2000 + i as u64,
            });
            for event in events {
                match event {
                    PhaseEvent::CountdownTick(n) => announced.push(n),
                    PhaseEvent::PhaseChanged { to: PhaseState::Flight, .. } => flights += 1,
                    _ => {}
                }
            }
        }

        prop_assert!(announced.windows(2).all(|w| w[1] < w[0]));
        let expired = ticks.iter().any(|(remaining, is_live)| *is_live && *remaining == 0);
        prop_assert_eq!(flights, usize::from(expired));
        prop_assert_eq!(d.phase() == PhaseState::Flight, expired);
    }
}
