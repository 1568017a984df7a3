use std::sync::mpsc;
use std::time::{Duration, Instant};

use intervalz::cues::Silent;
use intervalz::recording::{JournalRecorder, RecorderHandle};
use intervalz::runtime::{AppEvent, ChannelEventSource, FixedTicker, Runner};
use intervalz::session::{RecordingStatus, SessionConfig, SessionController, SessionState};
use intervalz::workout::{Group, Interval, Workout};

// Headless runs of the session loop: Runner + SessionController without a TTY.

fn short_workout() -> Workout {
    Workout::new(
        "Short",
        2,
        vec![
            Group::new(0, 2, vec![Interval::new("Work", 3, 0)]).named("Main"),
            Group::new(1, 1, vec![Interval::new("Cool", 2, 0)]).named("Cooldown"),
        ],
    )
}

/// Drive ticks and recorder completions until the session ends and the
/// recording settles, or the step budget runs out.
fn drive(
    controller: &mut SessionController,
    runner: &mut Runner<ChannelEventSource, FixedTicker>,
    max_steps: u32,
) -> u32 {
    let mut ticks = 0;
    for _ in 0..max_steps {
        match runner.step() {
            AppEvent::Tick => {
                controller.on_tick();
                ticks += 1;
            }
            AppEvent::Recorder(ev) => controller.handle_recorder_event(ev),
            AppEvent::Key(_) | AppEvent::Resize => {}
        }

        let settled = !matches!(
            controller.snapshot().recording,
            RecordingStatus::Pending | RecordingStatus::Active | RecordingStatus::Finalizing
        );
        if controller.state() == SessionState::Ended && settled {
            break;
        }
    }
    ticks
}

#[test]
fn headless_workout_runs_to_completion() {
    let (_tx, rx) = mpsc::channel();
    let mut runner = Runner::new(ChannelEventSource::new(rx), FixedTicker::new(Duration::from_millis(2)));

    let mut controller = SessionController::new(
        short_workout(),
        SessionConfig::default(),
        RecorderHandle::disabled(),
        Box::new(Silent),
    );
    let snapshots = controller.subscribe();
    controller.start().unwrap();

    let ticks = drive(&mut controller, &mut runner, 200);

    // Work 3 + Rest 2 + Work 3 + Rest 2 + Cool 2
    assert_eq!(ticks, 12);
    assert_eq!(controller.state(), SessionState::Ended);

    let seen: Vec<_> = snapshots.try_iter().collect();
    let phase_names: Vec<_> = seen
        .windows(2)
        .filter(|w| w[0].overall_step_index != w[1].overall_step_index)
        .filter(|w| w[1].session_state != SessionState::Ended)
        .map(|w| w[1].current_phase_name.clone())
        .collect();
    assert_eq!(phase_names, vec!["Rest", "Work", "Rest", "Cool"]);

    let last = seen.last().unwrap();
    assert_eq!(last.session_state, SessionState::Ended);
    assert_eq!(last.current_group_name, "Cooldown");
    assert_eq!(last.recording, RecordingStatus::Disabled);
}

#[test]
fn headless_pause_holds_the_countdown() {
    let (_tx, rx) = mpsc::channel();
    let mut runner = Runner::new(ChannelEventSource::new(rx), FixedTicker::new(Duration::from_millis(2)));

    let mut controller = SessionController::new(
        short_workout(),
        SessionConfig::default(),
        RecorderHandle::disabled(),
        Box::new(Silent),
    );
    controller.start().unwrap();

    if let AppEvent::Tick = runner.step() {
        controller.on_tick();
    }
    assert_eq!(controller.snapshot().time_remaining, 2);

    controller.pause();
    for _ in 0..5 {
        if let AppEvent::Tick = runner.step() {
            controller.on_tick();
        }
    }
    assert_eq!(controller.snapshot().time_remaining, 2);
    assert_eq!(controller.state(), SessionState::Paused);

    controller.resume();
    runner.reset_schedule();
    let ticks = drive(&mut controller, &mut runner, 200);
    assert_eq!(ticks, 11);
}

#[test]
fn headless_session_is_journaled_through_the_event_queue() {
    let (tx, rx) = mpsc::channel();
    let mut runner = Runner::new(ChannelEventSource::new(rx), FixedTicker::new(Duration::from_millis(2)));

    let journal = JournalRecorder::open_in_memory().unwrap();
    let recorder = RecorderHandle::spawn(journal, tx.clone());

    let mut controller =
        SessionController::new(short_workout(), SessionConfig::default(), recorder, Box::new(Silent));
    controller.start().unwrap();
    assert_eq!(controller.snapshot().recording, RecordingStatus::Pending);

    let started = Instant::now();
    drive(&mut controller, &mut runner, 500);
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(controller.state(), SessionState::Ended);
    match controller.snapshot().recording {
        RecordingStatus::Saved(summary) => {
            assert_eq!(summary.workout_name, "Short");
            assert!(summary.duration_secs >= 0);
            assert!(summary.ended_at >= summary.started_at);
        }
        other => panic!("expected a saved recording, got {:?}", other),
    }
}

#[test]
fn headless_early_end_still_finalizes() {
    let (tx, rx) = mpsc::channel();
    let mut runner = Runner::new(ChannelEventSource::new(rx), FixedTicker::new(Duration::from_millis(2)));

    let recorder = RecorderHandle::spawn(JournalRecorder::open_in_memory().unwrap(), tx);
    let mut controller =
        SessionController::new(short_workout(), SessionConfig::default(), recorder, Box::new(Silent));
    controller.start().unwrap();

    if let AppEvent::Tick = runner.step() {
        controller.on_tick();
    }
    controller.end();
    let frozen = controller.snapshot();
    assert_eq!(frozen.session_state, SessionState::Ended);
    assert_eq!(frozen.current_phase_name, "Work");

    drive(&mut controller, &mut runner, 500);

    let last = controller.snapshot();
    assert_eq!(last.time_remaining, frozen.time_remaining);
    assert_eq!(last.overall_step_index, frozen.overall_step_index);
    assert!(matches!(last.recording, RecordingStatus::Saved(_)));
}
