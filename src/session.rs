use std::sync::mpsc::{self, Receiver, Sender};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::{Clock, Tick};
use crate::config::Config;
use crate::cues::PhaseCue;
use crate::plan::{PlanError, WorkoutPlan};
use crate::recording::{RecordedSummary, RecorderEvent, RecorderHandle};
use crate::sequencer::{Phase, PhaseSequencer, INDEFINITE_REPEAT_CAP};
use crate::store::{PlanSource, StoreError};
use crate::workout::Workout;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub repeat_cap: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            repeat_cap: INDEFINITE_REPEAT_CAP,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            repeat_cap: cfg.indefinite_repeat_cap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionState {
    #[strum(to_string = "Not started")]
    NotStarted,
    Running,
    Paused,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStatus {
    Disabled,
    Pending,
    Active,
    Finalizing,
    Failed(String),
    Saved(RecordedSummary),
}

/// Immutable view of the session handed to renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub workout_name: String,
    pub session_state: SessionState,
    pub is_rest_period: bool,
    pub current_phase_name: String,
    pub time_remaining: u32,
    pub current_group_name: String,
    pub current_repetition: u32,
    /// `0` when the current group repeats indefinitely
    pub total_repetitions: u32,
    pub overall_step_index: u64,
    pub recording: RecordingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    NoOp,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("failed to load workout: {0}")]
    Source(#[from] StoreError),
}

/// Drives one workout run: lifecycle state, countdown and phase sequencing.
///
/// All methods are meant to be called from a single loop. Recorder results
/// re-enter through [`SessionController::handle_recorder_event`].
pub struct SessionController {
    workout: Workout,
    config: SessionConfig,
    state: SessionState,
    sequencer: Option<PhaseSequencer>,
    clock: Clock,
    recorder: RecorderHandle,
    cue: Box<dyn PhaseCue>,
    snapshot: SessionSnapshot,
    subscribers: Vec<Sender<SessionSnapshot>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("workout", &self.workout.id)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl SessionController {
    pub fn new(
        workout: Workout,
        config: SessionConfig,
        recorder: RecorderHandle,
        cue: Box<dyn PhaseCue>,
    ) -> Self {
        let snapshot = initial_snapshot(&workout, &config, &recorder);

        Self {
            workout,
            config,
            state: SessionState::NotStarted,
            sequencer: None,
            clock: Clock::new(),
            recorder,
            cue,
            snapshot,
            subscribers: Vec::new(),
        }
    }

    /// Fetch the workout from a plan source and set up a session for it
    pub fn load<S: PlanSource + ?Sized>(
        source: &S,
        workout_id: Uuid,
        config: SessionConfig,
        recorder: RecorderHandle,
        cue: Box<dyn PhaseCue>,
    ) -> Result<Self, SessionError> {
        let workout = source.fetch_workout(workout_id)?;
        Ok(Self::new(workout, config, recorder, cue))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.clone()
    }

    /// Every snapshot published from now on is pushed to the returned receiver,
    /// starting with the current one.
    pub fn subscribe(&mut self) -> Receiver<SessionSnapshot> {
        let (tx, rx) = mpsc::channel();
        if tx.send(self.snapshot.clone()).is_ok() {
            self.subscribers.push(tx);
        }
        rx
    }

    pub fn start(&mut self) -> Result<ControlOutcome, SessionError> {
        if self.state != SessionState::NotStarted {
            return Ok(ControlOutcome::NoOp);
        }

        let plan = WorkoutPlan::build(&self.workout)?;
        let sequencer = PhaseSequencer::new(plan, self.config.repeat_cap);
        let now = Utc::now();

        self.clock.load(sequencer.current_phase().duration_secs());
        self.sequencer = Some(sequencer);

        if self.recorder.is_enabled() {
            self.snapshot.recording = RecordingStatus::Pending;
            if let Err(e) = self.recorder.begin(now, self.workout.display_name()) {
                tracing::warn!("could not begin recording: {}", e);
                self.snapshot.recording = RecordingStatus::Failed(e.to_string());
            }
        }

        self.clock.start();
        self.state = SessionState::Running;
        tracing::info!(workout = %self.workout.display_name(), "session started");
        self.publish();

        Ok(ControlOutcome::Applied)
    }

    pub fn pause(&mut self) -> ControlOutcome {
        if self.state != SessionState::Running {
            return ControlOutcome::NoOp;
        }

        self.clock.pause();
        self.state = SessionState::Paused;
        tracing::info!(remaining = self.clock.remaining_secs(), "session paused");
        self.publish();
        ControlOutcome::Applied
    }

    pub fn resume(&mut self) -> ControlOutcome {
        if self.state != SessionState::Paused {
            return ControlOutcome::NoOp;
        }

        self.clock.resume();
        self.state = SessionState::Running;
        tracing::info!(remaining = self.clock.remaining_secs(), "session resumed");
        self.publish();
        ControlOutcome::Applied
    }

    pub fn toggle_pause(&mut self) -> ControlOutcome {
        match self.state {
            SessionState::Running => self.pause(),
            SessionState::Paused => self.resume(),
            _ => ControlOutcome::NoOp,
        }
    }

    pub fn end(&mut self) -> ControlOutcome {
        match self.state {
            SessionState::Running | SessionState::Paused => {
                self.finish();
                ControlOutcome::Applied
            }
            SessionState::NotStarted | SessionState::Ended => ControlOutcome::NoOp,
        }
    }

    /// Apply one clock tick. A tick that finishes a phase advances exactly once.
    pub fn on_tick(&mut self) -> Tick {
        if self.state != SessionState::Running {
            return Tick::Idle;
        }

        let tick = self.clock.tick();
        match tick {
            Tick::Idle => {}
            Tick::Counting { .. } => self.publish(),
            Tick::PhaseFinished => {
                let Some(sequencer) = self.sequencer.as_mut() else {
                    return Tick::Idle;
                };
                let finished = sequencer.current_phase();
                let next = sequencer.advance();
                self.cue.phase_finished(&finished, &next);

                if next == Phase::Ended {
                    self.finish();
                } else {
                    self.clock.load(next.duration_secs());
                    self.publish();
                }
            }
        }
        tick
    }

    /// Apply a recorder completion. Only the recording status changes.
    pub fn handle_recorder_event(&mut self, event: RecorderEvent) {
        let status = match event {
            RecorderEvent::Began(Ok(())) => match self.snapshot.recording {
                RecordingStatus::Pending => RecordingStatus::Active,
                ref other => other.clone(),
            },
            RecorderEvent::Ended(Ok(())) => self.snapshot.recording.clone(),
            RecorderEvent::Finalized(Ok(summary)) => {
                tracing::info!(session = %summary.session_id, secs = summary.duration_secs, "recording saved");
                RecordingStatus::Saved(summary)
            }
            RecorderEvent::Began(Err(e))
            | RecorderEvent::Ended(Err(e))
            | RecorderEvent::Finalized(Err(e)) => {
                tracing::warn!("recorder failed: {}", e);
                match self.snapshot.recording {
                    RecordingStatus::Failed(ref first) => RecordingStatus::Failed(first.clone()),
                    _ => RecordingStatus::Failed(e.to_string()),
                }
            }
        };

        if status != self.snapshot.recording {
            self.snapshot.recording = status;
            self.publish();
        }
    }

    fn finish(&mut self) {
        self.clock.stop();
        self.state = SessionState::Ended;
        let ended_at = Utc::now();

        if self.recorder.is_enabled() && !matches!(self.snapshot.recording, RecordingStatus::Failed(_)) {
            self.snapshot.recording = RecordingStatus::Finalizing;
        }
        if let Err(e) = self.recorder.end_and_finalize(ended_at) {
            tracing::warn!("could not finalize recording: {}", e);
            if !matches!(self.snapshot.recording, RecordingStatus::Failed(_)) {
                self.snapshot.recording = RecordingStatus::Failed(e.to_string());
            }
        }

        tracing::info!(
            steps = self.sequencer.as_ref().map(|s| s.cursor().overall_step_index),
            "session ended"
        );
        self.publish();
    }

    fn publish(&mut self) {
        self.refresh_snapshot();
        let snapshot = self.snapshot.clone();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot.session_state = self.state;
        self.snapshot.time_remaining = self.clock.remaining_secs();

        let Some(sequencer) = &self.sequencer else {
            return;
        };
        self.snapshot.overall_step_index = sequencer.cursor().overall_step_index;

        match sequencer.current_phase() {
            Phase::Work(work) => {
                self.snapshot.is_rest_period = false;
                self.snapshot.current_phase_name = work.interval.name;
                self.snapshot.current_group_name = work.group_name;
                self.snapshot.current_repetition = work.repetition;
                self.snapshot.total_repetitions = work.total_repetitions;
            }
            Phase::Rest { .. } => {
                self.snapshot.is_rest_period = true;
                self.snapshot.current_phase_name = "Rest".to_string();
            }
            // an ended session keeps showing where it stopped
            Phase::Ended => {}
        }
    }
}

fn initial_snapshot(workout: &Workout, config: &SessionConfig, recorder: &RecorderHandle) -> SessionSnapshot {
    let mut snapshot = SessionSnapshot {
        workout_name: workout.display_name().to_string(),
        session_state: SessionState::NotStarted,
        is_rest_period: false,
        current_phase_name: "Empty Workout".to_string(),
        time_remaining: 0,
        current_group_name: String::new(),
        current_repetition: 0,
        total_repetitions: 0,
        overall_step_index: 0,
        recording: if recorder.is_enabled() {
            RecordingStatus::Pending
        } else {
            RecordingStatus::Disabled
        },
    };

    if let Ok(plan) = WorkoutPlan::build(workout) {
        if let Phase::Work(work) = PhaseSequencer::new(plan, config.repeat_cap).current_phase() {
            snapshot.current_phase_name = work.interval.name;
            snapshot.time_remaining = work.interval.duration_secs;
            snapshot.current_group_name = work.group_name;
            snapshot.current_repetition = work.repetition;
            snapshot.total_repetitions = work.total_repetitions;
        }
    }

    snapshot
}
