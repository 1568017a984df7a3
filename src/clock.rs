#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// What a single tick did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Clock was not running; nothing changed
    Idle,
    Counting { remaining_secs: u32 },
    /// Remaining time hit zero on this tick
    PhaseFinished,
}

/// Whole-second countdown for the current phase.
///
/// The clock does not own a timer; something outside feeds it one `tick()`
/// per second while the session runs.
#[derive(Debug, Clone)]
pub struct Clock {
    state: ClockState,
    remaining_secs: u32,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            state: ClockState::Idle,
            remaining_secs: 0,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Set the countdown for a new phase; does not change running state
    pub fn load(&mut self, secs: u32) {
        if self.state != ClockState::Stopped {
            self.remaining_secs = secs;
        }
    }

    pub fn start(&mut self) {
        if self.state == ClockState::Idle {
            self.state = ClockState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
        }
    }

    /// Permanent; a stopped clock never ticks again
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    pub fn tick(&mut self) -> Tick {
        if self.state != ClockState::Running {
            return Tick::Idle;
        }

        if self.remaining_secs > 1 {
            self.remaining_secs -= 1;
            Tick::Counting {
                remaining_secs: self.remaining_secs,
            }
        } else {
            self.remaining_secs = 0;
            Tick::PhaseFinished
        }
    }
}

/// Format seconds as "MM:SS"; minutes keep counting past 59
pub fn format_mm_ss(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
