use std::io::{self, Write};

use crate::sequencer::Phase;

/// Side effect fired whenever a phase runs out (a buzz on a watch, a bell here)
pub trait PhaseCue {
    fn phase_finished(&mut self, finished: &Phase, next: &Phase);
}

/// No cue at all
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl PhaseCue for Silent {
    fn phase_finished(&mut self, _finished: &Phase, _next: &Phase) {}
}

/// Rings the terminal bell; twice when the whole workout is done
pub struct TerminalBell<W: Write> {
    out: W,
}

impl TerminalBell<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PhaseCue for TerminalBell<W> {
    fn phase_finished(&mut self, _finished: &Phase, next: &Phase) {
        let bell: &[u8] = if matches!(next, Phase::Ended) {
            b"\x07\x07"
        } else {
            b"\x07"
        };

        if let Err(e) = self.out.write_all(bell).and_then(|_| self.out.flush()) {
            tracing::debug!("failed to ring bell: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bell_rings_once_between_phases_and_twice_at_the_end() {
        let mut bell = TerminalBell::new(Vec::new());
        let rest = Phase::Rest { duration_secs: 3 };

        bell.phase_finished(&rest, &rest);
        bell.phase_finished(&rest, &Phase::Ended);

        assert_eq!(bell.into_inner(), b"\x07\x07\x07".to_vec());
    }
}
