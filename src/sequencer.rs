//! Pure phase state machine: given a plan and a cursor, works out which phase
//! comes next. No timing and no I/O happen here.

use uuid::Uuid;

use crate::plan::{PlannedInterval, WorkoutPlan};

/// Upper bound on repetitions for groups with `repeat_count == 0`
pub const INDEFINITE_REPEAT_CAP: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPhase {
    pub interval: PlannedInterval,
    pub group_id: Uuid,
    pub group_name: String,
    pub repetition: u32,
    /// The group's configured repeat count, `0` when indefinite
    pub total_repetitions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Work(WorkPhase),
    Rest { duration_secs: u32 },
    Ended,
}

impl Phase {
    pub fn duration_secs(&self) -> u32 {
        match self {
            Phase::Work(work) => work.interval.duration_secs,
            Phase::Rest { duration_secs } => *duration_secs,
            Phase::Ended => 0,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Phase::Rest { .. })
    }
}

/// Position of the engine within the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub group_index: usize,
    pub interval_index: usize,
    /// 1-based
    pub repetition: u32,
    pub is_rest: bool,
    pub overall_step_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WorkPosition {
    group_index: usize,
    interval_index: usize,
    repetition: u32,
}

#[derive(Debug, Clone)]
pub struct PhaseSequencer {
    plan: WorkoutPlan,
    repeat_cap: u32,
    cursor: Cursor,
    ended: bool,
}

impl PhaseSequencer {
    /// Positions the cursor on the first interval of the first non-empty group.
    ///
    /// Panics if the plan has no intervals at all; `WorkoutPlan::build`
    /// never produces such a plan.
    pub fn new(plan: WorkoutPlan, repeat_cap: u32) -> Self {
        let group_index = first_non_empty_group(&plan, 0)
            .unwrap_or_else(|| panic!("plan for {:?} has no intervals", plan.workout_name()));

        Self {
            plan,
            repeat_cap: repeat_cap.max(1),
            cursor: Cursor {
                group_index,
                interval_index: 0,
                repetition: 1,
                is_rest: false,
                overall_step_index: 0,
            },
            ended: false,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn current_phase(&self) -> Phase {
        if self.ended {
            Phase::Ended
        } else if self.cursor.is_rest {
            Phase::Rest {
                duration_secs: self.plan.rest_secs(),
            }
        } else {
            self.work_phase(self.position())
        }
    }

    /// Moves past the current phase. Only call once its time has run out.
    pub fn advance(&mut self) -> Phase {
        if self.ended {
            return Phase::Ended;
        }

        self.cursor.overall_step_index += 1;

        if self.cursor.is_rest {
            self.cursor.is_rest = false;
            match self.next_work_position(self.position()) {
                Some(next) => self.move_to(next),
                None => self.ended = true,
            }
        } else if self.next_work_position(self.position()).is_some() {
            self.cursor.is_rest = true;
        } else {
            // the final work phase never gets a trailing rest
            self.ended = true;
        }

        let phase = self.current_phase();
        tracing::debug!(step = self.cursor.overall_step_index, ?phase, "phase advanced");
        phase
    }

    fn position(&self) -> WorkPosition {
        WorkPosition {
            group_index: self.cursor.group_index,
            interval_index: self.cursor.interval_index,
            repetition: self.cursor.repetition,
        }
    }

    fn move_to(&mut self, next: WorkPosition) {
        self.cursor.group_index = next.group_index;
        self.cursor.interval_index = next.interval_index;
        self.cursor.repetition = next.repetition;
    }

    fn next_work_position(&self, from: WorkPosition) -> Option<WorkPosition> {
        let group = self.plan.group(from.group_index);

        if from.interval_index + 1 < group.intervals.len() {
            return Some(WorkPosition {
                interval_index: from.interval_index + 1,
                ..from
            });
        }

        if from.repetition < group.max_repeats(self.repeat_cap) {
            return Some(WorkPosition {
                interval_index: 0,
                repetition: from.repetition + 1,
                ..from
            });
        }

        first_non_empty_group(&self.plan, from.group_index + 1).map(|group_index| WorkPosition {
            group_index,
            interval_index: 0,
            repetition: 1,
        })
    }

    fn work_phase(&self, at: WorkPosition) -> Phase {
        let group = self.plan.group(at.group_index);
        let interval = group.intervals.get(at.interval_index).unwrap_or_else(|| {
            panic!(
                "cursor interval {} outside group {} ({} intervals)",
                at.interval_index,
                at.group_index,
                group.intervals.len()
            )
        });

        Phase::Work(WorkPhase {
            interval: interval.clone(),
            group_id: group.id,
            group_name: group.name.clone(),
            repetition: at.repetition,
            total_repetitions: group.repeat_count,
        })
    }
}

/// First group at or after `start` that has intervals
fn first_non_empty_group(plan: &WorkoutPlan, start: usize) -> Option<usize> {
    (start..plan.groups().len()).find(|&idx| !plan.group(idx).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout::{Group, Interval, Workout};

    fn sequencer(rest_secs: u32, groups: Vec<Group>) -> PhaseSequencer {
        let workout = Workout::new("test", rest_secs, groups);
        PhaseSequencer::new(WorkoutPlan::build(&workout).unwrap(), INDEFINITE_REPEAT_CAP)
    }

    fn label(phase: &Phase) -> String {
        match phase {
            Phase::Work(work) => format!("{}({})", work.interval.name, work.interval.duration_secs),
            Phase::Rest { duration_secs } => format!("Rest({duration_secs})"),
            Phase::Ended => "Ended".to_string(),
        }
    }

    fn run_to_end(seq: &mut PhaseSequencer) -> Vec<Phase> {
        let mut phases = vec![seq.current_phase()];
        while !seq.is_ended() {
            phases.push(seq.advance());
        }
        phases
    }

    fn labels(phases: &[Phase]) -> Vec<String> {
        phases.iter().map(label).collect()
    }

    #[test]
    fn single_group_repeats_with_rest_between_every_phase() {
        let mut seq = sequencer(
            2,
            vec![Group::new(0, 2, vec![Interval::new("A", 5, 0), Interval::new("B", 3, 1)])],
        );

        let phases = run_to_end(&mut seq);

        assert_eq!(
            labels(&phases),
            vec!["A(5)", "Rest(2)", "B(3)", "Rest(2)", "A(5)", "Rest(2)", "B(3)", "Ended"]
        );
        let total: u32 = phases.iter().map(Phase::duration_secs).sum();
        assert_eq!(total, 22);
    }

    #[test]
    fn repetition_is_reported_per_pass() {
        let mut seq = sequencer(1, vec![Group::new(0, 2, vec![Interval::new("A", 1, 0)])]);

        let reps: Vec<_> = run_to_end(&mut seq)
            .into_iter()
            .filter_map(|p| match p {
                Phase::Work(work) => Some((work.repetition, work.total_repetitions)),
                _ => None,
            })
            .collect();

        assert_eq!(reps, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn moves_between_groups_through_a_rest() {
        let mut seq = sequencer(
            5,
            vec![
                Group::new(0, 1, vec![Interval::new("X", 10, 0)]),
                Group::new(1, 1, vec![Interval::new("Y", 20, 0)]),
            ],
        );

        assert_eq!(labels(&run_to_end(&mut seq)), vec!["X(10)", "Rest(5)", "Y(20)", "Ended"]);
    }

    #[test]
    fn leading_empty_group_is_never_presented() {
        let mut seq = sequencer(
            5,
            vec![
                Group::new(0, 1, vec![]).named("Hollow"),
                Group::new(1, 1, vec![Interval::new("Z", 15, 0)]),
            ],
        );

        let phases = run_to_end(&mut seq);

        assert_eq!(labels(&phases), vec!["Z(15)", "Ended"]);
        assert!(phases.iter().all(|p| match p {
            Phase::Work(work) => work.group_name != "Hollow",
            _ => true,
        }));
    }

    #[test]
    fn many_consecutive_empty_groups_are_skipped() {
        let mut groups: Vec<Group> = (0..500).map(|i| Group::new(i, 0, vec![])).collect();
        groups.insert(0, Group::new(-1, 1, vec![Interval::new("first", 1, 0)]));
        groups.push(Group::new(1000, 1, vec![Interval::new("last", 1, 0)]));

        let mut seq = sequencer(1, groups);

        assert_eq!(labels(&run_to_end(&mut seq)), vec!["first(1)", "Rest(1)", "last(1)", "Ended"]);
    }

    #[test]
    fn trailing_empty_group_does_not_cause_trailing_rest() {
        let mut seq = sequencer(
            3,
            vec![
                Group::new(0, 1, vec![Interval::new("only", 4, 0)]),
                Group::new(1, 2, vec![]),
            ],
        );

        assert_eq!(labels(&run_to_end(&mut seq)), vec!["only(4)", "Ended"]);
    }

    #[test]
    fn indefinite_group_runs_exactly_cap_repetitions() {
        let mut seq = sequencer(1, vec![Group::new(0, 0, vec![Interval::new("W", 1, 0)])]);

        let phases = run_to_end(&mut seq);
        let work: Vec<_> = phases
            .iter()
            .filter_map(|p| match p {
                Phase::Work(work) => Some(work.repetition),
                _ => None,
            })
            .collect();

        assert_eq!(work.len(), INDEFINITE_REPEAT_CAP as usize);
        assert_eq!(work.last(), Some(&INDEFINITE_REPEAT_CAP));
        assert_eq!(phases.len(), 2 * INDEFINITE_REPEAT_CAP as usize);
    }

    #[test]
    fn repeat_cap_is_configurable() {
        let workout = Workout::new("cap", 0, vec![Group::new(0, 0, vec![Interval::new("W", 1, 0)])]);
        let mut seq = PhaseSequencer::new(WorkoutPlan::build(&workout).unwrap(), 3);

        let work = run_to_end(&mut seq).iter().filter(|p| matches!(p, Phase::Work(_))).count();
        assert_eq!(work, 3);
    }

    #[test]
    fn last_phase_before_end_is_always_work() {
        let shapes = vec![
            vec![Group::new(0, 3, vec![Interval::new("a", 1, 0), Interval::new("b", 1, 1)])],
            vec![
                Group::new(0, 2, vec![Interval::new("a", 1, 0)]),
                Group::new(1, 0, vec![]),
                Group::new(2, 1, vec![Interval::new("b", 1, 0), Interval::new("c", 1, 1)]),
                Group::new(3, 4, vec![]),
            ],
            vec![Group::new(0, 0, vec![Interval::new("a", 1, 0)])],
        ];

        for groups in shapes {
            let total_groups = groups.len() as u64;
            let total_intervals: u64 = groups.iter().map(|g| g.intervals.len() as u64).sum();
            let mut seq = sequencer(1, groups);

            let phases = run_to_end(&mut seq);

            assert_eq!(phases.last(), Some(&Phase::Ended));
            assert!(matches!(phases[phases.len() - 2], Phase::Work(_)));
            let bound = 2 * u64::from(INDEFINITE_REPEAT_CAP) * total_intervals * total_groups;
            assert!(seq.cursor().overall_step_index <= bound);
        }
    }

    #[test]
    fn step_index_counts_every_transition() {
        let mut seq = sequencer(1, vec![Group::new(0, 1, vec![Interval::new("a", 1, 0), Interval::new("b", 1, 1)])]);

        assert_eq!(seq.cursor().overall_step_index, 0);
        seq.advance();
        assert_eq!(seq.cursor().overall_step_index, 1);
        assert!(seq.cursor().is_rest);
        seq.advance();
        assert_eq!(seq.cursor().overall_step_index, 2);
        assert_eq!(seq.cursor().interval_index, 1);
    }

    #[test]
    fn advance_after_end_changes_nothing() {
        let mut seq = sequencer(1, vec![Group::new(0, 1, vec![Interval::new("a", 1, 0)])]);

        assert_eq!(seq.advance(), Phase::Ended);
        let cursor = seq.cursor();
        assert_eq!(seq.advance(), Phase::Ended);
        assert_eq!(seq.cursor(), cursor);
    }
}
