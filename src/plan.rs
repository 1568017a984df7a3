use thiserror::Error;
use uuid::Uuid;

use crate::workout::{Interval, Workout};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("workout has no groups with intervals")]
    Empty,
}

/// Interval as it appears in a plan, with its display name already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInterval {
    pub id: Uuid,
    pub name: String,
    pub duration_secs: u32,
}

impl PlannedInterval {
    fn from_interval(interval: &Interval, ordinal: usize) -> Self {
        Self {
            id: interval.id,
            name: interval
                .name
                .clone()
                .unwrap_or_else(|| format!("Interval {}", ordinal + 1)),
            duration_secs: interval.duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGroup {
    pub id: Uuid,
    pub name: String,
    pub repeat_count: u32,
    pub intervals: Vec<PlannedInterval>,
}

impl PlannedGroup {
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of repetitions this group actually runs for
    pub fn max_repeats(&self, repeat_cap: u32) -> u32 {
        if self.repeat_count == 0 {
            repeat_cap.max(1)
        } else {
            self.repeat_count
        }
    }
}

/// Read-only, order-normalized snapshot of a workout, built once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutPlan {
    workout_name: String,
    rest_secs: u32,
    groups: Vec<PlannedGroup>,
}

impl WorkoutPlan {
    /// Sorts groups and intervals by position (stable, so duplicate positions
    /// keep their original order) and resolves display names.
    pub fn build(workout: &Workout) -> Result<Self, PlanError> {
        if workout.groups.iter().all(|g| g.intervals.is_empty()) {
            return Err(PlanError::Empty);
        }

        let mut groups: Vec<_> = workout.groups.iter().collect();
        groups.sort_by_key(|g| g.position);

        let groups = groups
            .into_iter()
            .map(|group| {
                let mut intervals: Vec<_> = group.intervals.iter().collect();
                intervals.sort_by_key(|i| i.position);

                PlannedGroup {
                    id: group.id,
                    name: group
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Group {}", i64::from(group.position) + 1)),
                    repeat_count: group.repeat_count,
                    intervals: intervals
                        .into_iter()
                        .enumerate()
                        .map(|(ordinal, interval)| PlannedInterval::from_interval(interval, ordinal))
                        .collect(),
                }
            })
            .collect();

        Ok(Self {
            workout_name: workout.display_name().to_string(),
            rest_secs: workout.rest_secs,
            groups,
        })
    }

    pub fn workout_name(&self) -> &str {
        &self.workout_name
    }

    pub fn rest_secs(&self) -> u32 {
        self.rest_secs
    }

    pub fn groups(&self) -> &[PlannedGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> &PlannedGroup {
        &self.groups[index]
    }

    /// Phase counts and durations for a whole run, computed per group so
    /// huge repeat counts cost nothing. Saturates at `u64::MAX`.
    pub fn preview(&self, repeat_cap: u32) -> PlanPreview {
        let mut preview = PlanPreview::default();

        for group in self.groups.iter().filter(|g| !g.is_empty()) {
            let repeats = u64::from(group.max_repeats(repeat_cap));
            let pass_secs: u64 = group.intervals.iter().map(|i| u64::from(i.duration_secs)).sum();

            preview.work_phases = preview
                .work_phases
                .saturating_add(repeats.saturating_mul(group.intervals.len() as u64));
            preview.work_secs = preview.work_secs.saturating_add(repeats.saturating_mul(pass_secs));
        }

        // a rest between every pair of work phases, none after the last
        preview.rest_phases = preview.work_phases.saturating_sub(1);
        preview.rest_secs = preview.rest_phases.saturating_mul(u64::from(self.rest_secs));
        preview.total_secs = preview.work_secs.saturating_add(preview.rest_secs);
        preview
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanPreview {
    pub work_phases: u64,
    pub rest_phases: u64,
    pub work_secs: u64,
    pub rest_secs: u64,
    pub total_secs: u64,
}
