use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single timed work phase inside a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub duration_secs: u32,
    #[serde(default)]
    pub position: i32,
}

impl Interval {
    pub fn new(name: impl Into<String>, duration_secs: u32, position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Some(name.into()),
            duration_secs,
            position,
        }
    }
}

/// A repeatable block of intervals. `repeat_count == 0` repeats indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

fn default_repeat_count() -> u32 {
    1
}

impl Group {
    pub fn new(position: i32, repeat_count: u32, intervals: Vec<Interval>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            position,
            repeat_count,
            intervals,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_indefinite(&self) -> bool {
        self.repeat_count == 0
    }
}

/// User-authored workout aggregate as it comes out of the library or a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workout {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub rest_secs: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Workout {
    pub fn new(name: impl Into<String>, rest_secs: u32, groups: Vec<Group>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Some(name.into()),
            rest_secs,
            created_at: Utc::now(),
            groups,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed Workout")
    }

    pub fn interval_count(&self) -> usize {
        self.groups.iter().map(|g| g.intervals.len()).sum()
    }

    /// Built-in example used by `intervalz sample`
    pub fn sample() -> Self {
        Self::new(
            "Sample Group Workout",
            60,
            vec![
                Group::new(0, 1, vec![Interval::new("Warmup", 300, 0)]).named("Warmup"),
                Group::new(
                    1,
                    4,
                    vec![Interval::new("Sprint", 60, 0), Interval::new("Jog", 90, 1)],
                )
                .named("Intervals"),
                Group::new(2, 1, vec![Interval::new("Cooldown", 300, 0)]).named("Cooldown"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_when_unnamed() {
        let mut workout = Workout::new("Legs", 30, vec![]);
        assert_eq!(workout.display_name(), "Legs");

        workout.name = None;
        assert_eq!(workout.display_name(), "Unnamed Workout");
    }

    #[test]
    fn deserialize_minimal_json_fills_defaults() {
        let json = r#"{
            "name": "Minimal",
            "rest_secs": 10,
            "groups": [
                { "intervals": [ { "duration_secs": 20 } ] },
                { "repeat_count": 0, "position": 1 }
            ]
        }"#;

        let workout: Workout = serde_json::from_str(json).unwrap();

        assert_eq!(workout.display_name(), "Minimal");
        assert_eq!(workout.groups.len(), 2);
        assert_eq!(workout.groups[0].repeat_count, 1);
        assert_eq!(workout.groups[0].intervals[0].name, None);
        assert!(workout.groups[1].is_indefinite());
        assert!(workout.groups[1].intervals.is_empty());
        assert_eq!(workout.interval_count(), 1);
    }

    #[test]
    fn sample_workout_has_intervals_in_every_group() {
        let sample = Workout::sample();
        assert!(sample.groups.iter().all(|g| !g.intervals.is_empty()));
        assert_eq!(sample.interval_count(), 4);
    }
}
