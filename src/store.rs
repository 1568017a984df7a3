use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::workout::{Group, Interval, Workout};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid workout json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no workout matching {0:?}")]
    NotFound(String),
    #[error("more than one workout is named {0:?}; use its id")]
    Ambiguous(String),
}

/// Read-only access to authored workouts
pub trait PlanSource {
    fn fetch_workout(&self, id: Uuid) -> Result<Workout, StoreError>;
}

/// Row shown by `intervalz list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutSummary {
    pub id: Uuid,
    pub name: String,
    pub rest_secs: u32,
    pub group_count: usize,
    pub interval_count: usize,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed workout library
#[derive(Debug)]
pub struct WorkoutStore {
    conn: Connection,
}

impl WorkoutStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workouts (
                id TEXT PRIMARY KEY,
                name TEXT,
                rest_secs INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interval_groups (
                id TEXT PRIMARY KEY,
                workout_id TEXT NOT NULL,
                name TEXT,
                position INTEGER NOT NULL,
                repeat_count INTEGER NOT NULL,
                seq INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS intervals (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                name TEXT,
                duration_secs INTEGER NOT NULL,
                position INTEGER NOT NULL,
                seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_interval_groups_workout ON interval_groups(workout_id);
            CREATE INDEX IF NOT EXISTS idx_intervals_group ON intervals(group_id);
            "#,
        )?;

        Ok(Self { conn })
    }

    /// Insert or replace a workout together with its groups and intervals.
    /// `seq` remembers collection order so equal positions sort the same way
    /// after a round trip.
    pub fn save_workout(&mut self, workout: &Workout) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        delete_rows(&tx, workout.id)?;

        tx.execute(
            "INSERT INTO workouts (id, name, rest_secs, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                workout.id.to_string(),
                workout.name,
                workout.rest_secs,
                workout.created_at.to_rfc3339(),
            ],
        )?;

        for (group_seq, group) in workout.groups.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO interval_groups (id, workout_id, name, position, repeat_count, seq)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    group.id.to_string(),
                    workout.id.to_string(),
                    group.name,
                    group.position,
                    group.repeat_count,
                    group_seq as i64,
                ],
            )?;

            for (interval_seq, interval) in group.intervals.iter().enumerate() {
                tx.execute(
                    r#"
                    INSERT INTO intervals (id, group_id, name, duration_secs, position, seq)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        interval.id.to_string(),
                        group.id.to_string(),
                        interval.name,
                        interval.duration_secs,
                        interval.position,
                        interval_seq as i64,
                    ],
                )?;
            }
        }

        tx.commit()?;
        tracing::debug!(id = %workout.id, name = %workout.display_name(), "workout saved");
        Ok(())
    }

    pub fn delete_workout(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let deleted = delete_rows(&tx, id)?;
        tx.commit()?;
        Ok(deleted)
    }

    pub fn list_workouts(&self) -> Result<Vec<WorkoutSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT w.id, w.name, w.rest_secs, w.created_at,
                (SELECT COUNT(*) FROM interval_groups g WHERE g.workout_id = w.id),
                (SELECT COUNT(*) FROM intervals i
                    JOIN interval_groups g ON i.group_id = g.id
                    WHERE g.workout_id = w.id)
            FROM workouts w
            ORDER BY w.created_at, w.id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let name: Option<String> = row.get(1)?;
            Ok(WorkoutSummary {
                id: uuid_column(row, 0)?,
                name: name.unwrap_or_else(|| "Unnamed Workout".to_string()),
                rest_secs: row.get(2)?,
                created_at: timestamp_column(row, 3)?,
                group_count: row.get::<_, i64>(4)? as usize,
                interval_count: row.get::<_, i64>(5)? as usize,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Workout, StoreError> {
        let mut stmt = self.conn.prepare("SELECT id FROM workouts WHERE name = ?1")?;
        let ids = stmt
            .query_map([name], |row| uuid_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        match ids.as_slice() {
            [] => Err(StoreError::NotFound(name.to_string())),
            [id] => self.fetch_workout(*id),
            _ => Err(StoreError::Ambiguous(name.to_string())),
        }
    }

    /// Look up by id if `key` parses as one, otherwise by exact name
    pub fn resolve(&self, key: &str) -> Result<Workout, StoreError> {
        match Uuid::parse_str(key) {
            Ok(id) => self.fetch_workout(id),
            Err(_) => self.find_by_name(key),
        }
    }

    /// Read a workout from a JSON file and save it to the library
    pub fn import_json(&mut self, path: &Path) -> Result<Workout, StoreError> {
        let bytes = fs::read(path)?;
        let workout: Workout = serde_json::from_slice(&bytes)?;
        self.save_workout(&workout)?;
        tracing::info!(id = %workout.id, path = %path.display(), "workout imported");
        Ok(workout)
    }

    fn fetch_groups(&self, workout_id: Uuid) -> Result<Vec<Group>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, position, repeat_count
            FROM interval_groups
            WHERE workout_id = ?1
            ORDER BY seq
            "#,
        )?;

        let mut groups = stmt
            .query_map([workout_id.to_string()], |row| {
                Ok(Group {
                    id: uuid_column(row, 0)?,
                    name: row.get(1)?,
                    position: row.get(2)?,
                    repeat_count: row.get(3)?,
                    intervals: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, duration_secs, position
            FROM intervals
            WHERE group_id = ?1
            ORDER BY seq
            "#,
        )?;

        for group in &mut groups {
            group.intervals = stmt
                .query_map([group.id.to_string()], |row| {
                    Ok(Interval {
                        id: uuid_column(row, 0)?,
                        name: row.get(1)?,
                        duration_secs: row.get(2)?,
                        position: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(groups)
    }
}

impl PlanSource for WorkoutStore {
    fn fetch_workout(&self, id: Uuid) -> Result<Workout, StoreError> {
        let header = self
            .conn
            .query_row(
                "SELECT name, rest_secs, created_at FROM workouts WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, u32>(1)?,
                        timestamp_column(row, 2)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, rest_secs, created_at)) = header else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        Ok(Workout {
            id,
            name,
            rest_secs,
            created_at,
            groups: self.fetch_groups(id)?,
        })
    }
}

fn delete_rows(conn: &Connection, workout_id: Uuid) -> rusqlite::Result<bool> {
    let id = workout_id.to_string();
    conn.execute(
        "DELETE FROM intervals WHERE group_id IN (SELECT id FROM interval_groups WHERE workout_id = ?1)",
        [&id],
    )?;
    conn.execute("DELETE FROM interval_groups WHERE workout_id = ?1", [&id])?;
    let deleted = conn.execute("DELETE FROM workouts WHERE id = ?1", [&id])?;
    Ok(deleted > 0)
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Plan source backed by a plain map, for tests and one-off JSON runs
#[derive(Debug, Default, Clone)]
pub struct MemoryPlanSource {
    workouts: HashMap<Uuid, Workout>,
}

impl MemoryPlanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, workout: Workout) -> Uuid {
        let id = workout.id;
        self.workouts.insert(id, workout);
        id
    }
}

impl PlanSource for MemoryPlanSource {
    fn fetch_workout(&self, id: Uuid) -> Result<Workout, StoreError> {
        self.workouts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
