//! Hand-off of session start/stop to an external recorder.
//!
//! Adapter calls run on a worker thread so a slow or failing recorder never
//! holds up the countdown. Every result is sent back as a [`RecorderEvent`]
//! message; the session loop applies it when it gets to it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("no recording session is active")]
    NoActiveSession,
    #[error("a recording session is already active")]
    AlreadyActive,
    #[error("recording session has not been ended")]
    NotEnded,
    #[error("recorder storage failed: {0}")]
    Storage(String),
    #[error("recorder worker is gone")]
    WorkerGone,
}

impl From<rusqlite::Error> for RecordingError {
    fn from(e: rusqlite::Error) -> Self {
        RecordingError::Storage(e.to_string())
    }
}

/// What the recorder kept once a session was finalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedSummary {
    pub session_id: Uuid,
    pub workout_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
}

/// External fitness recorder. Calls are made from the recorder worker thread.
pub trait RecordingAdapter {
    fn begin_session(
        &mut self,
        started_at: DateTime<Utc>,
        workout_name: &str,
    ) -> Result<(), RecordingError>;

    fn end_session(&mut self, ended_at: DateTime<Utc>) -> Result<(), RecordingError>;

    fn finalize(&mut self) -> Result<RecordedSummary, RecordingError>;
}

/// Completion of an adapter call, delivered back into the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    Began(Result<(), RecordingError>),
    Ended(Result<(), RecordingError>),
    Finalized(Result<RecordedSummary, RecordingError>),
}

#[derive(Debug)]
pub(crate) enum RecorderCommand {
    Begin {
        started_at: DateTime<Utc>,
        workout_name: String,
    },
    EndAndFinalize {
        ended_at: DateTime<Utc>,
    },
}

/// Sending half of the recorder worker
#[derive(Debug)]
pub struct RecorderHandle {
    tx: Option<Sender<RecorderCommand>>,
}

impl RecorderHandle {
    /// Moves `adapter` onto its own thread. Completions are sent on `events`,
    /// converted into whatever event type the owning loop consumes.
    pub fn spawn<A, E>(mut adapter: A, events: Sender<E>) -> Self
    where
        A: RecordingAdapter + Send + 'static,
        E: From<RecorderEvent> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<RecorderCommand>();

        thread::spawn(move || {
            for command in rx {
                let completions = match command {
                    RecorderCommand::Begin {
                        started_at,
                        workout_name,
                    } => vec![RecorderEvent::Began(
                        adapter.begin_session(started_at, &workout_name),
                    )],
                    RecorderCommand::EndAndFinalize { ended_at } => {
                        let ended = adapter.end_session(ended_at);
                        if ended.is_ok() {
                            vec![
                                RecorderEvent::Ended(ended),
                                RecorderEvent::Finalized(adapter.finalize()),
                            ]
                        } else {
                            vec![RecorderEvent::Ended(ended)]
                        }
                    }
                };

                for completion in completions {
                    // a gone session loop just means nobody is listening anymore
                    let _ = events.send(E::from(completion));
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// Handle that records nothing
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Handle with no worker; the caller holds the command queue and can
    /// drop it to make later sends fail.
    #[cfg(test)]
    pub(crate) fn unattended() -> (Self, mpsc::Receiver<RecorderCommand>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn begin(&self, started_at: DateTime<Utc>, workout_name: &str) -> Result<(), RecordingError> {
        self.send(RecorderCommand::Begin {
            started_at,
            workout_name: workout_name.to_string(),
        })
    }

    pub fn end_and_finalize(&self, ended_at: DateTime<Utc>) -> Result<(), RecordingError> {
        self.send(RecorderCommand::EndAndFinalize { ended_at })
    }

    fn send(&self, command: RecorderCommand) -> Result<(), RecordingError> {
        match &self.tx {
            Some(tx) => tx.send(command).map_err(|_| RecordingError::WorkerGone),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct ActiveRecording {
    session_id: Uuid,
    workout_name: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// Recording adapter that keeps a local journal of finished sessions in SQLite
#[derive(Debug)]
pub struct JournalRecorder {
    conn: Connection,
    active: Option<ActiveRecording>,
}

impl JournalRecorder {
    pub fn open(path: &Path) -> Result<Self, RecordingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecordingError::Storage(format!("Failed to create directory: {}", e))
            })?;
        }

        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RecordingError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RecordingError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS recorded_sessions (
                id TEXT PRIMARY KEY,
                workout_name TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recorded_sessions_started ON recorded_sessions(started_at)",
            [],
        )?;

        Ok(Self { conn, active: None })
    }

    /// Most recent sessions first
    pub fn history(&self, limit: usize) -> Result<Vec<RecordedSummary>, RecordingError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, workout_name, started_at, ended_at, duration_secs
            FROM recorded_sessions
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: String = row.get(0)?;
            let started_at: String = row.get(2)?;
            let ended_at: String = row.get(3)?;

            Ok(RecordedSummary {
                session_id: Uuid::parse_str(&id).map_err(|_| {
                    rusqlite::Error::InvalidColumnType(0, "id".to_string(), rusqlite::types::Type::Text)
                })?,
                workout_name: row.get(1)?,
                started_at: parse_timestamp(&started_at, 2)?,
                ended_at: parse_timestamp(&ended_at, 3)?,
                duration_secs: row.get(4)?,
            })
        })?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }

        Ok(history)
    }
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(column, "timestamp".to_string(), rusqlite::types::Type::Text)
        })
}

impl RecordingAdapter for JournalRecorder {
    fn begin_session(
        &mut self,
        started_at: DateTime<Utc>,
        workout_name: &str,
    ) -> Result<(), RecordingError> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyActive);
        }

        self.active = Some(ActiveRecording {
            session_id: Uuid::new_v4(),
            workout_name: workout_name.to_string(),
            started_at,
            ended_at: None,
        });
        Ok(())
    }

    fn end_session(&mut self, ended_at: DateTime<Utc>) -> Result<(), RecordingError> {
        let active = self.active.as_mut().ok_or(RecordingError::NoActiveSession)?;
        active.ended_at = Some(ended_at);
        Ok(())
    }

    fn finalize(&mut self) -> Result<RecordedSummary, RecordingError> {
        let active = self.active.take().ok_or(RecordingError::NoActiveSession)?;
        let Some(ended_at) = active.ended_at else {
            self.active = Some(active);
            return Err(RecordingError::NotEnded);
        };

        let summary = RecordedSummary {
            session_id: active.session_id,
            workout_name: active.workout_name,
            started_at: active.started_at,
            ended_at,
            duration_secs: (ended_at - active.started_at).num_seconds().max(0),
        };

        self.conn.execute(
            r#"
            INSERT INTO recorded_sessions (id, workout_name, started_at, ended_at, duration_secs)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                summary.session_id.to_string(),
                summary.workout_name,
                summary.started_at.to_rfc3339(),
                summary.ended_at.to_rfc3339(),
                summary.duration_secs,
            ],
        )?;

        Ok(summary)
    }
}

/// Write journal entries as CSV with a header row
pub fn write_history_csv<W: Write>(records: &[RecordedSummary], writer: W) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    for record in records {
        out.serialize(record)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    #[test]
    fn journal_records_a_full_session() {
        let mut journal = JournalRecorder::open_in_memory().unwrap();
        let start = Utc::now();

        journal.begin_session(start, "Legs").unwrap();
        journal.end_session(start + Duration::seconds(95)).unwrap();
        let summary = journal.finalize().unwrap();

        assert_eq!(summary.workout_name, "Legs");
        assert_eq!(summary.duration_secs, 95);

        let history = journal.history(10).unwrap();
        assert_eq!(history, vec![summary]);
    }

    #[test]
    fn journal_rejects_out_of_order_calls() {
        let mut journal = JournalRecorder::open_in_memory().unwrap();
        let now = Utc::now();

        assert_eq!(journal.end_session(now), Err(RecordingError::NoActiveSession));
        assert_eq!(journal.finalize(), Err(RecordingError::NoActiveSession));

        journal.begin_session(now, "a").unwrap();
        assert_eq!(journal.begin_session(now, "b"), Err(RecordingError::AlreadyActive));
        assert_eq!(journal.finalize(), Err(RecordingError::NotEnded));
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let mut journal = JournalRecorder::open_in_memory().unwrap();
        let base = Utc::now();

        for (offset, name) in [(0, "old"), (60, "mid"), (120, "new")] {
            let start = base + Duration::seconds(offset);
            journal.begin_session(start, name).unwrap();
            journal.end_session(start + Duration::seconds(10)).unwrap();
            journal.finalize().unwrap();
        }

        let names: Vec<_> = journal
            .history(2)
            .unwrap()
            .into_iter()
            .map(|s| s.workout_name)
            .collect();
        assert_eq!(names, vec!["new", "mid"]);
    }

    #[test]
    fn journal_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.db");
        let start = Utc::now();

        {
            let mut journal = JournalRecorder::open(&path).unwrap();
            journal.begin_session(start, "Disk").unwrap();
            journal.end_session(start + Duration::seconds(1)).unwrap();
            journal.finalize().unwrap();
        }

        let reopened = JournalRecorder::open(&path).unwrap();
        assert_eq!(reopened.history(5).unwrap().len(), 1);
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let start = Utc::now();
        let record = RecordedSummary {
            session_id: Uuid::nil(),
            workout_name: "Csv".to_string(),
            started_at: start,
            ended_at: start,
            duration_secs: 0,
        };

        let mut buf = Vec::new();
        write_history_csv(&[record], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("session_id,workout_name,started_at,ended_at,duration_secs\n"));
        assert!(text.contains("Csv"));
    }

    struct FailingAdapter;

    impl RecordingAdapter for FailingAdapter {
        fn begin_session(&mut self, _: DateTime<Utc>, _: &str) -> Result<(), RecordingError> {
            Err(RecordingError::Storage("offline".into()))
        }
        fn end_session(&mut self, _: DateTime<Utc>) -> Result<(), RecordingError> {
            Err(RecordingError::NoActiveSession)
        }
        fn finalize(&mut self) -> Result<RecordedSummary, RecordingError> {
            panic!("finalize must not run after a failed end")
        }
    }

    #[test]
    fn worker_reports_results_in_order() {
        let (tx, rx) = mpsc::channel::<RecorderEvent>();
        let handle = RecorderHandle::spawn(JournalRecorder::open_in_memory().unwrap(), tx);
        let start = Utc::now();

        handle.begin(start, "Worker").unwrap();
        handle.end_and_finalize(start + Duration::seconds(3)).unwrap();

        let timeout = StdDuration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), RecorderEvent::Began(Ok(())));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), RecorderEvent::Ended(Ok(())));
        match rx.recv_timeout(timeout).unwrap() {
            RecorderEvent::Finalized(Ok(summary)) => assert_eq!(summary.duration_secs, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn worker_skips_finalize_when_end_fails() {
        let (tx, rx) = mpsc::channel::<RecorderEvent>();
        let handle = RecorderHandle::spawn(FailingAdapter, tx);

        handle.begin(Utc::now(), "x").unwrap();
        handle.end_and_finalize(Utc::now()).unwrap();
        drop(handle);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                RecorderEvent::Began(Err(RecordingError::Storage("offline".into()))),
                RecorderEvent::Ended(Err(RecordingError::NoActiveSession)),
            ]
        );
    }

    #[test]
    fn disabled_handle_accepts_commands() {
        let handle = RecorderHandle::disabled();
        assert!(!handle.is_enabled());
        assert!(handle.begin(Utc::now(), "x").is_ok());
        assert!(handle.end_and_finalize(Utc::now()).is_ok());
    }
}
