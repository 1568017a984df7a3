use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use intervalz::{
    app_dirs::AppDirs,
    clock::format_mm_ss,
    config::{Config, ConfigStore, FileConfigStore},
    cues::{PhaseCue, Silent, TerminalBell},
    logging,
    plan::WorkoutPlan,
    recording::{write_history_csv, JournalRecorder, RecorderHandle},
    runtime::{AppEvent, AppEventSource, CrosstermEventSource, FixedTicker, Runner, Ticker},
    session::{ControlOutcome, RecordingStatus, SessionConfig, SessionController, SessionState},
    store::{MemoryPlanSource, PlanSource, WorkoutStore},
    workout::Workout,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::mpsc::RecvTimeoutError,
    time::{Duration, Instant},
};
use uuid::Uuid;

/// How long to wait for the recorder to finish saving after the session ends
const FINALIZE_GRACE: Duration = Duration::from_secs(3);

/// interval workout runner with nested repeat groups and rest periods
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    /// workout library database
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// do not record the session in the journal
    #[clap(long, global = true)]
    no_record: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// run a workout (by id or name) with a live countdown
    Run {
        #[clap(required_unless_present = "file")]
        workout: Option<String>,

        /// run a workout straight from a JSON file without importing it
        #[clap(short, long, conflicts_with = "workout")]
        file: Option<PathBuf>,
    },
    /// list workouts in the library
    List,
    /// print the full phase sequence of a workout
    Show { workout: String },
    /// import a workout from a JSON file
    Import { file: PathBuf },
    /// add the built-in sample workout to the library
    Sample,
    /// delete a workout from the library
    Delete { workout: String },
    /// list recorded sessions
    History {
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// print as CSV
        #[clap(long)]
        csv: bool,
    },
}

/// What a key press asks the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    TogglePause,
    End,
    Quit,
}

fn key_action(key: KeyEvent, state: SessionState) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    match (key.code, state) {
        (KeyCode::Char(' ') | KeyCode::Char('p'), SessionState::Running | SessionState::Paused) => {
            Some(Action::TogglePause)
        }
        (KeyCode::Char('e') | KeyCode::Esc, SessionState::Running | SessionState::Paused) => {
            Some(Action::End)
        }
        (KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter, SessionState::Ended) => Some(Action::Quit),
        (KeyCode::Char('q'), _) => Some(Action::Quit),
        _ => None,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    logging::init(&AppDirs::log_path())?;

    let config_store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let config = config_store.load();

    let db_path = cli.db.clone().unwrap_or_else(AppDirs::library_path);
    let mut store = WorkoutStore::open(&db_path)?;

    match &cli.command {
        Command::Run { workout, file } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }

            // a file run is served from memory so both paths load the same way
            let mut from_file = MemoryPlanSource::new();
            let (source, id): (&dyn PlanSource, Uuid) = match (workout, file) {
                (_, Some(path)) => {
                    let id = from_file.insert(serde_json::from_slice::<Workout>(&std::fs::read(path)?)?);
                    (&from_file, id)
                }
                (Some(key), None) => (&store, store.resolve(key)?.id),
                (None, None) => unreachable!("clap requires a workout or --file"),
            };
            run(source, id, &config, !cli.no_record)?;
        }
        Command::List => {
            for summary in store.list_workouts()? {
                println!(
                    "{}  {:<30} {:>2} groups {:>3} intervals  rest {}",
                    summary.id,
                    summary.name,
                    summary.group_count,
                    summary.interval_count,
                    format_mm_ss(summary.rest_secs)
                );
            }
        }
        Command::Show { workout } => {
            let workout = store.resolve(workout)?;
            print_plan(&workout, &config)?;
        }
        Command::Import { file } => {
            let workout = store.import_json(file)?;
            println!("imported {} ({})", workout.display_name(), workout.id);
        }
        Command::Sample => {
            let workout = Workout::sample();
            store.save_workout(&workout)?;
            println!("added {} ({})", workout.display_name(), workout.id);
        }
        Command::Delete { workout } => {
            let workout = store.resolve(workout)?;
            store.delete_workout(workout.id)?;
            println!("deleted {} ({})", workout.display_name(), workout.id);
        }
        Command::History { limit, csv } => {
            let journal = JournalRecorder::open(&AppDirs::journal_path())?;
            let records = journal.history(*limit)?;
            if *csv {
                write_history_csv(&records, io::stdout())?;
            } else {
                for record in records {
                    println!(
                        "{}  {:<30} {}",
                        record.started_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                        record.workout_name,
                        format_mm_ss(record.duration_secs.clamp(0, u32::MAX as i64) as u32)
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_plan(workout: &Workout, config: &Config) -> Result<(), Box<dyn Error>> {
    let plan = WorkoutPlan::build(workout)?;
    println!("{}  (rest {})", plan.workout_name(), format_mm_ss(plan.rest_secs()));

    for group in plan.groups().iter().filter(|g| !g.is_empty()) {
        let repeats = match group.repeat_count {
            0 => format!(
                "repeats until stopped (max {})",
                group.max_repeats(config.indefinite_repeat_cap)
            ),
            n => format!("x{}", n),
        };
        println!("  {}  {}", group.name, repeats);
        for interval in &group.intervals {
            println!("    {:<24} {}", interval.name, format_mm_ss(interval.duration_secs));
        }
    }

    let preview = plan.preview(config.indefinite_repeat_cap);
    let to_mm_ss = |secs: u64| format_mm_ss(secs.min(u64::from(u32::MAX)) as u32);
    println!(
        "{} work phases  work {}  rest {}  total {}",
        preview.work_phases,
        to_mm_ss(preview.work_secs),
        to_mm_ss(preview.rest_secs),
        to_mm_ss(preview.total_secs)
    );
    Ok(())
}

fn run(source: &dyn PlanSource, id: Uuid, config: &Config, record: bool) -> Result<(), Box<dyn Error>> {
    let events = CrosstermEventSource::new();

    let recorder = if record && config.record_sessions {
        match JournalRecorder::open(&AppDirs::journal_path()) {
            Ok(journal) => RecorderHandle::spawn(journal, events.sender()),
            Err(e) => {
                tracing::warn!("journal unavailable, not recording: {}", e);
                RecorderHandle::disabled()
            }
        }
    } else {
        RecorderHandle::disabled()
    };

    let cue: Box<dyn PhaseCue> = if config.bell {
        Box::new(TerminalBell::stdout())
    } else {
        Box::new(Silent)
    };

    let mut controller = SessionController::load(source, id, SessionConfig::from(config), recorder, cue)?;
    // refuse empty workouts before taking over the terminal
    controller.start()?;

    let runner = Runner::new(events, FixedTicker::new(Duration::from_millis(config.tick_ms.max(1))));

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_session(&mut terminal, &mut controller, runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_session<B: Backend, E: AppEventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    controller: &mut SessionController,
    mut runner: Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    let snapshots = controller.subscribe();
    let mut latest = controller.snapshot();

    loop {
        if let Some(snapshot) = snapshots.try_iter().last() {
            latest = snapshot;
        }
        terminal.draw(|f| f.render_widget(&latest, f.area()))?;

        match runner.step() {
            AppEvent::Tick => {
                controller.on_tick();
            }
            AppEvent::Resize => {}
            AppEvent::Recorder(ev) => controller.handle_recorder_event(ev),
            AppEvent::Key(key) => match key_action(key, controller.state()) {
                Some(Action::TogglePause) => {
                    if controller.toggle_pause() == ControlOutcome::Applied
                        && controller.state() == SessionState::Running
                    {
                        runner.reset_schedule();
                    }
                }
                Some(Action::End) => {
                    controller.end();
                }
                Some(Action::Quit) => {
                    controller.end();
                    break;
                }
                None => {}
            },
        }
    }

    wait_for_recorder(controller, &runner, FINALIZE_GRACE);
    Ok(())
}

/// Give the recorder up to `grace` to deliver its final result
fn wait_for_recorder<E: AppEventSource, T: Ticker>(
    controller: &mut SessionController,
    runner: &Runner<E, T>,
    grace: Duration,
) {
    let deadline = Instant::now() + grace;
    loop {
        match controller.snapshot().recording {
            RecordingStatus::Pending | RecordingStatus::Active | RecordingStatus::Finalizing => {}
            _ => return,
        }

        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        match runner.poll_event(left) {
            Ok(AppEvent::Recorder(ev)) => controller.handle_recorder_event(ev),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::warn!("recorder did not finish before exit");
}
