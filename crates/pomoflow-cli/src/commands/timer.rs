use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use pomoflow_core::storage::Database;
use pomoflow_core::timer::{IntervalType, TimerEngine, CHAIN_DELAY};
use pomoflow_core::{
    Collaborators, Config, Event, SessionOptions, TimerCommand, TimerHandle, TimerService,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::adapters::{CommandPlayback, TerminalCue};

const ENGINE_KEY: &str = "timer_engine";
const MAX_DURATION_MIN: u64 = 24 * 60;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the current interval
    Start {
        /// Task to credit focus intervals to
        #[arg(long)]
        task: Option<String>,
    },
    /// Pause the running interval
    Pause,
    /// Resume a paused interval
    Resume,
    /// Abandon the current interval
    Skip,
    /// Return to an idle interval at full duration
    Reset,
    /// Print current timer state as JSON
    Status,
    /// Switch interval type (focus, short-break, long-break)
    Type {
        interval_type: IntervalType,
    },
    /// Set durations in minutes (at most one day each)
    Durations {
        #[arg(value_parser = clap::value_parser!(u64).range(..=MAX_DURATION_MIN))]
        focus: u64,
        #[arg(value_parser = clap::value_parser!(u64).range(..=MAX_DURATION_MIN))]
        short_break: u64,
        #[arg(value_parser = clap::value_parser!(u64).range(..=MAX_DURATION_MIN))]
        long_break: u64,
    },
    /// Automatically start a break after focus
    AutoBreaks {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Automatically start focus after a break
    AutoPomodoros {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Take a long break after every n-th focus interval (0 disables)
    LongBreakInterval {
        every: u32,
    },
    /// Run the timer in the foreground, printing events until interrupted
    Run {
        /// Task to credit focus intervals to
        #[arg(long)]
        task: Option<String>,
    },
}

/// Restore the persisted engine, then bring its settings in line with the
/// config file.
fn load_engine(db: &Database, config: &Config) -> TimerEngine {
    let wanted = config.duration_config();
    let mut engine = match db.kv_get(ENGINE_KEY) {
        Ok(Some(json)) => match serde_json::from_str::<TimerEngine>(&json) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "discarding unreadable timer state");
                TimerEngine::new(wanted.clone())
            }
        },
        Ok(None) => TimerEngine::new(wanted.clone()),
        Err(e) => {
            warn!(error = %e, "failed to read timer state");
            TimerEngine::new(wanted.clone())
        }
    };

    if engine.durations() != &wanted {
        debug!("applying configured durations");
        engine.set_durations(
            Utc::now(),
            wanted.focus_secs(),
            wanted.short_break_secs(),
            wanted.long_break_secs(),
        );
        engine.set_auto_start_breaks(wanted.auto_start_breaks);
        engine.set_auto_start_pomodoros(wanted.auto_start_pomodoros);
        engine.set_long_break_interval(wanted.long_break_interval);
    }
    engine
}

fn save_engine(db: &Database, engine: &TimerEngine) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(engine)?;
    db.kv_set(ENGINE_KEY, &json)?;
    Ok(())
}

fn collaborators(db: &Arc<Database>, config: &Config) -> Collaborators {
    Collaborators {
        tasks: db.clone(),
        history: db.clone(),
        playback: Arc::new(CommandPlayback::new(config.media.clone())),
        cues: Arc::new(TerminalCue::new(&config.notifications)),
        media: config.media_preferences(),
    }
}

fn require_task(db: &Database, task: Option<String>) -> Result<Option<String>, Box<dyn std::error::Error>> {
    if let Some(id) = &task {
        if db.find_task(id)?.is_none() {
            return Err(format!("task not found: {id}").into());
        }
    }
    Ok(task)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Drain events published so far; if one of them scheduled a chained start,
/// wait for it so the new interval is persisted before exiting.
async fn settle(handle: &TimerHandle, events: &mut broadcast::Receiver<Event>) {
    let mut chained = false;
    while let Ok(event) = events.try_recv() {
        if let Event::IntervalCompleted {
            chain_to: Some(_), ..
        } = event
        {
            chained = true;
        }
    }
    if chained {
        tokio::time::sleep(CHAIN_DELAY + std::time::Duration::from_millis(100)).await;
        let _ = handle.tick().await;
    }
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    let db = Arc::new(Database::open()?);
    let engine = load_engine(&db, &config);

    // Settings changes are stored in the config file as well.
    match &action {
        TimerAction::Durations {
            focus,
            short_break,
            long_break,
        } => {
            config.schedule.focus_duration = *focus;
            config.schedule.short_break = *short_break;
            config.schedule.long_break = *long_break;
            config.save()?;
        }
        TimerAction::AutoBreaks { enabled } => {
            config.schedule.auto_start_breaks = *enabled;
            config.save()?;
        }
        TimerAction::AutoPomodoros { enabled } => {
            config.schedule.auto_start_pomodoros = *enabled;
            config.save()?;
        }
        TimerAction::LongBreakInterval { every } => {
            config.schedule.long_break_interval = *every;
            config.save()?;
        }
        _ => {}
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let engine = runtime.block_on(async {
        let handle = TimerService::spawn(
            engine,
            collaborators(&db, &config),
            SessionOptions::default(),
        );
        let outcome = execute(&handle, &db, action).await;
        let engine = handle.shutdown().await?;
        outcome?;
        Ok::<_, Box<dyn std::error::Error>>(engine)
    })?;

    save_engine(&db, &engine)?;
    Ok(())
}

async fn execute(
    handle: &TimerHandle,
    db: &Database,
    action: TimerAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = handle.subscribe_events();

    // Catch up with whatever happened while no process was running.
    handle.tick().await?;

    let command = match action {
        TimerAction::Run { task } => return run_foreground(handle, require_task(db, task)?).await,
        TimerAction::Start { task } => {
            handle.select_task(require_task(db, task)?).await?;
            TimerCommand::Start { record_id: None }
        }
        TimerAction::Pause => TimerCommand::Pause,
        TimerAction::Resume => TimerCommand::Resume,
        TimerAction::Skip => TimerCommand::Skip,
        TimerAction::Reset => TimerCommand::Reset,
        TimerAction::Status => TimerCommand::Snapshot,
        TimerAction::Type { interval_type } => TimerCommand::SetIntervalType(interval_type),
        TimerAction::Durations {
            focus,
            short_break,
            long_break,
        } => TimerCommand::SetDurations {
            focus_secs: focus.saturating_mul(60),
            short_break_secs: short_break.saturating_mul(60),
            long_break_secs: long_break.saturating_mul(60),
        },
        TimerAction::AutoBreaks { enabled } => TimerCommand::SetAutoStartBreaks(enabled),
        TimerAction::AutoPomodoros { enabled } => TimerCommand::SetAutoStartPomodoros(enabled),
        TimerAction::LongBreakInterval { every } => TimerCommand::SetLongBreakInterval(every),
    };
    handle.send(command).await?;
    settle(handle, &mut events).await;
    print_json(&handle.snapshot().await?)
}

/// Start (if needed) and follow the timer, printing each event as a JSON
/// line until Ctrl-C.
async fn run_foreground(
    handle: &TimerHandle,
    task: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = handle.subscribe_events();
    if task.is_some() {
        handle.select_task(task).await?;
    }
    let snapshot = handle.snapshot().await?;
    if !snapshot.status.is_live() {
        handle.start().await?;
    } else if snapshot.status == pomoflow_core::SessionStatus::Paused {
        handle.resume().await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
