//! On-disk database and config tests, including the database acting as the
//! timer's task store and history.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Local, TimeZone, Utc};
use pomoflow_core::session::{Collaborators, Detached, MediaPreferences, TaskStore};
use pomoflow_core::storage::RecordStatus;
use pomoflow_core::timer::{DurationConfig, ManualClock, SessionStatus, TimerEngine};
use pomoflow_core::{Config, Database, SessionOptions, TimerService};

#[test]
fn database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pomoflow.db");

    let task_id = {
        let db = Database::open_at(&path).unwrap();
        db.kv_set("timer_engine", "{}").unwrap();
        db.create_task("Persisted", None, 2).unwrap().id
    };

    let db = Database::open_at(&path).unwrap();
    assert_eq!(db.kv_get("timer_engine").unwrap().as_deref(), Some("{}"));
    let task = db.find_task(&task_id).unwrap().unwrap();
    assert_eq!(task.title, "Persisted");
    assert_eq!(task.estimated_pomodoros, 2);
}

#[test]
fn open_at_reports_unopenable_path() {
    let dir = tempfile::tempdir().unwrap();
    let result = Database::open_at(&dir.path().join("missing").join("pomoflow.db"));
    assert!(result.is_err());
}

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::load_from(&path).unwrap();
    config.set("schedule.focus_duration", "50").unwrap();
    config.set("schedule.auto_start_breaks", "true").unwrap();
    config.save_to(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("[schedule]"));
    assert!(raw.contains("focus_duration = 50"));

    let loaded = Config::load_from(&path).unwrap();
    let durations = loaded.duration_config();
    assert_eq!(durations.focus_secs(), 3000);
    assert!(durations.auto_start_breaks);
}

#[tokio::test(start_paused = true)]
async fn timer_session_is_recorded_in_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_at(&dir.path().join("pomoflow.db")).unwrap());
    let task = db.create_task("Deep work", None, 4).unwrap();

    let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    let detached = Arc::new(Detached);
    let handle = TimerService::spawn(
        TimerEngine::new(DurationConfig::default()),
        Collaborators {
            tasks: db.clone(),
            history: db.clone(),
            playback: detached.clone(),
            cues: detached,
            media: MediaPreferences::default(),
        },
        SessionOptions {
            tick_period: StdDuration::from_secs(1),
            chain_delay: StdDuration::from_secs(1),
            clock: Arc::new(clock.clone()),
        },
    );

    handle.select_task(Some(task.id.clone())).await.unwrap();
    handle.start().await.unwrap();
    handle
        .subscribe_state()
        .wait_for(|s| s.active_record_id.is_some())
        .await
        .unwrap();

    clock.advance(Duration::seconds(1500));
    handle.tick().await.unwrap();
    let engine = handle.shutdown().await.unwrap();
    assert_eq!(engine.status(), SessionStatus::Completed);

    let records = db.recent_records(10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RecordStatus::Completed);
    assert_eq!(records[0].remaining_secs, 0);
    assert_eq!(records[0].task_id.as_deref(), Some(task.id.as_str()));

    let task = db.get_task(&task.id).unwrap().unwrap();
    assert_eq!(task.completed_pomodoros, 1);

    let completed_at = start + Duration::seconds(1500);
    let day = completed_at.with_timezone(&Local).date_naive();
    let stat = db.daily_stat(day).unwrap().unwrap();
    assert_eq!(stat.focus_minutes, 25);
    assert_eq!(stat.completed_intervals, 1);
    assert_eq!(stat.xp, 250);
}
