//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_pomoflow"))
        .args(args)
        .env("POMOFLOW_DATA_DIR", data_dir)
        .env("POMOFLOW_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_timer_status_starts_idle() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(snapshot["status"], "IDLE");
    assert_eq!(snapshot["interval_type"], "FOCUS");
    assert_eq!(snapshot["remaining_secs"], 1500);
}

#[test]
fn test_timer_start_pause_resume() {
    let dir = tempfile::tempdir().unwrap();
    let started = run_json(dir.path(), &["timer", "start"]);
    assert_eq!(started["status"], "RUNNING");
    assert_eq!(started["attempt"], 1);

    let paused = run_json(dir.path(), &["timer", "pause"]);
    assert_eq!(paused["status"], "PAUSED");

    let resumed = run_json(dir.path(), &["timer", "resume"]);
    assert_eq!(resumed["status"], "RUNNING");
    assert_eq!(resumed["attempt"], 1);
}

#[test]
fn test_timer_skip_records_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["timer", "start"]);
    let skipped = run_json(dir.path(), &["timer", "skip"]);
    assert_eq!(skipped["status"], "CANCELLED");
    assert!(skipped["remaining_secs"].as_u64().unwrap() > 0);

    let history = run_json(dir.path(), &["stats", "history"]);
    let records = history.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "CANCELLED");
    assert_eq!(records[0]["interval_type"], "FOCUS");
}

#[test]
fn test_timer_reset_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["timer", "start"]);
    let reset = run_json(dir.path(), &["timer", "reset"]);
    assert_eq!(reset["status"], "IDLE");
    assert_eq!(reset["remaining_secs"], 1500);
}

#[test]
fn test_timer_type_and_durations() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = run_json(dir.path(), &["timer", "type", "short-break"]);
    assert_eq!(snapshot["interval_type"], "SHORT_BREAK");
    assert_eq!(snapshot["remaining_secs"], 300);

    let snapshot = run_json(dir.path(), &["timer", "durations", "30", "10", "20"]);
    assert_eq!(snapshot["remaining_secs"], 600);

    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "schedule.focus_duration"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");
}

#[test]
fn test_timer_durations_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = run_json(dir.path(), &["timer", "durations", "0", "0", "0"]);
    assert_eq!(snapshot["remaining_secs"], 60);
}

#[test]
fn test_timer_rejects_oversized_durations() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["timer", "durations", "307445734561825861", "5", "15"]);
    assert_eq!(code, 2);

    let snapshot = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(snapshot["remaining_secs"], 1500);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "schedule.focus_duration"]);
    assert_eq!(stdout.trim(), "25");

    let snapshot = run_json(dir.path(), &["timer", "durations", "1440", "5", "15"]);
    assert_eq!(snapshot["remaining_secs"], 86_400);
}

#[test]
fn test_timer_rejects_unknown_type() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["timer", "type", "nap"]);
    assert_ne!(code, 0);
}

#[test]
fn test_task_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let task = run_json(dir.path(), &["task", "create", "Write tests", "--estimated", "3"]);
    let id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["estimated_pomodoros"], 3);

    let tasks = run_json(dir.path(), &["task", "list", "--json"]);
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let fetched = run_json(dir.path(), &["task", "get", &id]);
    assert_eq!(fetched["title"], "Write tests");

    let started = run_json(dir.path(), &["timer", "start", "--task", &id]);
    assert_eq!(started["task_id"], id.as_str());

    let (code, _, _) = run_cli(dir.path(), &["task", "delete", &id]);
    assert_eq!(code, 0);
    let (code, _, stderr) = run_cli(dir.path(), &["task", "get", &id]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_task_update() {
    let dir = tempfile::tempdir().unwrap();
    let task = run_json(dir.path(), &["task", "create", "Draft", "--description", "notes"]);
    let id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["completed"], false);

    let updated = run_json(
        dir.path(),
        &[
            "task", "update", &id, "--title", "Final", "--estimated", "5", "--completed", "true",
        ],
    );
    assert_eq!(updated["title"], "Final");
    assert_eq!(updated["description"], "notes");
    assert_eq!(updated["estimated_pomodoros"], 5);
    assert_eq!(updated["completed"], true);

    let cleared = run_json(dir.path(), &["task", "update", &id, "--description", ""]);
    assert!(cleared["description"].is_null());
    assert_eq!(cleared["title"], "Final");

    let fetched = run_json(dir.path(), &["task", "get", &id]);
    assert_eq!(fetched["completed"], true);

    let (code, _, stderr) = run_cli(dir.path(), &["task", "update", "missing", "--title", "x"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_timer_start_with_unknown_task_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["timer", "start", "--task", "missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("task not found"));
}

#[test]
fn test_config_get_set_reset() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "media.autoplay_on_focus"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "true");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "schedule.auto_start_breaks", "true"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "schedule.auto_start_breaks"]);
    assert_eq!(stdout.trim(), "true");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "schedule.nope", "1"]);
    assert_eq!(code, 1);

    let (code, stdout, _) = run_cli(dir.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("schedule.auto_start_breaks = true"));

    run_cli(dir.path(), &["config", "reset"]);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "schedule.auto_start_breaks"]);
    assert_eq!(stdout.trim(), "false");
}

#[test]
fn test_stats_start_empty() {
    let dir = tempfile::tempdir().unwrap();
    let today = run_json(dir.path(), &["stats", "today"]);
    assert_eq!(today["focus_minutes"], 0);

    let all = run_json(dir.path(), &["stats", "all"]);
    assert_eq!(all["completed_pomodoros"], 0);

    let day = run_json(dir.path(), &["stats", "day", "2024-01-15"]);
    assert_eq!(day["date"], "2024-01-15");
    assert_eq!(day["xp"], 0);
}
