//! SQLite storage for tasks, interval history and statistics.
//!
//! Provides persistent storage for:
//! - Tasks and their pomodoro counters
//! - One record per started interval (running, completed or cancelled)
//! - Per-day focus aggregates
//! - Key-value store for application state

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::session::{
    DailyStatDelta, IntervalHistory, NewIntervalRecord, RecordId, Task, TaskStore,
};
use crate::timer::IntervalType;

/// Lifecycle of a persisted interval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Running,
    Completed,
    Cancelled,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Running => "RUNNING",
            RecordStatus::Completed => "COMPLETED",
            RecordStatus::Cancelled => "CANCELLED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RecordStatus::Running),
            "COMPLETED" => Some(RecordStatus::Completed),
            "CANCELLED" => Some(RecordStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub id: RecordId,
    pub task_id: Option<String>,
    pub interval_type: IntervalType,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub status: RecordStatus,
    pub started_at: DateTime<Utc>,
    /// When the record was completed or cancelled.
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDailyStat {
    pub date: NaiveDate,
    pub focus_minutes: u64,
    pub completed_intervals: u64,
    pub xp: u64,
}

impl StoredDailyStat {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            focus_minutes: 0,
            completed_intervals: 0,
            xp: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub active_days: u64,
    pub total_focus_min: u64,
    pub completed_pomodoros: u64,
    pub total_xp: u64,
    pub cancelled_intervals: u64,
    pub today_focus_min: u64,
    pub today_pomodoros: u64,
    pub today_xp: u64,
}

/// SQLite database.
///
/// The connection sits behind a mutex so one instance can serve the timer's
/// blocking side effects and the caller at the same time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Lock the underlying SQLite connection.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied in SQLite.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the database at `<data dir>/pomoflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("pomoflow.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS tasks (
                    id                  TEXT PRIMARY KEY,
                    title               TEXT NOT NULL,
                    description         TEXT,
                    estimated_pomodoros INTEGER NOT NULL DEFAULT 1,
                    completed_pomodoros INTEGER NOT NULL DEFAULT 0,
                    completed           INTEGER NOT NULL DEFAULT 0,
                    created_at          TEXT NOT NULL,
                    updated_at          TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS interval_records (
                    id             TEXT PRIMARY KEY,
                    task_id        TEXT,
                    interval_type  TEXT NOT NULL,
                    duration_secs  INTEGER NOT NULL,
                    remaining_secs INTEGER NOT NULL,
                    status         TEXT NOT NULL,
                    started_at     TEXT NOT NULL,
                    ended_at       TEXT
                );

                CREATE TABLE IF NOT EXISTS daily_stats (
                    date                TEXT PRIMARY KEY,
                    focus_minutes       INTEGER NOT NULL DEFAULT 0,
                    completed_intervals INTEGER NOT NULL DEFAULT 0,
                    xp                  INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_interval_records_started_at ON interval_records(started_at);
                CREATE INDEX IF NOT EXISTS idx_interval_records_status ON interval_records(status);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        estimated_pomodoros: u32,
    ) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
            estimated_pomodoros,
            completed_pomodoros: 0,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        self.conn().execute(
            "INSERT INTO tasks (id, title, description, estimated_pomodoros, completed_pomodoros,
                                completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?5)",
            params![
                task.id,
                task.title,
                task.description,
                task.estimated_pomodoros,
                now.to_rfc3339(),
            ],
        )?;
        Ok(task)
    }

    pub fn find_task(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn()
            .query_row(
                "SELECT id, title, description, estimated_pomodoros, completed_pomodoros,
                        completed, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// All tasks, oldest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, description, estimated_pomodoros, completed_pomodoros,
                    completed, created_at, updated_at
             FROM tasks ORDER BY created_at, rowid",
        )?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Update a task's editable fields and bump `updated_at`.
    ///
    /// `completed_pomodoros` is left alone; only finished focus intervals
    /// move it.
    pub fn update_task(&self, task: &Task) -> Result<Task> {
        let now = Utc::now();
        let updated = self.conn().execute(
            "UPDATE tasks
             SET title = ?1, description = ?2, estimated_pomodoros = ?3, completed = ?4,
                 updated_at = ?5
             WHERE id = ?6",
            params![
                task.title,
                task.description,
                task.estimated_pomodoros,
                task.completed,
                now.to_rfc3339(),
                task.id,
            ],
        )?;
        if updated == 0 {
            return Err(not_found("task", &task.id));
        }
        self.find_task(&task.id)?
            .ok_or_else(|| not_found("task", &task.id))
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(not_found("task", id));
        }
        Ok(())
    }

    // ── Interval records ─────────────────────────────────────────────

    pub fn record(&self, id: &str) -> Result<Option<IntervalRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT id, task_id, interval_type, duration_secs, remaining_secs, status,
                        started_at, ended_at
                 FROM interval_records WHERE id = ?1",
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recently started records first.
    pub fn recent_records(&self, limit: usize) -> Result<Vec<IntervalRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, interval_type, duration_secs, remaining_secs, status,
                    started_at, ended_at
             FROM interval_records
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ── Statistics ───────────────────────────────────────────────────

    pub fn daily_stat(&self, date: NaiveDate) -> Result<Option<StoredDailyStat>> {
        let stat = self
            .conn()
            .query_row(
                "SELECT date, focus_minutes, completed_intervals, xp
                 FROM daily_stats WHERE date = ?1",
                params![date.to_string()],
                daily_stat_from_row,
            )
            .optional()?;
        Ok(stat)
    }

    /// Today's aggregates in local time; zeroes when nothing was recorded.
    pub fn stats_today(&self) -> Result<StoredDailyStat> {
        let today = Local::now().date_naive();
        Ok(self
            .daily_stat(today)?
            .unwrap_or_else(|| StoredDailyStat::empty(today)))
    }

    pub fn stats_all(&self) -> Result<Stats> {
        let today = self.stats_today()?;
        let conn = self.conn();
        let (active_days, total_focus_min, completed_pomodoros, total_xp) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(focus_minutes), 0),
                    COALESCE(SUM(completed_intervals), 0), COALESCE(SUM(xp), 0)
             FROM daily_stats",
            [],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, u64>(3)?,
                ))
            },
        )?;
        let cancelled_intervals = conn.query_row(
            "SELECT COUNT(*) FROM interval_records WHERE status = ?1",
            params![RecordStatus::Cancelled.as_str()],
            |row| row.get::<_, u64>(0),
        )?;

        Ok(Stats {
            active_days,
            total_focus_min,
            completed_pomodoros,
            total_xp,
            cancelled_intervals,
            today_focus_min: today.focus_minutes,
            today_pomodoros: today.completed_intervals,
            today_xp: today.xp,
        })
    }

    // ── Key-value ────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl TaskStore for Database {
    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.find_task(id)
    }

    fn increment_completed_pomodoros(&self, id: &str) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE tasks
             SET completed_pomodoros = completed_pomodoros + 1, updated_at = ?2
             WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(not_found("task", id));
        }
        Ok(())
    }
}

impl IntervalHistory for Database {
    /// Inserts a `RUNNING` record. Any record still marked running belongs to
    /// an attempt that can no longer finish and is cancelled first.
    fn create_interval_record(&self, record: &NewIntervalRecord) -> Result<RecordId> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let orphaned = tx.execute(
            "UPDATE interval_records SET status = ?1, ended_at = ?2 WHERE status = ?3",
            params![
                RecordStatus::Cancelled.as_str(),
                record.started_at.to_rfc3339(),
                RecordStatus::Running.as_str(),
            ],
        )?;
        if orphaned > 0 {
            debug!(orphaned, "cancelled stale running records");
        }
        tx.execute(
            "INSERT INTO interval_records (id, task_id, interval_type, duration_secs,
                                           remaining_secs, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
            params![
                id,
                record.task_id,
                record.interval_type.as_str(),
                record.duration_secs,
                RecordStatus::Running.as_str(),
                record.started_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn complete_interval_record(&self, id: &str, completed_at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE interval_records SET status = ?2, remaining_secs = 0, ended_at = ?3
             WHERE id = ?1",
            params![
                id,
                RecordStatus::Completed.as_str(),
                completed_at.to_rfc3339()
            ],
        )?;
        if updated == 0 {
            return Err(not_found("interval record", id));
        }
        Ok(())
    }

    fn cancel_interval_record(
        &self,
        id: &str,
        remaining_secs: Option<u64>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE interval_records
             SET status = ?2, remaining_secs = COALESCE(?3, remaining_secs), ended_at = ?4
             WHERE id = ?1",
            params![
                id,
                RecordStatus::Cancelled.as_str(),
                remaining_secs,
                cancelled_at.to_rfc3339()
            ],
        )?;
        if updated == 0 {
            return Err(not_found("interval record", id));
        }
        Ok(())
    }

    fn upsert_daily_stat(&self, date: NaiveDate, delta: &DailyStatDelta) -> Result<()> {
        self.conn().execute(
            "INSERT INTO daily_stats (date, focus_minutes, completed_intervals, xp)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                focus_minutes = focus_minutes + excluded.focus_minutes,
                completed_intervals = completed_intervals + excluded.completed_intervals,
                xp = xp + excluded.xp",
            params![
                date.to_string(),
                delta.focus_minutes,
                delta.completed_intervals,
                delta.xp
            ],
        )?;
        Ok(())
    }
}

fn not_found(entity: &'static str, id: &str) -> crate::error::CoreError {
    DatabaseError::NotFound {
        entity,
        id: id.to_string(),
    }
    .into()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{raw}': {e}")))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        estimated_pomodoros: row.get(3)?,
        completed_pomodoros: row.get(4)?,
        completed: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<IntervalRecord> {
    let interval_type: String = row.get(2)?;
    let status: String = row.get(5)?;
    let ended_at = match row.get::<_, Option<String>>(7)? {
        Some(_) => Some(timestamp(row, 7)?),
        None => None,
    };
    Ok(IntervalRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        interval_type: interval_type
            .parse()
            .map_err(|e: crate::error::ValidationError| conversion_error(2, e.to_string()))?,
        duration_secs: row.get(3)?,
        remaining_secs: row.get(4)?,
        status: RecordStatus::parse(&status)
            .ok_or_else(|| conversion_error(5, format!("unknown record status '{status}'")))?,
        started_at: timestamp(row, 6)?,
        ended_at,
    })
}

fn daily_stat_from_row(row: &Row<'_>) -> rusqlite::Result<StoredDailyStat> {
    let raw: String = row.get(0)?;
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| conversion_error(0, format!("bad date '{raw}': {e}")))?;
    Ok(StoredDailyStat {
        date,
        focus_minutes: row.get(1)?,
        completed_intervals: row.get(2)?,
        xp: row.get(3)?,
    })
}
