//! Interfaces to the services the timer talks to but does not own.
//!
//! Implementations are blocking; the coordinator always calls them from
//! tokio's blocking pool and never waits on the outcome.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timer::IntervalType;

pub type TaskId = String;
pub type RecordId = String;

/// XP awarded per completed minute of focus.
pub const XP_PER_FOCUS_MINUTE: u64 = 10;

/// Experience points for a completed interval: 10 per whole focus minute,
/// nothing for breaks.
pub fn calculate_xp(duration_secs: u64, interval_type: IntervalType) -> u64 {
    match interval_type {
        IntervalType::Focus => (duration_secs / 60) * XP_PER_FOCUS_MINUTE,
        IntervalType::ShortBreak | IntervalType::LongBreak => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub estimated_pomodoros: u32,
    pub completed_pomodoros: u32,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create a persisted interval record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIntervalRecord {
    pub interval_type: IntervalType,
    pub task_id: Option<TaskId>,
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
}

/// Increments applied to one day's aggregate statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStatDelta {
    pub focus_minutes: u64,
    pub completed_intervals: u64,
    pub xp: u64,
}

impl DailyStatDelta {
    /// Delta for a naturally completed interval. `None` for breaks.
    pub fn for_completed(interval_type: IntervalType, duration_secs: u64) -> Option<Self> {
        if interval_type != IntervalType::Focus {
            return None;
        }
        Some(Self {
            focus_minutes: duration_secs / 60,
            completed_intervals: 1,
            xp: calculate_xp(duration_secs, interval_type),
        })
    }
}

pub trait TaskStore: Send + Sync {
    fn get_task(&self, id: &str) -> Result<Option<Task>>;

    fn increment_completed_pomodoros(&self, id: &str) -> Result<()>;
}

pub trait IntervalHistory: Send + Sync {
    fn create_interval_record(&self, record: &NewIntervalRecord) -> Result<RecordId>;

    /// Mark a record `COMPLETED` with zero remaining time.
    fn complete_interval_record(&self, id: &str, completed_at: DateTime<Utc>) -> Result<()>;

    /// Mark a record `CANCELLED`, storing the time that was left when known.
    fn cancel_interval_record(
        &self,
        id: &str,
        remaining_secs: Option<u64>,
        cancelled_at: DateTime<Utc>,
    ) -> Result<()>;

    fn upsert_daily_stat(&self, date: NaiveDate, delta: &DailyStatDelta) -> Result<()>;
}

/// External media player. All calls are best effort.
pub trait PlaybackController: Send + Sync {
    fn is_playing(&self) -> Result<bool>;

    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    Start,
    Complete,
}

pub trait CuePlayer: Send + Sync {
    fn play_cue(&self, kind: CueKind);
}

/// Stand-in used when no store is configured. Tasks are never found and
/// records are never created.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl TaskStore for Detached {
    fn get_task(&self, _id: &str) -> Result<Option<Task>> {
        Ok(None)
    }

    fn increment_completed_pomodoros(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

impl IntervalHistory for Detached {
    fn create_interval_record(&self, _record: &NewIntervalRecord) -> Result<RecordId> {
        Err(crate::error::CoreError::collaborator(
            "history",
            "no history store configured",
        ))
    }

    fn complete_interval_record(&self, _id: &str, _completed_at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }

    fn cancel_interval_record(
        &self,
        _id: &str,
        _remaining_secs: Option<u64>,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    fn upsert_daily_stat(&self, _date: NaiveDate, _delta: &DailyStatDelta) -> Result<()> {
        Ok(())
    }
}

impl PlaybackController for Detached {
    fn is_playing(&self) -> Result<bool> {
        Ok(false)
    }

    fn pause(&self) -> Result<()> {
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        Ok(())
    }
}

impl CuePlayer for Detached {
    fn play_cue(&self, _kind: CueKind) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_is_ten_per_focus_minute() {
        assert_eq!(calculate_xp(1500, IntervalType::Focus), 250);
        assert_eq!(calculate_xp(89, IntervalType::Focus), 10);
        assert_eq!(calculate_xp(300, IntervalType::ShortBreak), 0);
        assert_eq!(calculate_xp(900, IntervalType::LongBreak), 0);
    }

    #[test]
    fn breaks_produce_no_daily_delta() {
        assert!(DailyStatDelta::for_completed(IntervalType::ShortBreak, 300).is_none());
        let delta = DailyStatDelta::for_completed(IntervalType::Focus, 1500).unwrap();
        assert_eq!(
            delta,
            DailyStatDelta {
                focus_minutes: 25,
                completed_intervals: 1,
                xp: 250
            }
        );
    }
}
