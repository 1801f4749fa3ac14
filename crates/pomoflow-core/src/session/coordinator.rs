//! Side effects of timer transitions: cues, media playback, persistence.
//!
//! Every effect is fire-and-forget. Work runs on tokio's blocking pool under a
//! `TaskTracker` so the owner can flush outstanding effects before exiting;
//! failures are logged and never reach the timer.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::collaborators::{
    CueKind, CuePlayer, DailyStatDelta, Detached, IntervalHistory, NewIntervalRecord,
    PlaybackController, RecordId, TaskStore,
};
use crate::events::Event;

/// User toggles for external media control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPreferences {
    /// Resume playback when an interval starts and nothing is playing.
    pub autoplay_on_start: bool,
    /// Pause playback when an interval completes and something is playing.
    pub pause_on_complete: bool,
}

impl Default for MediaPreferences {
    fn default() -> Self {
        Self {
            autoplay_on_start: true,
            pause_on_complete: true,
        }
    }
}

/// The external services the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskStore>,
    pub history: Arc<dyn IntervalHistory>,
    pub playback: Arc<dyn PlaybackController>,
    pub cues: Arc<dyn CuePlayer>,
    pub media: MediaPreferences,
}

impl Collaborators {
    /// No store, no player, no cues.
    pub fn detached() -> Self {
        let detached = Arc::new(Detached);
        Self {
            tasks: detached.clone(),
            history: detached.clone(),
            playback: detached.clone(),
            cues: detached,
            media: MediaPreferences::default(),
        }
    }
}

/// A record created for `attempt`, on its way back to the timer owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAttachment {
    pub attempt: u64,
    pub record_id: RecordId,
}

pub struct SideEffectCoordinator {
    collaborators: Collaborators,
    attachments: mpsc::UnboundedSender<RecordAttachment>,
    tracker: TaskTracker,
}

impl SideEffectCoordinator {
    /// Created records are reported on the returned receiver.
    pub fn new(collaborators: Collaborators) -> (Self, mpsc::UnboundedReceiver<RecordAttachment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                collaborators,
                attachments: tx,
                tracker: TaskTracker::new(),
            },
            rx,
        )
    }

    pub fn media(&self) -> MediaPreferences {
        self.collaborators.media
    }

    /// React to one timer event. Must be called from within a tokio runtime.
    pub fn observe(&self, event: &Event) {
        match event {
            Event::IntervalStarted {
                attempt,
                interval_type,
                duration_secs,
                task_id,
                record_id,
                at,
                ..
            } => {
                self.play_cue(CueKind::Start);
                if self.collaborators.media.autoplay_on_start {
                    self.resume_playback();
                }
                if record_id.is_none() {
                    self.create_record(
                        *attempt,
                        NewIntervalRecord {
                            interval_type: *interval_type,
                            task_id: task_id.clone(),
                            duration_secs: *duration_secs,
                            started_at: *at,
                        },
                    );
                }
            }
            Event::IntervalCompleted {
                interval_type,
                duration_secs,
                task_id,
                record_id,
                at,
                ..
            } => {
                self.play_cue(CueKind::Complete);
                if self.collaborators.media.pause_on_complete {
                    self.pause_playback();
                }
                if let Some(record_id) = record_id {
                    self.complete_record(record_id.clone(), *at);
                } else {
                    debug!("completed interval has no record attached yet");
                }
                if let Some(delta) = DailyStatDelta::for_completed(*interval_type, *duration_secs) {
                    self.record_focus(task_id.clone(), delta, *at);
                }
            }
            Event::IntervalCancelled {
                record_id: Some(record_id),
                remaining_secs,
                at,
                ..
            } => self.cancel_record(record_id.clone(), Some(*remaining_secs), *at),
            _ => {}
        }
    }

    /// Complete a record that arrived after its attempt had already finished.
    pub fn complete_record(&self, record_id: RecordId, at: DateTime<Utc>) {
        let history = self.collaborators.history.clone();
        self.tracker.spawn_blocking(move || {
            if let Err(e) = history.complete_interval_record(&record_id, at) {
                warn!(%record_id, error = %e, "failed to complete interval record");
            }
        });
    }

    /// Cancel a record. `remaining_secs` of `None` keeps the stored value.
    pub fn cancel_record(&self, record_id: RecordId, remaining_secs: Option<u64>, at: DateTime<Utc>) {
        let history = self.collaborators.history.clone();
        self.tracker.spawn_blocking(move || {
            if let Err(e) = history.cancel_interval_record(&record_id, remaining_secs, at) {
                warn!(%record_id, error = %e, "failed to cancel interval record");
            }
        });
    }

    /// Wait for every outstanding effect. Effects spawned afterwards are
    /// still tracked.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn play_cue(&self, kind: CueKind) {
        let cues = self.collaborators.cues.clone();
        self.tracker.spawn_blocking(move || cues.play_cue(kind));
    }

    fn resume_playback(&self) {
        let playback = self.collaborators.playback.clone();
        self.tracker.spawn_blocking(move || match playback.is_playing() {
            Ok(false) => {
                if let Err(e) = playback.resume() {
                    warn!(error = %e, "failed to resume playback");
                }
            }
            Ok(true) => {}
            Err(e) => warn!(error = %e, "failed to query playback state"),
        });
    }

    fn pause_playback(&self) {
        let playback = self.collaborators.playback.clone();
        self.tracker.spawn_blocking(move || match playback.is_playing() {
            Ok(true) => {
                if let Err(e) = playback.pause() {
                    warn!(error = %e, "failed to pause playback");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "failed to query playback state"),
        });
    }

    fn create_record(&self, attempt: u64, record: NewIntervalRecord) {
        let history = self.collaborators.history.clone();
        let attachments = self.attachments.clone();
        self.tracker.spawn_blocking(move || {
            match history.create_interval_record(&record) {
                Ok(record_id) => {
                    debug!(attempt, %record_id, "interval record created");
                    // Receiver gone means the timer has shut down.
                    let _ = attachments.send(RecordAttachment { attempt, record_id });
                }
                Err(e) => warn!(attempt, error = %e, "failed to create interval record"),
            }
        });
    }

    fn record_focus(&self, task_id: Option<String>, delta: DailyStatDelta, at: DateTime<Utc>) {
        let tasks = self.collaborators.tasks.clone();
        let history = self.collaborators.history.clone();
        self.tracker.spawn_blocking(move || {
            if let Some(task_id) = task_id {
                match tasks
                    .increment_completed_pomodoros(&task_id)
                    .and_then(|_| tasks.get_task(&task_id))
                {
                    Ok(Some(task)) => info!(
                        task = %task.title,
                        completed = task.completed_pomodoros,
                        estimated = task.estimated_pomodoros,
                        "task progress"
                    ),
                    Ok(None) => warn!(%task_id, "completed focus for unknown task"),
                    Err(e) => warn!(%task_id, error = %e, "failed to update task"),
                }
            }
            let date = at.with_timezone(&Local).date_naive();
            if let Err(e) = history.upsert_daily_stat(date, &delta) {
                warn!(%date, error = %e, "failed to update daily stats");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::error::Result;
    use crate::session::collaborators::Task;
    use crate::timer::IntervalType;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, s: impl Into<String>) {
            self.0.lock().unwrap().push(s.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl IntervalHistory for Log {
        fn create_interval_record(&self, _record: &NewIntervalRecord) -> Result<RecordId> {
            self.push("create");
            Ok("rec".into())
        }

        fn complete_interval_record(&self, id: &str, _at: DateTime<Utc>) -> Result<()> {
            self.push(format!("complete:{id}"));
            Ok(())
        }

        fn cancel_interval_record(&self, id: &str, r: Option<u64>, _at: DateTime<Utc>) -> Result<()> {
            self.push(format!("cancel:{id}:{r:?}"));
            Ok(())
        }

        fn upsert_daily_stat(&self, _date: NaiveDate, _delta: &DailyStatDelta) -> Result<()> {
            self.push("stat");
            Ok(())
        }
    }

    impl TaskStore for Log {
        fn get_task(&self, _id: &str) -> Result<Option<Task>> {
            Ok(None)
        }

        fn increment_completed_pomodoros(&self, id: &str) -> Result<()> {
            self.push(format!("increment:{id}"));
            Ok(())
        }
    }

    impl PlaybackController for Log {
        fn is_playing(&self) -> Result<bool> {
            Ok(false)
        }

        fn pause(&self) -> Result<()> {
            self.push("pause");
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            self.push("resume");
            Ok(())
        }
    }

    fn coordinator(log: &Arc<Log>, media: MediaPreferences) -> (SideEffectCoordinator, mpsc::UnboundedReceiver<RecordAttachment>) {
        SideEffectCoordinator::new(Collaborators {
            tasks: log.clone(),
            history: log.clone(),
            playback: log.clone(),
            cues: Arc::new(Detached),
            media,
        })
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn started(record_id: Option<&str>) -> Event {
        Event::IntervalStarted {
            attempt: 3,
            interval_type: IntervalType::Focus,
            duration_secs: 1500,
            task_id: None,
            record_id: record_id.map(str::to_string),
            chained: false,
            at: at(),
        }
    }

    #[tokio::test]
    async fn start_creates_record_and_reports_attachment() {
        let log = Arc::new(Log::default());
        let (coordinator, mut attachments) = coordinator(&log, MediaPreferences::default());

        coordinator.observe(&started(None));
        coordinator.flush().await;

        assert_eq!(
            attachments.recv().await,
            Some(RecordAttachment {
                attempt: 3,
                record_id: "rec".into()
            })
        );
        assert!(log.entries().contains(&"resume".to_string()));
    }

    #[tokio::test]
    async fn start_with_existing_record_creates_nothing() {
        let log = Arc::new(Log::default());
        let media = MediaPreferences {
            autoplay_on_start: false,
            pause_on_complete: false,
        };
        let (coordinator, mut attachments) = coordinator(&log, media);

        coordinator.observe(&started(Some("given")));
        coordinator.flush().await;

        assert!(attachments.try_recv().is_err());
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn focus_completion_updates_task_and_stats() {
        let log = Arc::new(Log::default());
        let (coordinator, _attachments) = coordinator(&log, MediaPreferences::default());

        coordinator.observe(&Event::IntervalCompleted {
            attempt: 1,
            interval_type: IntervalType::Focus,
            duration_secs: 1500,
            task_id: Some("t".into()),
            record_id: Some("rec".into()),
            chain_to: None,
            at: at(),
        });
        coordinator.flush().await;

        let entries = log.entries();
        assert!(entries.contains(&"complete:rec".to_string()));
        assert!(entries.contains(&"increment:t".to_string()));
        assert!(entries.contains(&"stat".to_string()));
        // Nothing was playing.
        assert!(!entries.contains(&"pause".to_string()));
    }

    #[tokio::test]
    async fn cancellation_without_record_touches_nothing() {
        let log = Arc::new(Log::default());
        let (coordinator, _attachments) = coordinator(&log, MediaPreferences::default());

        coordinator.observe(&Event::IntervalCancelled {
            attempt: 1,
            interval_type: IntervalType::Focus,
            remaining_secs: 42,
            record_id: None,
            at: at(),
        });
        coordinator.observe(&Event::IntervalCancelled {
            attempt: 2,
            interval_type: IntervalType::Focus,
            remaining_secs: 42,
            record_id: Some("rec".into()),
            at: at(),
        });
        coordinator.flush().await;

        assert_eq!(log.entries(), vec!["cancel:rec:Some(42)".to_string()]);
    }
}
