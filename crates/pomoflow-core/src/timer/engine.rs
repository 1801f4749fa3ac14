//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller passes the current instant into every
//! transition and calls `reconcile()` whenever a tick stimulus arrives.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused | Completed | Cancelled)
//! Paused -> (Running | Cancelled)
//! Completed | Cancelled -> Idle   (reset or interval type switch)
//! ```
//!
//! Commands that are not valid in the current status are ignored and return
//! no event.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(DurationConfig::default());
//! engine.start(now, None);
//! // On every tick stimulus:
//! engine.reconcile(now); // Returns Some(Event::IntervalCompleted) once
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chain;
use super::clock;
use super::interval::{DurationConfig, IntervalType, SessionStatus};
use crate::events::Event;

/// The mutable timer state. One instance per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub interval_type: IntervalType,
    pub remaining_secs: u64,
    pub status: SessionStatus,
    pub active_record_id: Option<String>,
    /// Set iff `status == Running`.
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Read-only view published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub interval_type: IntervalType,
    pub status: SessionStatus,
    pub remaining_secs: u64,
    pub duration_secs: u64,
    pub active_record_id: Option<String>,
    pub task_id: Option<String>,
    pub attempt: u64,
    pub completed_focus: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub at: DateTime<Utc>,
}

impl TimerSnapshot {
    /// 0.0 .. 1.0 progress within the current interval.
    pub fn progress(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_secs as f64 / self.duration_secs as f64)
    }
}

/// What happened to a record id that arrived for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The attempt is still live; the record now tracks it.
    Attached,
    /// The attempt already finished naturally; the record should be completed.
    AlreadyCompleted,
    /// The attempt was cancelled or superseded; the record should be cancelled.
    Abandoned,
}

/// Core timer engine.
///
/// Operates on wall-clock deltas -- no internal thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    state: TimerState,
    durations: DurationConfig,
    /// Task associated with intervals started from now on.
    #[serde(default)]
    task_id: Option<String>,
    /// Incremented by every successful start.
    #[serde(default)]
    attempt: u64,
    #[serde(default)]
    completed_focus: u32,
    /// Duration the current attempt was started with.
    #[serde(default)]
    target_secs: u64,
    /// Task the current attempt was started with.
    #[serde(default)]
    attempt_task_id: Option<String>,
}

impl TimerEngine {
    /// Create a new engine in `Idle`, ready to run a focus interval.
    pub fn new(durations: DurationConfig) -> Self {
        Self {
            state: TimerState {
                interval_type: IntervalType::Focus,
                remaining_secs: durations.focus_secs(),
                status: SessionStatus::Idle,
                active_record_id: None,
                last_tick_at: None,
            },
            durations,
            task_id: None,
            attempt: 0,
            completed_focus: 0,
            target_secs: 0,
            attempt_task_id: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn interval_type(&self) -> IntervalType {
        self.state.interval_type
    }

    pub fn remaining_secs(&self) -> u64 {
        self.state.remaining_secs
    }

    pub fn durations(&self) -> &DurationConfig {
        &self.durations
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn completed_focus(&self) -> u32 {
        self.completed_focus
    }

    /// Configured duration of the current interval type.
    pub fn total_secs(&self) -> u64 {
        self.durations.duration_secs(self.state.interval_type)
    }

    /// Target of the attempt in flight (or just completed); the configured
    /// duration otherwise. Durations changed mid-run do not retarget it.
    pub fn target_secs(&self) -> u64 {
        match self.state.status {
            SessionStatus::Running | SessionStatus::Paused | SessionStatus::Completed => {
                self.target_secs
            }
            SessionStatus::Idle | SessionStatus::Cancelled => self.total_secs(),
        }
    }

    pub fn snapshot(&self, at: DateTime<Utc>) -> TimerSnapshot {
        TimerSnapshot {
            interval_type: self.state.interval_type,
            status: self.state.status,
            remaining_secs: self.state.remaining_secs,
            duration_secs: self.target_secs(),
            active_record_id: self.state.active_record_id.clone(),
            task_id: self.task_id.clone(),
            attempt: self.attempt,
            completed_focus: self.completed_focus,
            auto_start_breaks: self.durations.auto_start_breaks,
            auto_start_pomodoros: self.durations.auto_start_pomodoros,
            at,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a fresh attempt at the full configured duration.
    pub fn start(&mut self, now: DateTime<Utc>, record_id: Option<String>) -> Option<Event> {
        self.begin(now, record_id, false)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.state.status != SessionStatus::Running {
            return None;
        }
        self.state.status = SessionStatus::Paused;
        self.state.last_tick_at = None;
        debug!(remaining_secs = self.state.remaining_secs, "interval paused");
        Some(Event::IntervalPaused {
            remaining_secs: self.state.remaining_secs,
            at: now,
        })
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.state.status != SessionStatus::Paused {
            return None;
        }
        self.state.status = SessionStatus::Running;
        self.state.last_tick_at = Some(now);
        debug!(remaining_secs = self.state.remaining_secs, "interval resumed");
        Some(Event::IntervalResumed {
            remaining_secs: self.state.remaining_secs,
            at: now,
        })
    }

    /// Abandon the in-flight attempt. Remaining time is kept as-is.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.state.status.is_live() {
            return None;
        }
        let record_id = self.state.active_record_id.take();
        self.state.status = SessionStatus::Cancelled;
        self.state.last_tick_at = None;
        debug!(attempt = self.attempt, "interval cancelled");
        Some(Event::IntervalCancelled {
            attempt: self.attempt,
            interval_type: self.state.interval_type,
            remaining_secs: self.state.remaining_secs,
            record_id,
            at: now,
        })
    }

    /// Back to `Idle` at the full duration of the current type.
    ///
    /// Returns the cancellation of a live attempt (if any) followed by the
    /// reset itself.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events: Vec<Event> = self.skip(now).into_iter().collect();
        self.state.status = SessionStatus::Idle;
        self.state.active_record_id = None;
        self.state.last_tick_at = None;
        self.state.remaining_secs = self.total_secs();
        events.push(Event::TimerReset {
            interval_type: self.state.interval_type,
            remaining_secs: self.state.remaining_secs,
            at: now,
        });
        events
    }

    /// Switch the interval type.
    ///
    /// Outside a live attempt this reconfigures the timer (`Idle`, full
    /// duration of `interval_type`). During a live attempt the attempt is
    /// cancelled like `skip()`, its remaining time is left untouched, and the
    /// new type takes effect at the next start.
    pub fn set_interval_type(&mut self, now: DateTime<Utc>, interval_type: IntervalType) -> Vec<Event> {
        let from = self.state.interval_type;
        let mut events = Vec::new();
        if self.state.status.is_live() {
            events.extend(self.skip(now));
        } else {
            self.state.status = SessionStatus::Idle;
            self.state.active_record_id = None;
            self.state.remaining_secs = self.durations.duration_secs(interval_type);
        }
        self.state.interval_type = interval_type;
        events.push(Event::IntervalTypeChanged {
            from,
            to: interval_type,
            remaining_secs: self.state.remaining_secs,
            at: now,
        });
        events
    }

    /// Apply elapsed wall-clock time. Returns `Some(Event::IntervalCompleted)`
    /// exactly once, when remaining time reaches zero.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.state.status != SessionStatus::Running {
            return None;
        }
        let last = self.state.last_tick_at?;
        let step = clock::reconcile(last, now)?;
        let remaining_before = self.state.remaining_secs;
        self.state.remaining_secs = remaining_before.saturating_sub(step.elapsed_secs);
        self.state.last_tick_at = Some(step.next_tick_at);
        if self.state.remaining_secs == 0 {
            // A late catch-up still completes at the instant the countdown hit zero.
            let overshoot = step.elapsed_secs.saturating_sub(remaining_before);
            let ended_at = step.next_tick_at - Duration::seconds(overshoot as i64);
            return Some(self.complete(ended_at));
        }
        None
    }

    pub fn set_durations(
        &mut self,
        now: DateTime<Utc>,
        focus_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
    ) -> Event {
        self.durations
            .set_durations(focus_secs, short_break_secs, long_break_secs);
        if !self.state.status.is_live() {
            self.state.remaining_secs = self.total_secs();
        }
        Event::DurationsChanged {
            focus_secs: self.durations.focus_secs(),
            short_break_secs: self.durations.short_break_secs(),
            long_break_secs: self.durations.long_break_secs(),
            remaining_secs: self.state.remaining_secs,
            at: now,
        }
    }

    pub fn set_auto_start_breaks(&mut self, enabled: bool) {
        self.durations.auto_start_breaks = enabled;
    }

    pub fn set_auto_start_pomodoros(&mut self, enabled: bool) {
        self.durations.auto_start_pomodoros = enabled;
    }

    pub fn set_long_break_interval(&mut self, every: u32) {
        self.durations.long_break_interval = every;
    }

    /// Task to associate with intervals started from now on. The running
    /// attempt keeps the task it was started with.
    pub fn select_task(&mut self, task_id: Option<String>) {
        self.task_id = task_id;
    }

    /// Associate a persisted record with `attempt`.
    pub fn attach_record(&mut self, attempt: u64, record_id: String) -> AttachOutcome {
        if attempt != self.attempt {
            return AttachOutcome::Abandoned;
        }
        match self.state.status {
            SessionStatus::Running | SessionStatus::Paused => {
                self.state.active_record_id = Some(record_id);
                AttachOutcome::Attached
            }
            SessionStatus::Completed => AttachOutcome::AlreadyCompleted,
            SessionStatus::Idle | SessionStatus::Cancelled => AttachOutcome::Abandoned,
        }
    }

    /// Perform a chained start decided when `attempt` completed.
    ///
    /// Ignored unless `attempt` is still the latest one and still `Completed`,
    /// so a manual command issued during the delay always wins.
    pub fn start_chained(
        &mut self,
        now: DateTime<Utc>,
        attempt: u64,
        next: IntervalType,
    ) -> Vec<Event> {
        if attempt != self.attempt || self.state.status != SessionStatus::Completed {
            debug!(attempt, current = self.attempt, "stale chained start ignored");
            return Vec::new();
        }
        let mut events = self.set_interval_type(now, next);
        events.extend(self.begin(now, None, true));
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn begin(&mut self, now: DateTime<Utc>, record_id: Option<String>, chained: bool) -> Option<Event> {
        if self.state.status.is_live() {
            return None;
        }
        self.attempt += 1;
        let duration_secs = self.total_secs();
        self.target_secs = duration_secs;
        self.attempt_task_id = self.task_id.clone();
        self.state.status = SessionStatus::Running;
        self.state.remaining_secs = duration_secs;
        self.state.last_tick_at = Some(now);
        self.state.active_record_id = record_id.clone();
        debug!(
            attempt = self.attempt,
            interval_type = %self.state.interval_type,
            duration_secs,
            chained,
            "interval started"
        );
        Some(Event::IntervalStarted {
            attempt: self.attempt,
            interval_type: self.state.interval_type,
            duration_secs,
            task_id: self.task_id.clone(),
            record_id,
            chained,
            at: now,
        })
    }

    /// Only reachable from `reconcile` when remaining time hits zero.
    /// `ended_at` is when the countdown reached zero, not when it was noticed.
    fn complete(&mut self, ended_at: DateTime<Utc>) -> Event {
        self.state.status = SessionStatus::Completed;
        self.state.remaining_secs = 0;
        self.state.last_tick_at = None;
        let interval_type = self.state.interval_type;
        if interval_type == IntervalType::Focus {
            self.completed_focus = self.completed_focus.saturating_add(1);
        }
        let chain_to = chain::next_interval(interval_type, &self.durations, self.completed_focus);
        debug!(attempt = self.attempt, %interval_type, ?chain_to, "interval completed");
        Event::IntervalCompleted {
            attempt: self.attempt,
            interval_type,
            duration_secs: self.target_secs,
            task_id: self.attempt_task_id.clone(),
            record_id: self.state.active_record_id.clone(),
            chain_to,
            at: ended_at,
        }
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(DurationConfig::default())
    }
}
