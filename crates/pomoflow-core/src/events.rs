use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::IntervalType;

/// Every timer transition produces an Event.
/// The service broadcasts them; the side-effect coordinator consumes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    IntervalStarted {
        attempt: u64,
        interval_type: IntervalType,
        duration_secs: u64,
        task_id: Option<String>,
        /// Record id supplied by the caller; `None` means one must be created.
        record_id: Option<String>,
        /// Started by the auto-chaining policy rather than a user command.
        chained: bool,
        at: DateTime<Utc>,
    },
    IntervalPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    IntervalResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    IntervalCompleted {
        attempt: u64,
        interval_type: IntervalType,
        duration_secs: u64,
        task_id: Option<String>,
        record_id: Option<String>,
        /// Interval the auto-chaining policy will start after the delay.
        chain_to: Option<IntervalType>,
        at: DateTime<Utc>,
    },
    /// An in-flight attempt was abandoned (skip, reset, or type switch).
    IntervalCancelled {
        attempt: u64,
        interval_type: IntervalType,
        remaining_secs: u64,
        record_id: Option<String>,
        at: DateTime<Utc>,
    },
    TimerReset {
        interval_type: IntervalType,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    IntervalTypeChanged {
        from: IntervalType,
        to: IntervalType,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    DurationsChanged {
        focus_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::IntervalStarted { at, .. }
            | Event::IntervalPaused { at, .. }
            | Event::IntervalResumed { at, .. }
            | Event::IntervalCompleted { at, .. }
            | Event::IntervalCancelled { at, .. }
            | Event::TimerReset { at, .. }
            | Event::IntervalTypeChanged { at, .. }
            | Event::DurationsChanged { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_variant() {
        let event = Event::IntervalPaused {
            remaining_secs: 42,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "IntervalPaused");
        assert_eq!(json["remaining_secs"], 42);
    }
}
