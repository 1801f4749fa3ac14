//! Auto-chaining policy: what, if anything, starts after an interval completes.

use std::time::Duration;

use super::interval::{DurationConfig, IntervalType};

/// Pause between a completion and the chained start, so completion cues play
/// before the next start cue.
pub const CHAIN_DELAY: Duration = Duration::from_secs(1);

/// Interval to start automatically after `completed`, if any.
///
/// `completed_focus` is the number of focus intervals completed so far in the
/// session, including the one that just finished.
pub fn next_interval(
    completed: IntervalType,
    config: &DurationConfig,
    completed_focus: u32,
) -> Option<IntervalType> {
    match completed {
        IntervalType::Focus if config.auto_start_breaks => {
            Some(break_after(config.long_break_interval, completed_focus))
        }
        IntervalType::ShortBreak | IntervalType::LongBreak if config.auto_start_pomodoros => {
            Some(IntervalType::Focus)
        }
        _ => None,
    }
}

fn break_after(long_break_interval: u32, completed_focus: u32) -> IntervalType {
    if long_break_interval > 0 && completed_focus > 0 && completed_focus % long_break_interval == 0
    {
        IntervalType::LongBreak
    } else {
        IntervalType::ShortBreak
    }
}
