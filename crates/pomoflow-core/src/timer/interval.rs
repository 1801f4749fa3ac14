use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Shortest duration any interval may be configured with.
pub const MIN_DURATION_SECS: u64 = 60;

pub const DEFAULT_FOCUS_SECS: u64 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SECS: u64 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalType {
    Focus,
    ShortBreak,
    LongBreak,
}

impl IntervalType {
    pub fn is_break(self) -> bool {
        !matches!(self, IntervalType::Focus)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalType::Focus => "FOCUS",
            IntervalType::ShortBreak => "SHORT_BREAK",
            IntervalType::LongBreak => "LONG_BREAK",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntervalType::Focus => "Focus",
            IntervalType::ShortBreak => "Short Break",
            IntervalType::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for IntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalType {
    type Err = ValidationError;

    /// Accepts the stored form (`SHORT_BREAK`) as well as CLI spellings
    /// (`short-break`, `short_break`, `short`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "focus" | "pomodoro" => Ok(IntervalType::Focus),
            "short_break" | "short" => Ok(IntervalType::ShortBreak),
            "long_break" | "long" => Ok(IntervalType::LongBreak),
            _ => Err(ValidationError::UnknownIntervalType(s.to_string())),
        }
    }
}

/// Lifecycle stage of the current interval attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Running or paused: an attempt is in flight.
    pub fn is_live(self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }
}

/// Per-interval target durations plus the auto-chaining switches.
///
/// Durations are clamped to [`MIN_DURATION_SECS`] when written; the fields are
/// private so nothing can bypass the floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationConfig {
    focus_secs: u64,
    short_break_secs: u64,
    long_break_secs: u64,
    #[serde(default)]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_pomodoros: bool,
    /// Every n-th completed focus interval is followed by a long break.
    /// Zero disables long breaks when chaining.
    #[serde(default)]
    pub long_break_interval: u32,
}

impl DurationConfig {
    pub fn new(focus_secs: u64, short_break_secs: u64, long_break_secs: u64) -> Self {
        let mut cfg = Self::default();
        cfg.set_durations(focus_secs, short_break_secs, long_break_secs);
        cfg
    }

    pub fn from_minutes(focus_min: u64, short_break_min: u64, long_break_min: u64) -> Self {
        Self::new(
            focus_min.saturating_mul(60),
            short_break_min.saturating_mul(60),
            long_break_min.saturating_mul(60),
        )
    }

    pub fn set_durations(&mut self, focus_secs: u64, short_break_secs: u64, long_break_secs: u64) {
        self.focus_secs = focus_secs.max(MIN_DURATION_SECS);
        self.short_break_secs = short_break_secs.max(MIN_DURATION_SECS);
        self.long_break_secs = long_break_secs.max(MIN_DURATION_SECS);
    }

    pub fn focus_secs(&self) -> u64 {
        self.focus_secs
    }

    pub fn short_break_secs(&self) -> u64 {
        self.short_break_secs
    }

    pub fn long_break_secs(&self) -> u64 {
        self.long_break_secs
    }

    pub fn duration_secs(&self, interval_type: IntervalType) -> u64 {
        match interval_type {
            IntervalType::Focus => self.focus_secs,
            IntervalType::ShortBreak => self.short_break_secs,
            IntervalType::LongBreak => self.long_break_secs,
        }
    }
}

impl Default for DurationConfig {
    fn default() -> Self {
        Self {
            focus_secs: DEFAULT_FOCUS_SECS,
            short_break_secs: DEFAULT_SHORT_BREAK_SECS,
            long_break_secs: DEFAULT_LONG_BREAK_SECS,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            long_break_interval: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_25_5_15_minutes() {
        let cfg = DurationConfig::default();
        assert_eq!(cfg.focus_secs(), 1500);
        assert_eq!(cfg.short_break_secs(), 300);
        assert_eq!(cfg.long_break_secs(), 900);
        assert!(!cfg.auto_start_breaks);
        assert!(!cfg.auto_start_pomodoros);
    }

    #[test]
    fn floor_applies_on_write() {
        let cfg = DurationConfig::new(0, 0, 0);
        assert_eq!(
            (cfg.focus_secs(), cfg.short_break_secs(), cfg.long_break_secs()),
            (60, 60, 60)
        );

        let cfg = DurationConfig::new(59, 61, 3600);
        assert_eq!(cfg.focus_secs(), 60);
        assert_eq!(cfg.short_break_secs(), 61);
        assert_eq!(cfg.long_break_secs(), 3600);
    }

    #[test]
    fn interval_type_parses_cli_spellings() {
        assert_eq!("focus".parse::<IntervalType>().unwrap(), IntervalType::Focus);
        assert_eq!("short-break".parse::<IntervalType>().unwrap(), IntervalType::ShortBreak);
        assert_eq!("LONG_BREAK".parse::<IntervalType>().unwrap(), IntervalType::LongBreak);
        assert!("nap".parse::<IntervalType>().is_err());
    }

    #[test]
    fn interval_type_serializes_screaming_case() {
        let json = serde_json::to_string(&IntervalType::ShortBreak).unwrap();
        assert_eq!(json, "\"SHORT_BREAK\"");
        assert_eq!(IntervalType::ShortBreak.to_string(), "SHORT_BREAK");
    }
}
