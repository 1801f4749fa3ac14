//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Interval durations and auto-start behaviour
//! - Notification cue preferences
//! - External media player control
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::session::MediaPreferences;
use crate::timer::DurationConfig;

/// Schedule configuration. Durations are in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_focus_duration")]
    pub focus_duration: u64,
    #[serde(default = "default_short_break")]
    pub short_break: u64,
    #[serde(default = "default_long_break")]
    pub long_break: u64,
    /// Every n-th focus interval is followed by a long break; 0 disables.
    #[serde(default)]
    pub long_break_interval: u32,
    #[serde(default)]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_pomodoros: bool,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_50")]
    pub volume: u32,
}

/// External media player configuration.
///
/// The commands are run through the shell; an empty command disables that
/// action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_true")]
    pub autoplay_on_focus: bool,
    #[serde(default = "default_true")]
    pub pause_on_break: bool,
    #[serde(default)]
    pub play_command: String,
    #[serde(default)]
    pub pause_command: String,
    /// Exits successfully and prints `playing` while media is playing.
    #[serde(default)]
    pub status_command: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

// Default functions
fn default_focus_duration() -> u64 {
    25
}
fn default_short_break() -> u64 {
    5
}
fn default_long_break() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_50() -> u32 {
    50
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            focus_duration: default_focus_duration(),
            short_break: default_short_break(),
            long_break: default_long_break(),
            long_break_interval: 0,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 50,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            autoplay_on_focus: true,
            pause_on_break: true,
            play_command: String::new(),
            pause_command: String::new(),
            status_command: String::new(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing the default file if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a leaf value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// as the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Timer durations and chaining switches from `[schedule]`.
    pub fn duration_config(&self) -> DurationConfig {
        let s = &self.schedule;
        let mut durations = DurationConfig::from_minutes(s.focus_duration, s.short_break, s.long_break);
        durations.auto_start_breaks = s.auto_start_breaks;
        durations.auto_start_pomodoros = s.auto_start_pomodoros;
        durations.long_break_interval = s.long_break_interval;
        durations
    }

    pub fn media_preferences(&self) -> MediaPreferences {
        MediaPreferences {
            autoplay_on_start: self.media.autoplay_on_focus,
            pause_on_complete: self.media.pause_on_break,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.notifications.volume, 50);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let parsed: Config = toml::from_str("[schedule]\nfocus_duration = 50\n").unwrap();
        assert_eq!(parsed.schedule.focus_duration, 50);
        assert_eq!(parsed.schedule.short_break, 5);
        assert!(parsed.media.autoplay_on_focus);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("media.pause_on_break").as_deref(), Some("true"));
        assert_eq!(cfg.get("schedule.focus_duration").as_deref(), Some("25"));
        assert_eq!(cfg.get("media.play_command").as_deref(), Some(""));
        assert!(cfg.get("media.missing_key").is_none());
        assert!(cfg.get("schedule").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("schedule.auto_start_breaks", "true").unwrap();
        cfg.set("notifications.volume", "75").unwrap();
        cfg.set("media.play_command", "playerctl play").unwrap();
        assert!(cfg.schedule.auto_start_breaks);
        assert_eq!(cfg.notifications.volume, 75);
        assert_eq!(cfg.media.play_command, "playerctl play");
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("media.nonexistent_key", "value"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("media", "x"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(cfg.set("", "x"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("schedule.auto_start_breaks", "not_a_bool"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("schedule.focus_duration", "-5"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn duration_config_converts_minutes_and_clamps() {
        let mut cfg = Config::default();
        cfg.schedule.focus_duration = 30;
        cfg.schedule.short_break = 0;
        cfg.schedule.long_break_interval = 4;
        cfg.schedule.auto_start_breaks = true;
        let durations = cfg.duration_config();
        assert_eq!(durations.focus_secs(), 1800);
        assert_eq!(durations.short_break_secs(), 60);
        assert_eq!(durations.long_break_secs(), 900);
        assert_eq!(durations.long_break_interval, 4);
        assert!(durations.auto_start_breaks);
        assert!(!durations.auto_start_pomodoros);
    }

    #[test]
    fn entries_lists_every_leaf() {
        let entries = Config::default().entries();
        assert!(entries.contains(&("schedule.focus_duration".to_string(), "25".to_string())));
        assert!(entries.contains(&("media.autoplay_on_focus".to_string(), "true".to_string())));
        assert_eq!(entries.len(), 13);
    }

    #[test]
    fn load_from_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("schedule.long_break_interval", "4").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "schedule = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
