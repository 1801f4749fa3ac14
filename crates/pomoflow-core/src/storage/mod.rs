mod config;
pub mod database;

pub use config::{Config, MediaConfig, NotificationsConfig, ScheduleConfig};
pub use database::{Database, IntervalRecord, RecordStatus, Stats, StoredDailyStat};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `POMOFLOW_DATA_DIR` wins when set. Otherwise `~/.config/pomoflow`, or
/// `~/.config/pomoflow-dev` when `POMOFLOW_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("POMOFLOW_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("POMOFLOW_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pomoflow-dev")
            } else {
                base_dir.join("pomoflow")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
