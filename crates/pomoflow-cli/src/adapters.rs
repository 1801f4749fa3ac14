//! Collaborators backed by the local machine: shell commands for media
//! playback and the terminal bell for cues.

use std::io::Write;
use std::process::Command;

use pomoflow_core::session::{CueKind, CuePlayer, PlaybackController};
use pomoflow_core::storage::{MediaConfig, NotificationsConfig};
use pomoflow_core::CoreError;
use tracing::debug;

/// Drives an external player through user-configured shell commands.
pub struct CommandPlayback {
    config: MediaConfig,
}

impl CommandPlayback {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    fn shell(command: &str) -> Result<String, CoreError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| CoreError::collaborator("playback", format!("{command}: {e}")))?;
        if !output.status.success() {
            return Err(CoreError::collaborator(
                "playback",
                format!("{command}: exited with {}", output.status),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl PlaybackController for CommandPlayback {
    fn is_playing(&self) -> pomoflow_core::error::Result<bool> {
        if self.config.status_command.is_empty() {
            return Ok(false);
        }
        let status = Self::shell(&self.config.status_command)?;
        Ok(status.eq_ignore_ascii_case("playing"))
    }

    fn pause(&self) -> pomoflow_core::error::Result<()> {
        if self.config.pause_command.is_empty() {
            debug!("no pause command configured");
            return Ok(());
        }
        Self::shell(&self.config.pause_command).map(|_| ())
    }

    fn resume(&self) -> pomoflow_core::error::Result<()> {
        if self.config.play_command.is_empty() {
            debug!("no play command configured");
            return Ok(());
        }
        Self::shell(&self.config.play_command).map(|_| ())
    }
}

/// Rings the terminal bell on stderr.
pub struct TerminalCue {
    enabled: bool,
}

impl TerminalCue {
    pub fn new(config: &NotificationsConfig) -> Self {
        Self {
            enabled: config.enabled && config.volume > 0,
        }
    }
}

impl CuePlayer for TerminalCue {
    fn play_cue(&self, kind: CueKind) {
        if !self.enabled {
            return;
        }
        // Two bells mark the end of an interval.
        let bells = match kind {
            CueKind::Start => "\x07",
            CueKind::Complete => "\x07\x07",
        };
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(bells.as_bytes());
        let _ = stderr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_playback_is_a_no_op() {
        let playback = CommandPlayback::new(MediaConfig::default());
        assert!(!playback.is_playing().unwrap());
        playback.pause().unwrap();
        playback.resume().unwrap();
    }

    #[test]
    fn status_command_reports_playing() {
        let playback = CommandPlayback::new(MediaConfig {
            status_command: "echo Playing".to_string(),
            ..MediaConfig::default()
        });
        assert!(playback.is_playing().unwrap());
    }

    #[test]
    fn failing_command_is_a_collaborator_error() {
        let playback = CommandPlayback::new(MediaConfig {
            play_command: "exit 3".to_string(),
            ..MediaConfig::default()
        });
        assert!(matches!(
            playback.resume(),
            Err(CoreError::Collaborator { collaborator: "playback", .. })
        ));
    }
}
