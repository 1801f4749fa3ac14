//! # Pomoflow Core Library
//!
//! Core logic for the Pomoflow interval timer: a Pomodoro-style timer that
//! cycles between focus intervals and short or long breaks, optionally
//! chaining them automatically. The `pomoflow` CLI is a thin layer over this
//! crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine. Every transition
//!   takes the current instant; `reconcile()` derives elapsed time from it so
//!   throttled or delayed ticks never drift the countdown.
//! - **Session**: A tokio actor that owns the engine, drives it from a
//!   background ticker and fans transitions out to side effects (cues, media
//!   playback, history).
//! - **Storage**: SQLite task and interval history, TOML configuration.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`TimerService`] / [`TimerHandle`]: Running session and its command surface
//! - [`Database`]: Task, history and statistics persistence
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use session::{
    Collaborators, MediaPreferences, SessionOptions, TimerCommand, TimerHandle, TimerService,
};
pub use storage::{Config, Database};
pub use timer::{DurationConfig, IntervalType, SessionStatus, TimerEngine, TimerSnapshot, TimerState};
