//! Running a timer session: the service actor that owns the engine and the
//! side effects its transitions trigger.

pub mod collaborators;
mod coordinator;
mod service;

pub use collaborators::{
    calculate_xp, CueKind, CuePlayer, DailyStatDelta, Detached, IntervalHistory,
    NewIntervalRecord, PlaybackController, RecordId, Task, TaskId, TaskStore,
    XP_PER_FOCUS_MINUTE,
};
pub use coordinator::{Collaborators, MediaPreferences, RecordAttachment, SideEffectCoordinator};
pub use service::{SessionOptions, TimerCommand, TimerHandle, TimerService};
