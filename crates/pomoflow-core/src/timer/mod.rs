mod chain;
mod clock;
mod engine;
mod interval;
mod ticker;

pub use chain::{next_interval, CHAIN_DELAY};
pub use clock::{reconcile, Clock, ManualClock, Reconciliation, SystemClock};
pub use engine::{AttachOutcome, TimerEngine, TimerSnapshot, TimerState};
pub use interval::{
    DurationConfig, IntervalType, SessionStatus, DEFAULT_FOCUS_SECS, DEFAULT_LONG_BREAK_SECS,
    DEFAULT_SHORT_BREAK_SECS, MIN_DURATION_SECS,
};
pub use ticker::{Ticker, TickerCommand, TickerEvent};
