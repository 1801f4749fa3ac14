//! Background tick source.
//!
//! The ticker runs as its own tokio task so the countdown keeps being driven
//! when whatever issues user commands is busy. It keeps an advisory countdown
//! and reports `Tick`/`Complete`, but it never owns timer state: the receiver
//! treats every event as a stimulus to reconcile the engine against the wall
//! clock, then corrects the ticker with `SetTime`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::trace;

/// Commands into the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerCommand {
    /// Load a countdown and begin ticking.
    Start { remaining_secs: u64 },
    Pause,
    Resume,
    /// Stop ticking and clear the countdown.
    Stop,
    /// Replace the countdown without changing whether it is ticking.
    SetTime { remaining_secs: u64 },
}

/// Events out of the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerEvent {
    Tick { remaining_secs: u64 },
    Complete,
}

/// Handle to a running ticker task. Dropping it stops the task.
#[derive(Debug)]
pub struct Ticker {
    commands: mpsc::UnboundedSender<TickerCommand>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Spawn a ticker firing every `period` while running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(period: Duration) -> (Self, mpsc::UnboundedReceiver<TickerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(period, cmd_rx, event_tx));
        (
            Self {
                commands: cmd_tx,
                task,
            },
            event_rx,
        )
    }

    pub fn send(&self, command: TickerCommand) {
        // The task only exits once this handle is dropped.
        let _ = self.commands.send(command);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    period: Duration,
    mut commands: mpsc::UnboundedReceiver<TickerCommand>,
    events: mpsc::UnboundedSender<TickerEvent>,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut remaining_secs = 0u64;
    let mut running = false;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                trace!(?command, "ticker command");
                match command {
                    TickerCommand::Start { remaining_secs: secs } => {
                        remaining_secs = secs;
                        running = secs > 0;
                        interval.reset();
                    }
                    TickerCommand::Pause => running = false,
                    TickerCommand::Resume => {
                        if !running && remaining_secs > 0 {
                            running = true;
                            interval.reset();
                        }
                    }
                    TickerCommand::Stop => {
                        running = false;
                        remaining_secs = 0;
                    }
                    TickerCommand::SetTime { remaining_secs: secs } => remaining_secs = secs,
                }
            }
            _ = interval.tick(), if running => {
                remaining_secs = remaining_secs.saturating_sub(1);
                if events.send(TickerEvent::Tick { remaining_secs }).is_err() {
                    break;
                }
                if remaining_secs == 0 {
                    running = false;
                    if events.send(TickerEvent::Complete).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_completes() {
        let (ticker, mut events) = Ticker::spawn(Duration::from_secs(1));
        ticker.send(TickerCommand::Start { remaining_secs: 3 });

        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 2 }));
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 1 }));
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 0 }));
        assert_eq!(events.recv().await, Some(TickerEvent::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticks() {
        let (ticker, mut events) = Ticker::spawn(Duration::from_secs(1));
        ticker.send(TickerCommand::Start { remaining_secs: 10 });
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 9 }));

        ticker.send(TickerCommand::Pause);
        time::sleep(Duration::from_secs(5)).await;
        assert!(events.try_recv().is_err());

        ticker.send(TickerCommand::Resume);
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 8 }));
    }

    #[tokio::test(start_paused = true)]
    async fn set_time_corrects_countdown() {
        let (ticker, mut events) = Ticker::spawn(Duration::from_secs(1));
        ticker.send(TickerCommand::Start { remaining_secs: 100 });
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 99 }));
        ticker.send(TickerCommand::SetTime { remaining_secs: 2 });
        assert_eq!(events.recv().await, Some(TickerEvent::Tick { remaining_secs: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_countdown() {
        let (ticker, mut events) = Ticker::spawn(Duration::from_secs(1));
        ticker.send(TickerCommand::Start { remaining_secs: 5 });
        ticker.send(TickerCommand::Stop);
        ticker.send(TickerCommand::Resume);
        time::sleep(Duration::from_secs(3)).await;
        assert!(events.try_recv().is_err());
    }
}
