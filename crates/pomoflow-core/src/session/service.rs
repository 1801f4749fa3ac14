//! The timer service: sole owner of the [`TimerEngine`].
//!
//! Runs as a tokio task. User commands arrive through a [`TimerHandle`];
//! ticker events, created records and chain timer expiries arrive on their
//! own channels. Everything is applied one message at a time, in arrival
//! order, so no locking is involved. Observers follow the timer through a
//! `watch` channel of snapshots and a `broadcast` channel of events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::coordinator::{Collaborators, RecordAttachment, SideEffectCoordinator};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::timer::{
    AttachOutcome, Clock, IntervalType, SessionStatus, SystemClock, Ticker, TickerCommand,
    TickerEvent, TimerEngine, TimerSnapshot, CHAIN_DELAY,
};

const EVENT_BUFFER: usize = 64;

/// Runtime knobs for a [`TimerService`].
#[derive(Clone)]
pub struct SessionOptions {
    pub tick_period: Duration,
    pub chain_delay: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            chain_delay: CHAIN_DELAY,
            clock: Arc::new(SystemClock),
        }
    }
}

/// User-facing command surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCommand {
    Start { record_id: Option<String> },
    Pause,
    Resume,
    Skip,
    Reset,
    /// Reconcile against the clock now.
    Tick,
    SetIntervalType(IntervalType),
    SetDurations {
        focus_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
    },
    SetAutoStartBreaks(bool),
    SetAutoStartPomodoros(bool),
    SetLongBreakInterval(u32),
    SelectTask(Option<String>),
    Snapshot,
}

enum Message {
    Command(TimerCommand, oneshot::Sender<TimerSnapshot>),
    Shutdown(oneshot::Sender<TimerEngine>),
}

/// A chained start that came due, tagged with the attempt that completed.
struct ChainedStart {
    attempt: u64,
    next: IntervalType,
    due_at: DateTime<Utc>,
}

/// Cloneable handle to a running [`TimerService`].
#[derive(Clone)]
pub struct TimerHandle {
    inbox: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<TimerSnapshot>,
    events: broadcast::Sender<Event>,
}

impl TimerHandle {
    /// Apply a command and return the resulting snapshot.
    pub async fn send(&self, command: TimerCommand) -> Result<TimerSnapshot> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Command(command, reply))
            .map_err(|_| CoreError::ServiceStopped)?;
        response.await.map_err(|_| CoreError::ServiceStopped)
    }

    pub async fn start(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Start { record_id: None }).await
    }

    pub async fn pause(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Resume).await
    }

    pub async fn skip(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Skip).await
    }

    pub async fn reset(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Reset).await
    }

    pub async fn tick(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Tick).await
    }

    pub async fn snapshot(&self) -> Result<TimerSnapshot> {
        self.send(TimerCommand::Snapshot).await
    }

    pub async fn set_interval_type(&self, interval_type: IntervalType) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SetIntervalType(interval_type)).await
    }

    pub async fn set_durations(
        &self,
        focus_secs: u64,
        short_break_secs: u64,
        long_break_secs: u64,
    ) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SetDurations {
            focus_secs,
            short_break_secs,
            long_break_secs,
        })
        .await
    }

    pub async fn set_auto_start_breaks(&self, enabled: bool) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SetAutoStartBreaks(enabled)).await
    }

    pub async fn set_auto_start_pomodoros(&self, enabled: bool) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SetAutoStartPomodoros(enabled)).await
    }

    pub async fn set_long_break_interval(&self, every: u32) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SetLongBreakInterval(every)).await
    }

    pub async fn select_task(&self, task_id: Option<String>) -> Result<TimerSnapshot> {
        self.send(TimerCommand::SelectTask(task_id)).await
    }

    /// Latest published snapshot, updated after every message.
    pub fn subscribe_state(&self) -> watch::Receiver<TimerSnapshot> {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Stop the service, flush outstanding side effects and hand back the
    /// engine so it can be persisted.
    pub async fn shutdown(self) -> Result<TimerEngine> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Message::Shutdown(reply))
            .map_err(|_| CoreError::ServiceStopped)?;
        response.await.map_err(|_| CoreError::ServiceStopped)
    }
}

pub struct TimerService {
    engine: TimerEngine,
    clock: Arc<dyn Clock>,
    chain_delay: Duration,
    coordinator: SideEffectCoordinator,
    attachments: mpsc::UnboundedReceiver<RecordAttachment>,
    ticker: Ticker,
    ticks: mpsc::UnboundedReceiver<TickerEvent>,
    inbox: mpsc::UnboundedReceiver<Message>,
    chain_tx: mpsc::UnboundedSender<ChainedStart>,
    chain_rx: mpsc::UnboundedReceiver<ChainedStart>,
    pending_chain: Option<JoinHandle<()>>,
    state_tx: watch::Sender<TimerSnapshot>,
    events_tx: broadcast::Sender<Event>,
}

impl TimerService {
    /// Spawn the service on the current tokio runtime.
    ///
    /// An engine restored mid-interval resumes ticking immediately.
    pub fn spawn(
        engine: TimerEngine,
        collaborators: Collaborators,
        options: SessionOptions,
    ) -> TimerHandle {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (chain_tx, chain_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(engine.snapshot(options.clock.now()));
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (coordinator, attachments) = SideEffectCoordinator::new(collaborators);
        let (ticker, ticks) = Ticker::spawn(options.tick_period);

        if engine.status() == SessionStatus::Running {
            ticker.send(TickerCommand::Start {
                remaining_secs: engine.remaining_secs(),
            });
        }

        let service = Self {
            engine,
            clock: options.clock,
            chain_delay: options.chain_delay,
            coordinator,
            attachments,
            ticker,
            ticks,
            inbox,
            chain_tx,
            chain_rx,
            pending_chain: None,
            state_tx,
            events_tx: events_tx.clone(),
        };
        tokio::spawn(service.run());

        TimerHandle {
            inbox: inbox_tx,
            state: state_rx,
            events: events_tx,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(Message::Command(command, reply)) => {
                        let snapshot = self.apply(command);
                        // The caller may have stopped waiting.
                        let _ = reply.send(snapshot);
                    }
                    Some(Message::Shutdown(reply)) => {
                        self.stop().await;
                        let _ = reply.send(self.engine.clone());
                        return;
                    }
                    None => {
                        self.stop().await;
                        return;
                    }
                },
                Some(event) = self.ticks.recv() => self.on_tick(event),
                Some(attachment) = self.attachments.recv() => self.on_attachment(attachment),
                Some(chained) = self.chain_rx.recv() => self.on_chain(chained),
            }
        }
    }

    fn apply(&mut self, command: TimerCommand) -> TimerSnapshot {
        let now = self.clock.now();
        debug!(?command, "timer command");
        let mut events = Vec::new();
        match command {
            TimerCommand::Start { record_id } => {
                self.cancel_chain();
                events.extend(self.engine.start(now, record_id));
            }
            TimerCommand::Pause => {
                events.extend(self.engine.reconcile(now));
                events.extend(self.engine.pause(now));
            }
            TimerCommand::Resume => events.extend(self.engine.resume(now)),
            TimerCommand::Skip => {
                self.cancel_chain();
                events.extend(self.engine.reconcile(now));
                events.extend(self.engine.skip(now));
            }
            TimerCommand::Reset => {
                self.cancel_chain();
                events.extend(self.engine.reconcile(now));
                events.extend(self.engine.reset(now));
            }
            TimerCommand::Tick => events.extend(self.engine.reconcile(now)),
            TimerCommand::SetIntervalType(interval_type) => {
                self.cancel_chain();
                events.extend(self.engine.reconcile(now));
                events.extend(self.engine.set_interval_type(now, interval_type));
            }
            TimerCommand::SetDurations {
                focus_secs,
                short_break_secs,
                long_break_secs,
            } => events.push(self.engine.set_durations(
                now,
                focus_secs,
                short_break_secs,
                long_break_secs,
            )),
            TimerCommand::SetAutoStartBreaks(enabled) => self.engine.set_auto_start_breaks(enabled),
            TimerCommand::SetAutoStartPomodoros(enabled) => {
                self.engine.set_auto_start_pomodoros(enabled)
            }
            TimerCommand::SetLongBreakInterval(every) => self.engine.set_long_break_interval(every),
            TimerCommand::SelectTask(task_id) => self.engine.select_task(task_id),
            TimerCommand::Snapshot => {}
        }
        self.dispatch(events);
        self.publish()
    }

    fn on_tick(&mut self, event: TickerEvent) {
        let now = self.clock.now();
        let events: Vec<Event> = self.engine.reconcile(now).into_iter().collect();
        self.dispatch(events);
        if self.engine.status() == SessionStatus::Running {
            if event == TickerEvent::Complete {
                // The ticker ran out early against the wall clock; keep it going.
                self.ticker.send(TickerCommand::Start {
                    remaining_secs: self.engine.remaining_secs(),
                });
            } else {
                self.ticker.send(TickerCommand::SetTime {
                    remaining_secs: self.engine.remaining_secs(),
                });
            }
        }
        self.publish();
    }

    fn on_attachment(&mut self, attachment: RecordAttachment) {
        let RecordAttachment { attempt, record_id } = attachment;
        let now = self.clock.now();
        match self.engine.attach_record(attempt, record_id.clone()) {
            AttachOutcome::Attached => debug!(attempt, %record_id, "record attached"),
            AttachOutcome::AlreadyCompleted => {
                debug!(attempt, %record_id, "record arrived after completion");
                self.coordinator.complete_record(record_id, now);
            }
            AttachOutcome::Abandoned => {
                debug!(attempt, %record_id, "record arrived for abandoned attempt");
                self.coordinator.cancel_record(record_id, None, now);
            }
        }
        self.publish();
    }

    fn on_chain(&mut self, chained: ChainedStart) {
        self.pending_chain = None;
        let ChainedStart { attempt, next, due_at } = chained;
        let now = self.clock.now();
        // Anchor at the completion instant plus the delay so a late catch-up
        // does not stretch the gap between intervals.
        let mut events = self.engine.start_chained(due_at.min(now), attempt, next);
        if !events.is_empty() {
            info!(%next, "auto-starting next interval");
            events.extend(self.engine.reconcile(now));
        }
        self.dispatch(events);
        self.publish();
    }

    fn dispatch(&mut self, events: Vec<Event>) {
        for event in events {
            self.coordinator.observe(&event);
            match &event {
                Event::IntervalStarted { .. } => self.ticker.send(TickerCommand::Start {
                    remaining_secs: self.engine.remaining_secs(),
                }),
                Event::IntervalPaused { .. } => self.ticker.send(TickerCommand::Pause),
                Event::IntervalResumed { .. } => self.ticker.send(TickerCommand::Resume),
                Event::IntervalCompleted {
                    attempt,
                    interval_type,
                    chain_to,
                    at,
                    ..
                } => {
                    info!(attempt, %interval_type, "interval completed");
                    self.ticker.send(TickerCommand::Stop);
                    if let Some(next) = chain_to {
                        self.schedule_chain(*attempt, *next, *at);
                    }
                }
                Event::IntervalCancelled { .. } | Event::TimerReset { .. } => {
                    self.ticker.send(TickerCommand::Stop)
                }
                Event::IntervalTypeChanged { .. } | Event::DurationsChanged { .. } => {}
            }
            // No subscribers is fine.
            let _ = self.events_tx.send(event);
        }
    }

    fn schedule_chain(&mut self, attempt: u64, next: IntervalType, completed_at: DateTime<Utc>) {
        self.cancel_chain();
        let chain_tx = self.chain_tx.clone();
        let delay = self.chain_delay;
        let due_at = completed_at
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        debug!(attempt, %next, ?delay, "chained start scheduled");
        self.pending_chain = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = chain_tx.send(ChainedStart {
                attempt,
                next,
                due_at,
            });
        }));
    }

    fn cancel_chain(&mut self) {
        if let Some(pending) = self.pending_chain.take() {
            debug!("pending chained start cancelled");
            pending.abort();
        }
    }

    fn publish(&self) -> TimerSnapshot {
        let snapshot = self.engine.snapshot(self.clock.now());
        self.state_tx.send_replace(snapshot.clone());
        snapshot
    }

    async fn stop(&mut self) {
        self.cancel_chain();
        self.ticker.send(TickerCommand::Stop);
        self.coordinator.flush().await;
        // Records created while flushing still need a home.
        while let Ok(attachment) = self.attachments.try_recv() {
            self.on_attachment(attachment);
        }
        self.coordinator.flush().await;
        debug!("timer service stopped");
    }
}
