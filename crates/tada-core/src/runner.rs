//! Async driver for a [`TimerEngine`].
//!
//! The runner owns the engine for the life of a session. It ticks it once a
//! second, applies [`Command`]s from any number of front ends, forwards
//! engine events and publishes a fresh [`TimerSnapshot`] after every change.
//! It returns the engine when the session is stopped or reset so the caller
//! can save it.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::events::Event;
use crate::timer::{TimerEngine, TimerSnapshot};

/// User intent sent to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    /// Pause if running, resume if paused.
    Toggle,
    /// End the warm-up early.
    SkipWarmUp,
    Stop,
    Reset,
}

/// Front-end side of a [`SessionRunner`].
#[derive(Debug)]
pub struct RunnerHandle {
    commands: mpsc::Sender<Command>,
    pub snapshots: watch::Receiver<TimerSnapshot>,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl RunnerHandle {
    /// Returns false once the runner has finished.
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Another sender for the same runner, e.g. for a signal handler.
    pub fn commander(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }
}

pub struct SessionRunner {
    engine: TimerEngine,
    tick_period: Duration,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<TimerSnapshot>,
    events: mpsc::UnboundedSender<Event>,
}

impl SessionRunner {
    /// Wrap a started engine.
    pub fn new(engine: TimerEngine) -> (Self, RunnerHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let runner = Self {
            engine,
            tick_period: Duration::from_secs(1),
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx,
        };
        let handle = RunnerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_rx,
        };
        (runner, handle)
    }

    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    /// Drive the engine until it leaves the active phases.
    ///
    /// Dropping every command sender stops the session.
    pub async fn run(mut self) -> TimerEngine {
        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.engine.phase().is_active() {
            tokio::select! {
                _ = interval.tick() => {
                    let events = self.engine.tick();
                    self.publish(events);
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        debug!("All command senders dropped, stopping session");
                        self.apply(Command::Stop);
                    }
                },
            }
        }

        debug!("Runner finished in phase {}", self.engine.phase());
        self.engine
    }

    fn apply(&mut self, command: Command) {
        let result = match command {
            Command::Pause => self.engine.pause(),
            Command::Resume => self.engine.resume(),
            Command::Toggle if self.engine.state().paused_from.is_some() => self.engine.resume(),
            Command::Toggle => self.engine.pause(),
            Command::SkipWarmUp => self.engine.begin_session(),
            Command::Stop => self.engine.stop(),
            Command::Reset => Ok(self.engine.reset()),
        };
        match result {
            Ok(event) => self.publish(vec![event]),
            Err(e) => warn!("Ignoring {command:?}: {e}"),
        }
    }

    /// Forward events, then publish a snapshot even when there were none so
    /// the elapsed display keeps moving.
    fn publish(&mut self, events: Vec<Event>) {
        for event in events {
            // A front end that stopped listening is not an error.
            let _ = self.events.send(event);
        }
        self.snapshots.send_replace(self.engine.snapshot());
    }
}
