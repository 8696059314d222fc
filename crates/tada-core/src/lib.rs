//! # Ta-Da! Core Library
//!
//! This library provides the timing engine behind the Ta-Da! meditation
//! timer. Front ends (the `tada` CLI, or anything else) drive it and render
//! its snapshots; the library itself never touches a terminal.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine that requires the caller
//!   to periodically invoke `tick()`. Bells are derived from absolute
//!   timestamps, so a throttled or suspended caller never loses time.
//! - **Schedule**: Interval rules (`duration x repeats : sound`) that decide
//!   between a fixed session ending in overtime and an unlimited session with
//!   recurring milestones.
//! - **Runner**: A tokio task that ticks one engine and applies commands.
//! - **Persist**: Submission of finished sessions to the entry API.
//! - **Storage**: TOML configuration and the JSON timer settings blob.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`Schedule`]: Validated interval list
//! - [`SessionRunner`]: Async tick loop
//! - [`SessionPersister`]: Trait for session destinations
//! - [`Config`]: Application configuration management

pub mod audio;
pub mod error;
pub mod events;
pub mod persist;
pub mod runner;
pub mod storage;
pub mod timer;
pub mod wake_lock;

pub use audio::{BellPlayer, SilentPlayer, TerminalBell};
pub use error::{ConfigError, CoreError, PersistError, TimerError, ValidationError};
pub use events::Event;
pub use persist::{save_session, HttpPersister, SaveRequest, SessionPersister, SessionSubmission};
pub use runner::{Command, RunnerHandle, SessionRunner};
pub use storage::{Config, TimerSettings};
pub use timer::{
    BellSound, Clock, IntervalSpec, ManualClock, Phase, Schedule, SessionSummary, SystemClock,
    TimerEngine, TimerMode, TimerSnapshot,
};
pub use wake_lock::{InhibitorLock, NoWakeLock, WakeLock};
