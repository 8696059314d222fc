//! Core error types for tada-core.
//!
//! One `thiserror` enum per concern, folded into [`CoreError`] for callers
//! that just want to propagate with `?`.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::Phase;

/// Core error type for tada-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Timer state machine errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Session submission errors
    #[error("Save failed: {0}")]
    Persist(#[from] PersistError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True when the error was raised locally before anything was sent,
    /// so retrying the same request cannot succeed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::Timer(TimerError::Validation(_))
        )
    }
}

/// Timer state machine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The requested operation is not allowed in the current phase.
    #[error("cannot {action} while {from}")]
    InvalidTransition { from: Phase, action: &'static str },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An interval must last at least one minute
    #[error("interval {index} has a zero-minute duration")]
    ZeroDuration { index: usize },

    /// A repeat-forever interval makes every later interval unreachable
    #[error("interval {index} repeats forever but is not the last interval")]
    ForeverNotLast { index: usize },

    /// Session too short to be worth persisting
    #[error("session too short to save ({elapsed_secs}s elapsed)")]
    SessionTooShort { elapsed_secs: u64 },

    /// Unparseable interval text
    #[error("invalid interval '{0}': expected MINUTESxREPEATS[:SOUND]")]
    InvalidInterval(String),

    /// Unknown bell sound name
    #[error("unknown bell sound '{0}'")]
    UnknownBellSound(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Could not create or locate the data directory
    #[error("data directory unavailable: {0}")]
    DataDir(#[source] std::io::Error),
}

/// Session submission errors.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Network or protocol failure talking to the entry API
    #[error("request to entry API failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The entry API answered with a non-success status
    #[error("entry API rejected the session (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Configured API base URL is unusable
    #[error("invalid API base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
