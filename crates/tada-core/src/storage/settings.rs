//! Timer preferences blob.
//!
//! Read-only from the engine's point of view: the blob is loaded once and
//! handed to [`TimerEngine`](crate::timer::TimerEngine) at construction.
//! Absent or malformed data never errors, it falls back to defaults field by
//! field where possible and wholesale otherwise.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::data_dir;
use crate::timer::BellSound;

/// Fixed key the preference blob is stored under.
pub const SETTINGS_KEY: &str = "timer-settings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimerSettings {
    /// Sound for interval bells when a schedule has to be synthesized.
    pub bell_sound: BellSound,
    /// Rung once when the timer starts.
    pub start_bell: BellSound,
    /// Length of the implicit interval used for an empty schedule.
    pub target_minutes: u64,
    pub warm_up_seconds: u64,
    pub capture_mood: bool,
    pub capture_reflection: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            bell_sound: BellSound::Bell,
            start_bell: BellSound::Bell,
            target_minutes: 20,
            warm_up_seconds: 0,
            capture_mood: true,
            capture_reflection: true,
        }
    }
}

impl TimerSettings {
    /// Load from `<data_dir>/timer-settings.json`.
    pub fn load() -> Self {
        match data_dir() {
            Ok(dir) => Self::load_from(&dir.join(format!("{SETTINGS_KEY}.json"))),
            Err(e) => {
                warn!("timer settings unavailable, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) => {
                debug!("no timer settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn from_json(content: &str) -> Self {
        match serde_json::from_str::<TimerSettings>(content) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("malformed timer settings, using defaults: {e}");
                Self::default()
            }
        }
    }

    fn sanitized(mut self) -> Self {
        if self.target_minutes == 0 {
            self.target_minutes = Self::default().target_minutes;
        }
        self
    }
}
