use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{BellSound, Phase, TimerMode};

/// Every state change of the timer produces an Event.
/// Front ends print or render them; the runner forwards them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        mode: TimerMode,
        warm_up_secs: u64,
        at: DateTime<Utc>,
    },
    WarmUpCompleted {
        at: DateTime<Utc>,
    },
    /// Elapsed time starts counting from here.
    SessionBegan {
        mode: TimerMode,
        at: DateTime<Utc>,
    },
    /// One audible bell. `coalesced` is how many boundaries it stands for
    /// (more than one when ticks were delayed past several of them).
    BellRung {
        sound: BellSound,
        coalesced: u32,
        rings_count: u32,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Every fixed-schedule interval has completed.
    OvertimeStarted {
        final_target_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        from: Phase,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        phase: Phase,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        elapsed_secs: u64,
        overtime_secs: u64,
        rings_count: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::TimerStarted { at, .. }
            | Event::WarmUpCompleted { at }
            | Event::SessionBegan { at, .. }
            | Event::BellRung { at, .. }
            | Event::OvertimeStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerResumed { at, .. }
            | Event::TimerStopped { at, .. }
            | Event::TimerReset { at } => *at,
        }
    }
}
