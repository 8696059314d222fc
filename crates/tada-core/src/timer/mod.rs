mod clock;
mod engine;
mod schedule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Phase, SessionState, SessionSummary, TimerEngine, TimerSnapshot};
pub use schedule::{BellSound, IntervalSpec, IntervalTarget, Schedule, TimerMode};
