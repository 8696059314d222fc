//! Meditation session state machine.
//!
//! [`TimerEngine`] owns no thread or task of its own. Whoever drives it
//! (usually [`crate::runner::SessionRunner`]) calls `tick()` about once a
//! second and forwards user commands.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> WarmingUp -> Running <-> Paused
//!                         |
//!                         v
//!                     Overtime (fixed schedules only)
//!
//! any active phase -> Stopped -> Idle (save or reset)
//! ```
//!
//! Elapsed time is always `(now - session_start) + paused_elapsed`, never a
//! tick count. A tick that arrives late catches up in one step and rings a
//! single bell for every boundary it skipped.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(schedule, settings);
//! engine.start(0)?;
//! // Once a second:
//! for event in engine.tick() { /* ... */ }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::schedule::{BellSound, IntervalSpec, IntervalTarget, Schedule, TimerMode};
use crate::audio::{BellPlayer, SilentPlayer};
use crate::error::{TimerError, ValidationError};
use crate::events::Event;
use crate::storage::TimerSettings;
use crate::wake_lock::{NoWakeLock, WakeLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    WarmingUp,
    Running,
    Paused,
    /// Past the final bell of a fixed schedule. Time still accumulates.
    Overtime,
    /// Frozen after `stop()`, waiting for a save or reset.
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::WarmingUp => "warming up",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Overtime => "overtime",
            Phase::Stopped => "stopped",
        }
    }

    /// Started and not yet stopped.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::WarmingUp | Phase::Running | Phase::Paused | Phase::Overtime
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of one session. Owned by exactly one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    /// Phase to re-enter on resume.
    pub paused_from: Option<Phase>,
    pub elapsed_secs: u64,
    pub overtime_secs: u64,
    /// Minute marks already rung (unlimited mode).
    pub fired_milestones: BTreeSet<u64>,
    /// Cursor into the cumulative targets (fixed mode).
    pub next_interval_index: usize,
    pub rings_count: u32,
    /// `None` while paused or stopped.
    pub session_start_ms: Option<i64>,
    pub paused_elapsed_ms: u64,
    pub warm_up_secs: u64,
    /// Warm-up time left as of `warm_up_anchor_ms`.
    pub warm_up_remaining_ms: u64,
    pub warm_up_anchor_ms: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub wake_lock_held: bool,
}

/// Everything a save needs, frozen at stop time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Duration to persist; see [`TimerEngine::request_save`].
    pub duration_secs: u64,
    pub mode: TimerMode,
    pub intervals: Vec<IntervalSpec>,
    pub warm_up_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: u64,
    pub overtime_secs: u64,
    pub rings_count: u32,
}

/// Observable view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub mode: TimerMode,
    pub elapsed_secs: u64,
    pub overtime_secs: u64,
    pub rings_count: u32,
    pub next_interval_index: usize,
    pub fired_milestones: Vec<u64>,
    pub warm_up_remaining_secs: u64,
    pub next_bell_at_secs: Option<u64>,
    pub final_target_secs: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Drives one meditation session from warm-up to save.
///
/// All timing is read from the injected [`Clock`]; `tick()` only decides
/// whether a bell is due.
#[derive(Debug)]
pub struct TimerEngine {
    schedule: Schedule,
    mode: TimerMode,
    /// Only populated in fixed mode.
    targets: Vec<IntervalTarget>,
    settings: TimerSettings,
    state: SessionState,
    clock: Arc<dyn Clock>,
    bells: Box<dyn BellPlayer>,
    wake_lock: Box<dyn WakeLock>,
}

impl TimerEngine {
    /// Create a new engine in the `Idle` state.
    ///
    /// An empty schedule is replaced by one interval of
    /// `settings.target_minutes`.
    pub fn new(schedule: Schedule, settings: TimerSettings) -> Self {
        let mut engine = Self {
            schedule: Schedule::default(),
            mode: TimerMode::Fixed,
            targets: Vec::new(),
            settings,
            state: SessionState::default(),
            clock: Arc::new(SystemClock),
            bells: Box::new(SilentPlayer),
            wake_lock: Box::new(NoWakeLock),
        };
        engine.apply_schedule(schedule);
        engine
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_bell_player(mut self, bells: impl BellPlayer + 'static) -> Self {
        self.bells = Box::new(bells);
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: impl WakeLock + 'static) -> Self {
        self.wake_lock = Box::new(wake_lock);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Elapsed seconds as of the last tick, pause or stop.
    pub fn elapsed_secs(&self) -> u64 {
        self.state.elapsed_secs
    }

    pub fn overtime_secs(&self) -> u64 {
        self.state.overtime_secs
    }

    pub fn rings_count(&self) -> u32 {
        self.state.rings_count
    }

    pub fn next_interval_index(&self) -> usize {
        self.state.next_interval_index
    }

    pub fn fired_milestones(&self) -> &BTreeSet<u64> {
        &self.state.fired_milestones
    }

    /// True once every fixed-schedule target has been crossed, including
    /// while paused or stopped in overtime.
    pub fn is_overtime(&self) -> bool {
        self.mode == TimerMode::Fixed
            && !self.targets.is_empty()
            && self.state.next_interval_index >= self.targets.len()
    }

    pub fn final_target_secs(&self) -> Option<u64> {
        self.targets.last().map(|t| t.at_secs)
    }

    pub fn warm_up_remaining_secs(&self) -> u64 {
        self.warm_up_remaining_ms_at(self.clock.now_ms()).div_ceil(1000)
    }

    /// Seconds from session start at which the next bell is due.
    pub fn next_bell_at_secs(&self) -> Option<u64> {
        match self.mode {
            TimerMode::Fixed => self
                .targets
                .get(self.state.next_interval_index)
                .map(|t| t.at_secs),
            TimerMode::Unlimited => {
                let step_min = self.schedule.milestone_interval_secs()? / 60;
                let last = self.state.fired_milestones.last().copied().unwrap_or(0);
                Some((last + step_min) * 60)
            }
        }
    }

    /// Live view; elapsed and overtime are read from the clock, not from
    /// the last tick.
    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now_ms();
        let elapsed_secs = self.elapsed_ms_at(now) / 1000;
        TimerSnapshot {
            phase: self.state.phase,
            mode: self.mode,
            elapsed_secs,
            overtime_secs: self
                .final_target_secs()
                .map_or(0, |final_target| elapsed_secs.saturating_sub(final_target)),
            rings_count: self.state.rings_count,
            next_interval_index: self.state.next_interval_index,
            fired_milestones: self.state.fired_milestones.iter().copied().collect(),
            warm_up_remaining_secs: self.warm_up_remaining_ms_at(now).div_ceil(1000),
            next_bell_at_secs: self.next_bell_at_secs(),
            final_target_secs: self.final_target_secs(),
            at: self.clock.now_utc(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the schedule. Only allowed while idle.
    pub fn configure(&mut self, schedule: Schedule) -> Result<(), TimerError> {
        self.expect_phase(&[Phase::Idle], "configure")?;
        self.apply_schedule(schedule);
        Ok(())
    }

    /// Ring the start bell, take the wake lock and either begin the session
    /// or count down `warm_up_secs` first.
    pub fn start(&mut self, warm_up_secs: u64) -> Result<Vec<Event>, TimerError> {
        self.expect_phase(&[Phase::Idle], "start")?;

        self.state = SessionState {
            warm_up_secs,
            started_at: Some(self.clock.now_utc()),
            ..SessionState::default()
        };
        info!(
            "Starting {:?} session: {} interval(s), {}s warm-up",
            self.mode,
            self.schedule.intervals().len(),
            warm_up_secs
        );

        self.ring(self.settings.start_bell);
        self.acquire_wake_lock();

        let mut events = vec![Event::TimerStarted {
            mode: self.mode,
            warm_up_secs,
            at: self.clock.now_utc(),
        }];

        if warm_up_secs > 0 {
            self.state.phase = Phase::WarmingUp;
            self.state.warm_up_remaining_ms = warm_up_secs.saturating_mul(1000);
            self.state.warm_up_anchor_ms = Some(self.clock.now_ms());
        } else {
            events.push(self.enter_session(self.clock.now_ms()));
        }
        Ok(events)
    }

    /// Cut the warm-up short and start counting now.
    pub fn begin_session(&mut self) -> Result<Event, TimerError> {
        self.expect_phase(&[Phase::WarmingUp], "begin session")?;
        Ok(self.enter_session(self.clock.now_ms()))
    }

    /// Call periodically. Returns the events produced by this tick.
    pub fn tick(&mut self) -> Vec<Event> {
        match self.state.phase {
            Phase::WarmingUp => self.tick_warm_up(),
            Phase::Running | Phase::Overtime => {
                self.refresh_elapsed();
                self.catch_up(true)
            }
            _ => Vec::new(),
        }
    }

    pub fn pause(&mut self) -> Result<Event, TimerError> {
        let from = self.state.phase;
        let now = self.clock.now_ms();
        match from {
            Phase::Running | Phase::Overtime => {
                self.state.paused_elapsed_ms = self.elapsed_ms_at(now);
                self.state.session_start_ms = None;
                self.state.elapsed_secs = self.state.paused_elapsed_ms / 1000;
            }
            Phase::WarmingUp => {
                self.state.warm_up_remaining_ms = self.warm_up_remaining_ms_at(now);
                self.state.warm_up_anchor_ms = None;
            }
            _ => return Err(self.invalid("pause")),
        }
        self.state.paused_from = Some(from);
        self.state.phase = Phase::Paused;
        debug!("Paused from {from} at {}s", self.state.elapsed_secs);

        Ok(Event::TimerPaused {
            from,
            elapsed_secs: self.state.elapsed_secs,
            at: self.clock.now_utc(),
        })
    }

    /// Re-enter the phase the timer was paused from.
    pub fn resume(&mut self) -> Result<Event, TimerError> {
        let (Phase::Paused, Some(phase)) = (self.state.phase, self.state.paused_from) else {
            return Err(self.invalid("resume"));
        };
        let now = self.clock.now_ms();
        if phase == Phase::WarmingUp {
            self.state.warm_up_anchor_ms = Some(now);
        } else {
            self.state.session_start_ms = Some(now);
        }
        self.state.phase = phase;
        self.state.paused_from = None;
        debug!("Resumed {phase} at {}s", self.state.elapsed_secs);

        Ok(Event::TimerResumed {
            phase,
            elapsed_secs: self.state.elapsed_secs,
            at: self.clock.now_utc(),
        })
    }

    /// Freeze the session. Elapsed and overtime are kept for saving.
    ///
    /// Targets or milestones that fell due since the last tick are counted
    /// without ringing, so the frozen counters match the final elapsed time.
    pub fn stop(&mut self) -> Result<Event, TimerError> {
        let phase = self.state.phase;
        if !phase.is_active() {
            return Err(self.invalid("stop"));
        }
        if matches!(phase, Phase::Running | Phase::Overtime) {
            self.state.paused_elapsed_ms = self.elapsed_ms_at(self.clock.now_ms());
            self.state.session_start_ms = None;
        }
        self.state.elapsed_secs = self.state.paused_elapsed_ms / 1000;
        self.catch_up(false);
        if let Some(final_target) = self.final_target_secs() {
            self.state.overtime_secs = self.state.elapsed_secs.saturating_sub(final_target);
        }
        self.state.warm_up_anchor_ms = None;
        self.state.paused_from = None;
        self.state.phase = Phase::Stopped;
        self.release_wake_lock();
        info!(
            "Session stopped: {}s elapsed, {}s overtime, {} bell(s)",
            self.state.elapsed_secs, self.state.overtime_secs, self.state.rings_count
        );

        Ok(Event::TimerStopped {
            elapsed_secs: self.state.elapsed_secs,
            overtime_secs: self.state.overtime_secs,
            rings_count: self.state.rings_count,
            at: self.clock.now_utc(),
        })
    }

    /// Stop and clear everything back to idle. Always allowed.
    pub fn reset(&mut self) -> Event {
        self.release_wake_lock();
        self.state = SessionState::default();
        debug!("Timer reset");
        Event::TimerReset {
            at: self.clock.now_utc(),
        }
    }

    /// Freeze the session (stopping it if needed) and compute what to save.
    ///
    /// Fixed mode past the final bell persists the sum of the intervals, plus
    /// the overtime when `include_overtime`. A fixed session stopped early,
    /// and any unlimited session, persists the elapsed time.
    ///
    /// # Errors
    ///
    /// `SessionTooShort` when less than a second elapsed; nothing is sent.
    pub fn request_save(&mut self, include_overtime: bool) -> Result<SessionSummary, TimerError> {
        if self.state.phase.is_active() {
            self.stop()?;
        }
        self.expect_phase(&[Phase::Stopped], "save")?;

        let elapsed_secs = self.state.elapsed_secs;
        if elapsed_secs < 1 {
            return Err(ValidationError::SessionTooShort { elapsed_secs }.into());
        }

        let duration_secs = match self.final_target_secs() {
            Some(final_target) if elapsed_secs >= final_target => {
                if include_overtime {
                    final_target + self.state.overtime_secs
                } else {
                    final_target
                }
            }
            _ => elapsed_secs,
        };

        Ok(SessionSummary {
            duration_secs,
            mode: self.mode,
            intervals: self.schedule.intervals().to_vec(),
            warm_up_secs: self.state.warm_up_secs,
            started_at: self.state.started_at,
            elapsed_secs,
            overtime_secs: self.state.overtime_secs,
            rings_count: self.state.rings_count,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply_schedule(&mut self, schedule: Schedule) {
        let schedule = schedule.or_fallback(self.settings.target_minutes, self.settings.bell_sound);
        self.mode = schedule.mode();
        self.targets = match self.mode {
            TimerMode::Fixed => schedule.cumulative_targets(),
            TimerMode::Unlimited => Vec::new(),
        };
        self.schedule = schedule;
    }

    fn enter_session(&mut self, start_ms: i64) -> Event {
        let state = &mut self.state;
        state.phase = Phase::Running;
        state.paused_from = None;
        state.session_start_ms = Some(start_ms);
        state.paused_elapsed_ms = 0;
        state.elapsed_secs = 0;
        state.overtime_secs = 0;
        state.fired_milestones.clear();
        state.rings_count = 0;
        state.next_interval_index = 0;
        state.warm_up_remaining_ms = 0;
        state.warm_up_anchor_ms = None;
        debug!("Session began");

        Event::SessionBegan {
            mode: self.mode,
            at: self.clock.now_utc(),
        }
    }

    fn tick_warm_up(&mut self) -> Vec<Event> {
        let now = self.clock.now_ms();
        if self.warm_up_remaining_ms_at(now) > 0 {
            return Vec::new();
        }
        // The session starts when the warm-up ran out, not when this late
        // tick noticed it.
        let ended_at = self.state.warm_up_anchor_ms.map_or(now, |anchor| {
            anchor.saturating_add(i64::try_from(self.state.warm_up_remaining_ms).unwrap_or(i64::MAX))
        });
        debug!("Warm-up complete");

        let mut events = vec![Event::WarmUpCompleted {
            at: self.clock.now_utc(),
        }];
        events.push(self.enter_session(ended_at.min(now)));
        events.extend(self.tick());
        events
    }

    fn refresh_elapsed(&mut self) {
        self.state.elapsed_secs = self.elapsed_ms_at(self.clock.now_ms()) / 1000;
    }

    fn elapsed_ms_at(&self, now_ms: i64) -> u64 {
        let running = self
            .state
            .session_start_ms
            .map_or(0, |start| u64::try_from(now_ms.saturating_sub(start)).unwrap_or(0));
        self.state.paused_elapsed_ms.saturating_add(running)
    }

    fn warm_up_remaining_ms_at(&self, now_ms: i64) -> u64 {
        match self.state.warm_up_anchor_ms {
            Some(anchor) => {
                let spent = u64::try_from(now_ms.saturating_sub(anchor)).unwrap_or(0);
                self.state.warm_up_remaining_ms.saturating_sub(spent)
            }
            None => self.state.warm_up_remaining_ms,
        }
    }

    /// Account for every bell due at the current `elapsed_secs`.
    fn catch_up(&mut self, audible: bool) -> Vec<Event> {
        match self.mode {
            TimerMode::Unlimited => self.ring_due_milestones(audible).into_iter().collect(),
            TimerMode::Fixed => self.ring_due_intervals(audible),
        }
    }

    /// Unlimited mode: mark every due milestone, ring once for all of them.
    fn ring_due_milestones(&mut self, audible: bool) -> Option<Event> {
        let step_min = self.schedule.milestone_interval_secs()? / 60;
        if step_min == 0 {
            return None;
        }
        let elapsed_min = self.state.elapsed_secs / 60;
        let last_due = elapsed_min / step_min * step_min;

        // Milestones are always fired in order, so only marks past the
        // highest fired one can be new.
        let mut mark = self
            .state
            .fired_milestones
            .last()
            .map_or(step_min, |last| last + step_min);
        let mut newly_fired = 0u32;
        while mark <= last_due {
            if self.state.fired_milestones.insert(mark) {
                newly_fired += 1;
            }
            mark += step_min;
        }
        if newly_fired == 0 {
            return None;
        }

        self.state.rings_count += newly_fired;
        let sound = self.schedule.milestone_bell();
        if audible {
            self.ring(sound);
        }
        debug!(
            "Milestone {last_due}min reached ({newly_fired} new, {} total)",
            self.state.rings_count
        );

        Some(Event::BellRung {
            sound,
            coalesced: newly_fired,
            rings_count: self.state.rings_count,
            elapsed_secs: self.state.elapsed_secs,
            at: self.clock.now_utc(),
        })
    }

    /// Fixed mode: advance past every crossed target, ring once with the
    /// last crossed interval's sound, enter overtime after the final one.
    fn ring_due_intervals(&mut self, audible: bool) -> Vec<Event> {
        let mut events = Vec::new();
        let elapsed = self.state.elapsed_secs;

        let mut crossed = 0u32;
        let mut last_sound = None;
        while let Some(target) = self.targets.get(self.state.next_interval_index).copied() {
            if target.at_secs > elapsed {
                break;
            }
            self.state.next_interval_index += 1;
            crossed += 1;
            last_sound = Some(target.bell_sound);
        }

        if let Some(sound) = last_sound {
            self.state.rings_count += crossed;
            if audible {
                self.ring(sound);
            }
            debug!(
                "Interval {} reached at {elapsed}s ({crossed} crossed)",
                self.state.next_interval_index
            );
            events.push(Event::BellRung {
                sound,
                coalesced: crossed,
                rings_count: self.state.rings_count,
                elapsed_secs: elapsed,
                at: self.clock.now_utc(),
            });
        }

        if let Some(final_target) = self.final_target_secs() {
            if self.state.next_interval_index >= self.targets.len() {
                if self.state.phase == Phase::Running {
                    self.state.phase = Phase::Overtime;
                    info!("All intervals complete at {final_target}s, tracking overtime");
                    events.push(Event::OvertimeStarted {
                        final_target_secs: final_target,
                        at: self.clock.now_utc(),
                    });
                }
                self.state.overtime_secs = elapsed.saturating_sub(final_target);
            }
        }
        events
    }

    fn ring(&self, sound: BellSound) {
        if sound.is_silent() {
            return;
        }
        if let Err(e) = self.bells.play(sound) {
            warn!("Bell '{sound}' failed, continuing: {e}");
        }
    }

    fn acquire_wake_lock(&mut self) {
        match self.wake_lock.acquire() {
            Ok(()) => self.state.wake_lock_held = true,
            Err(e) => warn!("Continuing without wake lock: {e}"),
        }
    }

    fn release_wake_lock(&mut self) {
        if self.state.wake_lock_held {
            self.wake_lock.release();
            self.state.wake_lock_held = false;
        }
    }

    fn expect_phase(&self, allowed: &[Phase], action: &'static str) -> Result<(), TimerError> {
        if allowed.contains(&self.state.phase) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> TimerError {
        TimerError::InvalidTransition {
            from: self.state.phase,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::audio::AudioError;
    use crate::timer::clock::ManualClock;
    use crate::wake_lock::WakeLockError;

    #[derive(Debug, Clone, Default)]
    struct RecordingPlayer {
        played: Arc<Mutex<Vec<BellSound>>>,
    }

    impl RecordingPlayer {
        fn played(&self) -> Vec<BellSound> {
            self.played.lock().unwrap().clone()
        }
    }

    impl BellPlayer for RecordingPlayer {
        fn play(&self, sound: BellSound) -> Result<(), AudioError> {
            self.played.lock().unwrap().push(sound);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenSpeaker;

    impl BellPlayer for BrokenSpeaker {
        fn play(&self, _sound: BellSound) -> Result<(), AudioError> {
            Err(AudioError::Output("autoplay blocked".into()))
        }
    }

    #[derive(Debug, Clone, Default)]
    struct CountingLock {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl WakeLock for CountingLock {
        fn acquire(&mut self) -> Result<(), WakeLockError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct UnsupportedLock;

    impl WakeLock for UnsupportedLock {
        fn acquire(&mut self) -> Result<(), WakeLockError> {
            Err(WakeLockError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "systemd-inhibit",
            )))
        }

        fn release(&mut self) {
            panic!("release called without a held lock");
        }
    }

    fn schedule(specs: &[(u64, u32, BellSound)]) -> Schedule {
        Schedule::new(
            specs
                .iter()
                .map(|&(m, r, s)| IntervalSpec::new(m, r, s))
                .collect(),
        )
        .unwrap()
    }

    fn engine(specs: &[(u64, u32, BellSound)]) -> (TimerEngine, ManualClock, RecordingPlayer) {
        let clock = ManualClock::new(1_700_000_000_000);
        let player = RecordingPlayer::default();
        let engine = TimerEngine::new(schedule(specs), TimerSettings::default())
            .with_clock(clock.clone())
            .with_bell_player(player.clone());
        (engine, clock, player)
    }

    #[test]
    fn start_pause_resume() {
        let (mut engine, _clock, _) = engine(&[(1, 3, BellSound::Bell)]);
        assert_eq!(engine.phase(), Phase::Idle);

        engine.start(0).unwrap();
        assert_eq!(engine.phase(), Phase::Running);

        engine.pause().unwrap();
        assert_eq!(engine.phase(), Phase::Paused);

        engine.resume().unwrap();
        assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn start_rings_start_bell_and_takes_wake_lock() {
        let lock = CountingLock::default();
        let (engine, _clock, player) = engine(&[(5, 1, BellSound::Chime)]);
        let mut engine = engine.with_wake_lock(lock.clone());

        let events = engine.start(0).unwrap();
        assert!(matches!(events[0], Event::TimerStarted { warm_up_secs: 0, .. }));
        assert!(matches!(events[1], Event::SessionBegan { .. }));
        assert_eq!(player.played(), vec![BellSound::Bell]);
        assert_eq!(lock.acquired.load(Ordering::SeqCst), 1);
        assert!(engine.state().wake_lock_held);

        engine.stop().unwrap();
        assert_eq!(lock.released.load(Ordering::SeqCst), 1);
        engine.reset();
        assert_eq!(lock.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_twice_is_rejected() {
        let (mut engine, _clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(0).unwrap();
        assert_eq!(
            engine.start(0).unwrap_err(),
            TimerError::InvalidTransition {
                from: Phase::Running,
                action: "start"
            }
        );
    }

    #[test]
    fn configure_only_while_idle() {
        let (mut engine, _clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine
            .configure(schedule(&[(10, 0, BellSound::Gong)]))
            .unwrap();
        assert_eq!(engine.mode(), TimerMode::Unlimited);

        engine.start(0).unwrap();
        assert!(engine.configure(schedule(&[(1, 1, BellSound::Bell)])).is_err());
        assert_eq!(engine.mode(), TimerMode::Unlimited);
    }

    #[test]
    fn empty_schedule_uses_target_minutes() {
        let settings = TimerSettings {
            target_minutes: 15,
            bell_sound: BellSound::Cymbal,
            ..TimerSettings::default()
        };
        let engine = TimerEngine::new(Schedule::default(), settings);
        assert_eq!(engine.mode(), TimerMode::Fixed);
        assert_eq!(engine.final_target_secs(), Some(900));
        assert_eq!(
            engine.schedule().intervals(),
            &[IntervalSpec::new(15, 1, BellSound::Cymbal)]
        );
    }

    #[test]
    fn crossing_a_target_rings_its_sound() {
        let (mut engine, clock, player) =
            engine(&[(1, 1, BellSound::Chime), (1, 1, BellSound::Gong)]);
        engine.start(0).unwrap();

        clock.advance_secs(59);
        assert!(engine.tick().is_empty());

        clock.advance_secs(1);
        let events = engine.tick();
        assert!(matches!(
            events[0],
            Event::BellRung {
                sound: BellSound::Chime,
                coalesced: 1,
                rings_count: 1,
                ..
            }
        ));
        assert_eq!(player.played(), vec![BellSound::Bell, BellSound::Chime]);
    }

    #[test]
    fn missed_targets_ring_last_crossed_sound_once() {
        let (mut engine, clock, player) =
            engine(&[(1, 1, BellSound::Chime), (1, 1, BellSound::Gong), (5, 1, BellSound::Bell)]);
        engine.start(0).unwrap();

        clock.advance_secs(150);
        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::BellRung {
                sound: BellSound::Gong,
                coalesced: 2,
                ..
            }
        ));
        assert_eq!(engine.rings_count(), 2);
        assert_eq!(player.played(), vec![BellSound::Bell, BellSound::Gong]);
    }

    #[test]
    fn overtime_is_silent() {
        let (mut engine, clock, player) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(0).unwrap();

        clock.advance_secs(60);
        let events = engine.tick();
        assert!(matches!(events[1], Event::OvertimeStarted { final_target_secs: 60, .. }));
        assert_eq!(engine.phase(), Phase::Overtime);

        clock.advance_secs(600);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.overtime_secs(), 600);
        assert_eq!(player.played().len(), 2);
    }

    #[test]
    fn unlimited_mode_never_enters_overtime() {
        let (mut engine, clock, _) = engine(&[(1, 2, BellSound::Bell), (5, 0, BellSound::Gong)]);
        engine.start(0).unwrap();
        assert_eq!(engine.mode(), TimerMode::Unlimited);

        clock.advance_secs(3600);
        engine.tick();
        assert_eq!(engine.phase(), Phase::Running);
        assert!(!engine.is_overtime());
        // Milestones follow the first interval's one-minute cadence.
        assert_eq!(engine.rings_count(), 60);
    }

    #[test]
    fn warm_up_counts_down_then_begins() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        let events = engine.start(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.phase(), Phase::WarmingUp);
        assert_eq!(engine.warm_up_remaining_secs(), 10);

        clock.advance_ms(3_500);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.warm_up_remaining_secs(), 7);

        clock.advance_ms(6_500);
        let events = engine.tick();
        assert!(matches!(events[0], Event::WarmUpCompleted { .. }));
        assert!(matches!(events[1], Event::SessionBegan { .. }));
        assert_eq!(engine.phase(), Phase::Running);

        clock.advance_secs(30);
        engine.tick();
        assert_eq!(engine.elapsed_secs(), 30);
    }

    #[test]
    fn pause_during_warm_up_freezes_countdown() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(10).unwrap();
        clock.advance_secs(4);
        engine.pause().unwrap();

        clock.advance_secs(120);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.warm_up_remaining_secs(), 6);

        let resumed = engine.resume().unwrap();
        assert!(matches!(resumed, Event::TimerResumed { phase: Phase::WarmingUp, .. }));
        clock.advance_secs(6);
        engine.tick();
        assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn begin_session_skips_warm_up() {
        let (mut engine, _clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        assert!(engine.begin_session().is_err());
        engine.start(60).unwrap();
        engine.begin_session().unwrap();
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(engine.warm_up_remaining_secs(), 0);
    }

    #[test]
    fn pause_in_overtime_resumes_to_overtime() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(0).unwrap();
        clock.advance_secs(70);
        engine.tick();
        engine.pause().unwrap();
        clock.advance_secs(500);
        engine.resume().unwrap();
        assert_eq!(engine.phase(), Phase::Overtime);
        clock.advance_secs(5);
        engine.tick();
        assert_eq!(engine.overtime_secs(), 15);
    }

    #[test]
    fn invalid_transitions_leave_state_untouched() {
        let (mut engine, _clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        assert!(engine.pause().is_err());
        assert!(engine.resume().is_err());
        assert!(engine.stop().is_err());
        engine.start(0).unwrap();
        assert!(engine.resume().is_err());
        assert_eq!(engine.phase(), Phase::Running);
    }

    #[test]
    fn stop_keeps_elapsed_and_reset_clears() {
        let (mut engine, clock, _) = engine(&[(1, 3, BellSound::Bell)]);
        engine.start(0).unwrap();
        clock.advance_secs(95);
        engine.tick();

        clock.advance_secs(10);
        let stopped = engine.stop().unwrap();
        assert!(matches!(stopped, Event::TimerStopped { elapsed_secs: 105, rings_count: 1, .. }));
        assert_eq!(engine.phase(), Phase::Stopped);

        clock.advance_secs(1000);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.elapsed_secs(), 105);

        engine.reset();
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.state(), &SessionState::default());
    }

    #[test]
    fn stop_counts_targets_due_since_last_tick() {
        let (mut engine, clock, player) = engine(&[(1, 3, BellSound::Chime)]);
        engine.start(0).unwrap();
        clock.advance_secs(185);

        let stopped = engine.stop().unwrap();
        assert!(matches!(
            stopped,
            Event::TimerStopped {
                elapsed_secs: 185,
                overtime_secs: 5,
                rings_count: 3,
                ..
            }
        ));
        assert!(engine.is_overtime());
        assert_eq!(engine.next_interval_index(), 3);
        assert_eq!(engine.overtime_secs(), 5);
        // Counted, not rung: only the start bell was heard.
        assert_eq!(player.played(), vec![BellSound::Bell]);
    }

    #[test]
    fn stop_counts_milestones_due_since_last_tick() {
        let (mut engine, clock, player) = engine(&[(10, 0, BellSound::Chime)]);
        engine.start(0).unwrap();
        clock.advance_secs(1005);

        engine.stop().unwrap();
        assert_eq!(engine.rings_count(), 1);
        assert_eq!(engine.fired_milestones().iter().copied().collect::<Vec<_>>(), vec![10]);
        assert_eq!(player.played(), vec![BellSound::Bell]);
    }

    #[test]
    fn stop_while_paused_counts_up_to_pause() {
        let (mut engine, clock, _) = engine(&[(1, 3, BellSound::Bell)]);
        engine.start(0).unwrap();
        clock.advance_secs(130);
        engine.pause().unwrap();
        clock.advance_secs(1000);

        engine.stop().unwrap();
        assert_eq!(engine.elapsed_secs(), 130);
        assert_eq!(engine.rings_count(), 2);
        assert_eq!(engine.next_interval_index(), 2);
        assert!(!engine.is_overtime());
        assert_eq!(engine.overtime_secs(), 0);
    }

    #[test]
    fn stop_during_warm_up_counts_nothing() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(30).unwrap();
        clock.advance_secs(90);
        engine.stop().unwrap();
        assert_eq!(engine.elapsed_secs(), 0);
        assert_eq!(engine.rings_count(), 0);
    }

    #[test]
    fn snapshot_overtime_follows_live_elapsed() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        engine.start(0).unwrap();
        clock.advance_secs(60);
        engine.tick();
        clock.advance_secs(30);

        let snap = engine.snapshot();
        assert_eq!(snap.elapsed_secs, 90);
        assert_eq!(snap.overtime_secs, 30);
        assert_eq!(engine.overtime_secs(), 0);
    }

    #[test]
    fn audio_failures_do_not_block_progress() {
        let clock = ManualClock::new(0);
        let mut engine = TimerEngine::new(schedule(&[(1, 2, BellSound::Bell)]), TimerSettings::default())
            .with_clock(clock.clone())
            .with_bell_player(BrokenSpeaker);
        engine.start(0).unwrap();
        clock.advance_secs(121);
        let events = engine.tick();
        assert_eq!(engine.rings_count(), 2);
        assert!(engine.is_overtime());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn wake_lock_failure_is_ignored() {
        let clock = ManualClock::new(0);
        let mut engine = TimerEngine::new(schedule(&[(1, 1, BellSound::Bell)]), TimerSettings::default())
            .with_clock(clock.clone())
            .with_wake_lock(UnsupportedLock);
        engine.start(0).unwrap();
        assert!(!engine.state().wake_lock_held);
        clock.advance_secs(10);
        engine.stop().unwrap();
        engine.reset();
    }

    #[test]
    fn silent_start_bell_plays_nothing() {
        let clock = ManualClock::new(0);
        let player = RecordingPlayer::default();
        let settings = TimerSettings {
            start_bell: BellSound::Silence,
            ..TimerSettings::default()
        };
        let mut engine = TimerEngine::new(schedule(&[(1, 1, BellSound::Silence)]), settings)
            .with_clock(clock.clone())
            .with_bell_player(player.clone());
        engine.start(0).unwrap();
        clock.advance_secs(60);
        let events = engine.tick();
        assert!(player.played().is_empty());
        // Silent bells still count as rings.
        assert_eq!(engine.rings_count(), 1);
        assert!(matches!(events[0], Event::BellRung { sound: BellSound::Silence, .. }));
    }

    #[test]
    fn request_save_rejects_short_sessions() {
        let (mut engine, clock, _) = engine(&[(1, 1, BellSound::Bell)]);
        assert!(matches!(
            engine.request_save(true),
            Err(TimerError::InvalidTransition { from: Phase::Idle, .. })
        ));

        engine.start(0).unwrap();
        clock.advance_ms(400);
        assert_eq!(
            engine.request_save(true).unwrap_err(),
            TimerError::Validation(ValidationError::SessionTooShort { elapsed_secs: 0 })
        );
        // Still frozen so the caller can decide to reset.
        assert_eq!(engine.phase(), Phase::Stopped);
    }

    #[test]
    fn request_save_before_final_target_uses_elapsed() {
        let (mut engine, clock, _) = engine(&[(10, 1, BellSound::Bell)]);
        engine.start(30).unwrap();
        engine.begin_session().unwrap();
        clock.advance_secs(245);
        engine.tick();

        let summary = engine.request_save(false).unwrap();
        assert_eq!(summary.duration_secs, 245);
        assert_eq!(summary.warm_up_secs, 30);
        assert_eq!(summary.mode, TimerMode::Fixed);
        assert_eq!(summary.intervals, vec![IntervalSpec::new(10, 1, BellSound::Bell)]);
        assert!(summary.started_at.is_some());
    }

    #[test]
    fn snapshot_reads_live_elapsed() {
        let (mut engine, clock, _) = engine(&[(1, 2, BellSound::Bell)]);
        engine.start(0).unwrap();
        clock.advance_secs(42);
        let snap = engine.snapshot();
        assert_eq!(snap.elapsed_secs, 42);
        assert_eq!(snap.next_bell_at_secs, Some(60));
        assert_eq!(snap.final_target_secs, Some(120));
        assert_eq!(engine.elapsed_secs(), 0);
    }

    #[test]
    fn phase_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(Phase::WarmingUp).unwrap(),
            serde_json::json!("warmingUp")
        );
        assert_eq!(Phase::WarmingUp.to_string(), "warming up");
    }
}
