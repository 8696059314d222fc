use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BellSound {
    #[default]
    Bell,
    Chime,
    Gong,
    Gong2,
    Cymbal,
    /// Rings nothing. Counts as a ring all the same.
    Silence,
}

impl BellSound {
    pub const ALL: [BellSound; 6] = [
        BellSound::Bell,
        BellSound::Chime,
        BellSound::Gong,
        BellSound::Gong2,
        BellSound::Cymbal,
        BellSound::Silence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BellSound::Bell => "bell",
            BellSound::Chime => "chime",
            BellSound::Gong => "gong",
            BellSound::Gong2 => "gong2",
            BellSound::Cymbal => "cymbal",
            BellSound::Silence => "silence",
        }
    }

    /// Asset file name, `None` for [`BellSound::Silence`].
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            BellSound::Bell => Some("bell.mp3"),
            BellSound::Chime => Some("chime.mp3"),
            BellSound::Gong => Some("gong.mp3"),
            BellSound::Gong2 => Some("gong2.mp3"),
            BellSound::Cymbal => Some("cymbal.mp3"),
            BellSound::Silence => None,
        }
    }

    pub fn is_silent(&self) -> bool {
        *self == BellSound::Silence
    }
}

impl fmt::Display for BellSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BellSound {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        BellSound::ALL
            .into_iter()
            .find(|sound| sound.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownBellSound(s.to_string()))
    }
}

/// One configured bell rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSpec {
    pub duration_minutes: u64,
    /// `0` repeats forever.
    pub repeats: u32,
    #[serde(default)]
    pub bell_sound: BellSound,
}

impl IntervalSpec {
    pub fn new(duration_minutes: u64, repeats: u32, bell_sound: BellSound) -> Self {
        Self {
            duration_minutes,
            repeats,
            bell_sound,
        }
    }

    pub fn is_forever(&self) -> bool {
        self.repeats == 0
    }

    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn duration_secs(&self) -> u64 {
        self.duration_minutes.saturating_mul(60)
    }
}

/// Parses `MINUTESxREPEATS[:SOUND]`, e.g. `10x0:chime` or `5x3`.
/// A bare `MINUTES` means one repeat.
impl FromStr for IntervalSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidInterval(s.to_string());

        let (timing, sound) = match s.trim().split_once(':') {
            Some((timing, sound)) => (timing, sound.parse::<BellSound>()?),
            None => (s.trim(), BellSound::default()),
        };
        let (minutes, repeats) = match timing.split_once(['x', 'X']) {
            Some((minutes, repeats)) => (minutes, repeats.trim()),
            None => (timing, "1"),
        };

        let duration_minutes = minutes.trim().parse::<u64>().map_err(|_| invalid())?;
        let repeats = repeats.parse::<u32>().map_err(|_| invalid())?;
        if duration_minutes == 0 {
            return Err(invalid());
        }
        Ok(Self::new(duration_minutes, repeats, sound))
    }
}

impl fmt::Display for IntervalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}:{}",
            self.duration_minutes, self.repeats, self.bell_sound
        )
    }
}

/// Fixed schedules end in overtime; unlimited ones ring milestones forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Fixed,
    Unlimited,
}

/// A bell boundary in seconds from session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalTarget {
    pub at_secs: u64,
    pub bell_sound: BellSound,
}

/// Ordered interval rules. At most one entry repeats forever, and only as
/// the last entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<IntervalSpec>", into = "Vec<IntervalSpec>")]
pub struct Schedule {
    intervals: Vec<IntervalSpec>,
}

impl Schedule {
    pub fn new(intervals: Vec<IntervalSpec>) -> Result<Self, ValidationError> {
        let last = intervals.len().saturating_sub(1);
        for (index, spec) in intervals.iter().enumerate() {
            if spec.duration_minutes == 0 {
                return Err(ValidationError::ZeroDuration { index });
            }
            if spec.is_forever() && index != last {
                return Err(ValidationError::ForeverNotLast { index });
            }
        }
        Ok(Self { intervals })
    }

    /// A single bounded interval.
    pub fn single(duration_minutes: u64, bell_sound: BellSound) -> Self {
        Self {
            intervals: vec![IntervalSpec::new(duration_minutes.max(1), 1, bell_sound)],
        }
    }

    /// Replaces an empty schedule with one implicit interval of
    /// `target_minutes`.
    pub fn or_fallback(self, target_minutes: u64, bell_sound: BellSound) -> Self {
        if self.intervals.is_empty() {
            Self::single(target_minutes, bell_sound)
        } else {
            self
        }
    }

    pub fn intervals(&self) -> &[IntervalSpec] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn mode(&self) -> TimerMode {
        if self.intervals.iter().any(IntervalSpec::is_forever) {
            TimerMode::Unlimited
        } else {
            TimerMode::Fixed
        }
    }

    /// Every finite bell boundary, in order, each carrying the sound of the
    /// interval that produced it. Forever entries contribute nothing.
    pub fn cumulative_targets(&self) -> Vec<IntervalTarget> {
        let mut at_secs = 0u64;
        let mut targets = Vec::new();
        for spec in self.intervals.iter().filter(|s| !s.is_forever()) {
            for _ in 0..spec.repeats {
                at_secs = at_secs.saturating_add(spec.duration_secs());
                targets.push(IntervalTarget {
                    at_secs,
                    bell_sound: spec.bell_sound,
                });
            }
        }
        targets
    }

    /// Sum of all finite occurrences, in seconds.
    pub fn total_finite_secs(&self) -> u64 {
        self.intervals
            .iter()
            .filter(|s| !s.is_forever())
            .map(|s| s.duration_secs().saturating_mul(u64::from(s.repeats)))
            .fold(0, u64::saturating_add)
    }

    /// Last boundary of a fixed schedule.
    pub fn final_target_secs(&self) -> Option<u64> {
        match self.mode() {
            TimerMode::Fixed if !self.is_empty() => Some(self.total_finite_secs()),
            _ => None,
        }
    }

    /// Milestone cadence for unlimited mode: the first interval's duration.
    pub fn milestone_interval_secs(&self) -> Option<u64> {
        self.intervals.first().map(IntervalSpec::duration_secs)
    }

    /// Sound rung at unlimited-mode milestones.
    pub fn milestone_bell(&self) -> BellSound {
        self.intervals
            .first()
            .map(|s| s.bell_sound)
            .unwrap_or_default()
    }
}

impl TryFrom<Vec<IntervalSpec>> for Schedule {
    type Error = ValidationError;

    fn try_from(intervals: Vec<IntervalSpec>) -> Result<Self, Self::Error> {
        Self::new(intervals)
    }
}

impl From<Schedule> for Vec<IntervalSpec> {
    fn from(schedule: Schedule) -> Self {
        schedule.intervals
    }
}
