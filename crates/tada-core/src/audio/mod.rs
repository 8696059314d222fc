//! Bell playback.
//!
//! The engine only knows the [`BellPlayer`] trait. Players report failures,
//! the engine logs and ignores them so timing never depends on audio.

#[cfg(feature = "audio")]
mod file_player;

#[cfg(feature = "audio")]
pub use file_player::FilePlayer;

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::timer::BellSound;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("sound file not found: {0}")]
    MissingFile(PathBuf),

    #[error("audio output unavailable: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait BellPlayer: Send + std::fmt::Debug {
    /// Start playing `sound`. Must not block for the length of the sound.
    fn play(&self, sound: BellSound) -> Result<(), AudioError>;
}

impl BellPlayer for Box<dyn BellPlayer> {
    fn play(&self, sound: BellSound) -> Result<(), AudioError> {
        (**self).play(sound)
    }
}

/// Plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl BellPlayer for SilentPlayer {
    fn play(&self, _sound: BellSound) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Rings the terminal bell (BEL) on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl BellPlayer for TerminalBell {
    fn play(&self, sound: BellSound) -> Result<(), AudioError> {
        if sound.is_silent() {
            return Ok(());
        }
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Path of the asset for `sound` under `sounds_dir`, `None` for silence.
pub fn sound_path(sounds_dir: &Path, sound: BellSound) -> Option<PathBuf> {
    sound.file_name().map(|name| sounds_dir.join(name))
}
