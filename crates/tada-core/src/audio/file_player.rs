use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;

use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, warn};

use super::{sound_path, AudioError, BellPlayer};
use crate::timer::BellSound;

/// Plays bell files from a directory through the default output device.
///
/// Each bell gets its own short-lived thread holding the non-Send output
/// stream until the sound finishes.
#[derive(Debug, Clone)]
pub struct FilePlayer {
    sounds_dir: PathBuf,
    volume: f32,
}

impl FilePlayer {
    /// `volume` is a percentage, clamped to 0..=100.
    pub fn new(sounds_dir: impl Into<PathBuf>, volume: u32) -> Self {
        Self {
            sounds_dir: sounds_dir.into(),
            volume: volume.min(100) as f32 / 100.0,
        }
    }
}

impl BellPlayer for FilePlayer {
    fn play(&self, sound: BellSound) -> Result<(), AudioError> {
        let Some(path) = sound_path(&self.sounds_dir, sound) else {
            return Ok(());
        };
        if !path.is_file() {
            return Err(AudioError::MissingFile(path));
        }

        let volume = self.volume;
        thread::Builder::new()
            .name("bell".to_string())
            .spawn(move || {
                if let Err(e) = play_blocking(&path, volume) {
                    warn!("bell playback failed for {}: {e}", path.display());
                }
            })?;
        debug!("playing {sound}");
        Ok(())
    }
}

fn play_blocking(path: &Path, volume: f32) -> Result<(), AudioError> {
    let (_stream, handle) =
        OutputStream::try_default().map_err(|e| AudioError::Output(e.to_string()))?;
    let sink = Sink::try_new(&handle).map_err(|e| AudioError::Output(e.to_string()))?;
    let source = Decoder::new(BufReader::new(File::open(path)?))
        .map_err(|e| AudioError::Output(e.to_string()))?;
    sink.set_volume(volume);
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
