mod config;
mod settings;

pub use config::{ApiConfig, AudioConfig, Config, EntryConfig, TimerConfig};
pub use settings::{TimerSettings, SETTINGS_KEY};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/tada[-dev]/` based on TADA_ENV.
///
/// Set TADA_ENV=dev to use development data directory.
/// TADA_DATA_DIR overrides the location entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TADA_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("TADA_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("tada-dev")
            } else {
                base_dir.join("tada")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(ConfigError::DataDir)?;
    Ok(dir)
}
