//! TOML-based application configuration.
//!
//! Stores:
//! - Entry API location and credentials
//! - How a finished session is labelled when submitted
//! - Audio output preferences
//! - Timer behavior defaults
//!
//! Configuration is stored at `~/.config/tada/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::data_dir;
use crate::error::ConfigError;

/// Entry API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request (optional).
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// How a saved session is labelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(default = "default_entry_name")]
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_subcategory")]
    pub subcategory: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

/// Audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding the bell sound files (optional).
    /// Without it bells fall back to the terminal bell.
    #[serde(default)]
    pub sounds_dir: Option<String>,
    #[serde(default = "default_volume")]
    pub volume: u32,
}

/// Timer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Count time past the final bell when saving a fixed session.
    #[serde(default = "default_true")]
    pub include_overtime: bool,
    /// Hold an idle/sleep inhibitor while a session runs.
    #[serde(default = "default_true")]
    pub wake_lock: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tada/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

// Default functions
fn default_base_url() -> String {
    "http://localhost:3000".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_entry_name() -> String {
    "Meditation".into()
}
fn default_category() -> String {
    "mindfulness".into()
}
fn default_subcategory() -> String {
    "sitting".into()
}
fn default_tags() -> Vec<String> {
    vec!["meditation".into()]
}
fn default_true() -> bool {
    true
}
fn default_volume() -> u32 {
    80
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            name: default_entry_name(),
            category: default_category(),
            subcategory: default_subcategory(),
            tags: default_tags(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sounds_dir: None,
            volume: default_volume(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            include_overtime: true,
            wake_lock: true,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                // Optional fields serialize as null or are skipped entirely.
                let existing = obj.get(part).cloned().unwrap_or(serde_json::Value::Null);
                if existing.is_null() && !Self::is_optional_key(key) {
                    return Err(unknown());
                }

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Array(_) => serde_json::Value::Array(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(|s| serde_json::Value::String(s.to_string()))
                            .collect(),
                    ),
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ if value.is_empty() && Self::is_optional_key(key) => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn is_optional_key(key: &str) -> bool {
        matches!(key, "api.token" | "audio.sounds_dir")
    }

    /// Location of `config.toml` inside the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null if Self::is_optional_key(key) => Some(String::new()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("using default configuration: {e}");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api.base_url, "http://localhost:3000");
        assert_eq!(parsed.entry.tags, vec!["meditation".to_string()]);
        assert!(parsed.api.token.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("[api]\nbase_url = \"https://tada.example\"\n").unwrap();
        assert_eq!(parsed.api.base_url, "https://tada.example");
        assert_eq!(parsed.api.timeout_secs, 15);
        assert_eq!(parsed.entry.category, "mindfulness");
        assert!(parsed.timer.include_overtime);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.wake_lock").as_deref(), Some("true"));
        assert_eq!(cfg.get("audio.volume").as_deref(), Some("80"));
        assert_eq!(cfg.get("entry.name").as_deref(), Some("Meditation"));
        assert_eq!(cfg.get("api.token").as_deref(), Some(""));
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("timer.include_overtime", "false").unwrap();
        cfg.set("api.timeout_secs", "30").unwrap();
        cfg.set("api.token", "secret").unwrap();
        cfg.set("entry.tags", "meditation, morning").unwrap();
        assert!(!cfg.timer.include_overtime);
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.api.token.as_deref(), Some("secret"));
        assert_eq!(cfg.entry.tags, vec!["meditation".to_string(), "morning".to_string()]);

        cfg.set("api.token", "").unwrap();
        assert!(cfg.api.token.is_none());
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("timer.nonexistent_key", "value"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("", "value"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("timer.wake_lock", "not_a_bool"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("audio.volume", "loud"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.set("entry.name", "Evening sit").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.entry.name, "Evening sit");
    }

    #[test]
    fn load_from_reports_parse_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
