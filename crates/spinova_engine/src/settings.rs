use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use spinova_core::EngineOptions;
use thiserror::Error;

use crate::controller::ControllerSettings;
use crate::persist::{write_json_atomic, PersistError};

/// Cookie file picked up from the working directory when none is configured.
pub const DEFAULT_COOKIE_FILE: &str = "cookie.txt";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting {0:?}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Persisted application settings. Missing keys take defaults, unknown keys
/// are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub ffmpeg_path: String,
    pub enabled_plugins: Vec<String>,
    /// Loosely typed engine overrides as entered by the user. Older files
    /// stored this as a JSON string under `yt_dlp_opts`.
    #[serde(alias = "yt_dlp_opts", deserialize_with = "lenient_map")]
    pub engine_options: Map<String, Value>,
    pub locale: String,
    pub job_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Opt-in: how long a cancelled single download may keep running before
    /// it is terminated. Unset leaves the job watchdog in charge.
    pub job_cancel_grace_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            ffmpeg_path: String::new(),
            enabled_plugins: Vec::new(),
            engine_options: Map::new(),
            locale: "ja".to_string(),
            job_timeout_secs: 30,
            batch_timeout_secs: 120,
            job_cancel_grace_secs: None,
        }
    }
}

fn lenient_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    })
}

impl Settings {
    /// Engine options for a new job: the stored overrides plus the configured
    /// ffmpeg path and the default cookie file.
    pub fn engine_options(&self) -> EngineOptions {
        let mut options = EngineOptions::from_map(&self.engine_options);
        let ffmpeg = self.ffmpeg_path.trim();
        if options.ffmpeg_location.is_none() && !ffmpeg.is_empty() {
            options.ffmpeg_location = Some(PathBuf::from(ffmpeg));
        }
        if options.cookie_file.is_none() {
            options.cookie_file = Some(PathBuf::from(DEFAULT_COOKIE_FILE));
        }
        options
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            job_timeout: Duration::from_secs(self.job_timeout_secs.max(1)),
            batch_timeout: Duration::from_secs(self.batch_timeout_secs.max(1)),
            job_cancel_grace: self.job_cancel_grace_secs.map(Duration::from_secs),
            ..ControllerSettings::default()
        }
    }
}

/// Settings file with a key/value get/set surface. Changes are kept in memory
/// until [`SettingsStore::save`].
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Never fails: a missing file is created with defaults, an unreadable or
    /// malformed one is logged and defaults are used.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Settings>(&text) {
                Ok(settings) => settings,
                Err(err) => {
                    engine_warn!("Malformed settings {}: {}; using defaults", path.display(), err);
                    Settings::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let settings = Settings::default();
                match write_json_atomic(&path, &settings) {
                    Ok(()) => engine_info!("Wrote default settings to {}", path.display()),
                    Err(err) => engine_warn!("Could not write default settings: {}", err),
                }
                settings
            }
            Err(err) => {
                engine_warn!("Could not read settings {}: {}; using defaults", path.display(), err);
                Settings::default()
            }
        };
        Self { path, settings }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(&self.settings) {
            Ok(Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        let Ok(Value::Object(mut map)) = serde_json::to_value(&self.settings) else {
            return Err(SettingsError::InvalidValue {
                key: key.to_string(),
                reason: "settings are not representable as an object".to_string(),
            });
        };
        if !map.contains_key(key) {
            return Err(SettingsError::UnknownKey(key.to_string()));
        }
        map.insert(key.to_string(), value);
        self.settings = serde_json::from_value(Value::Object(map)).map_err(|err| {
            SettingsError::InvalidValue {
                key: key.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        write_json_atomic(&self.path, &self.settings)?;
        engine_info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}
