use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spinova_core::{
    EnabledPluginStore, FormatPlugin, FormatRegistry, FormatSource, PluginError, RegistryError,
    RegistryLoadWarning,
};

use crate::persist::write_json_atomic;

/// A plugin declared by a `plugin_*.json` file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredPlugin {
    name: String,
    version: String,
    description: String,
    formats: Value,
}

#[derive(Deserialize)]
struct PluginFile {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    formats: Value,
}

impl DeclaredPlugin {
    pub fn from_json(origin: &str, value: Value) -> Result<Self, RegistryLoadWarning> {
        let file: PluginFile = serde_json::from_value(value).map_err(|err| {
            RegistryLoadWarning::new(origin, format!("invalid plugin declaration: {err}"))
        })?;
        let name = file.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryLoadWarning::new(origin, "plugin declares no name"));
        }
        Ok(Self {
            name,
            version: file.version.unwrap_or_else(|| "unknown".to_string()),
            description: file.description,
            formats: file.formats,
        })
    }
}

impl FormatPlugin for DeclaredPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn contributes_formats(&self) -> Result<Vec<(String, String)>, PluginError> {
        if self.formats.is_null() {
            return Ok(Vec::new());
        }
        FormatSource::from_json(&self.name, &self.formats)
            .map(|source| source.formats)
            .map_err(|warning| PluginError::new(warning.reason))
    }
}

/// What a plugin directory holds, in file-name order.
#[derive(Debug, Default)]
pub struct PluginDirectory {
    pub plugins: Vec<DeclaredPlugin>,
    /// `formats_*.json` file name and parsed content.
    pub external: Vec<(String, Value)>,
    pub warnings: Vec<RegistryLoadWarning>,
}

pub fn scan_plugin_dir(dir: &Path) -> PluginDirectory {
    let mut found = PluginDirectory::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            engine_info!("No plugin directory at {}", dir.display());
            return found;
        }
        Err(err) => {
            let warning = RegistryLoadWarning::new(dir.display().to_string(), err.to_string());
            engine_warn!("Plugin directory unreadable {}", warning);
            found.warnings.push(warning);
            return found;
        }
    };

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    files.sort();

    for (file_name, path) in files {
        if !file_name.ends_with(".json") {
            continue;
        }
        let is_plugin = file_name.starts_with("plugin_");
        let is_formats = file_name.starts_with("formats_");
        if !is_plugin && !is_formats {
            engine_debug!("Skipping {} in plugin directory", file_name);
            continue;
        }
        let value = match read_json(&path) {
            Ok(value) => value,
            Err(reason) => {
                let warning = RegistryLoadWarning::new(&file_name, reason);
                engine_warn!("Skipping unreadable plugin file {}", warning);
                found.warnings.push(warning);
                continue;
            }
        };
        if is_plugin {
            match DeclaredPlugin::from_json(&file_name, value) {
                Ok(plugin) => found.plugins.push(plugin),
                Err(warning) => {
                    engine_warn!("Skipping plugin {}", warning);
                    found.warnings.push(warning);
                }
            }
        } else {
            found.external.push((file_name, value));
        }
    }
    found
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&text).map_err(|err| format!("invalid JSON: {err}"))
}

/// Assembles the registry from compiled-in plugins and the plugin directory.
pub fn build_registry(
    plugin_dir: &Path,
    compiled: Vec<Box<dyn FormatPlugin>>,
    enabled: BTreeSet<String>,
    store: Box<dyn EnabledPluginStore>,
) -> FormatRegistry {
    let directory = scan_plugin_dir(plugin_dir);
    let mut builder = FormatRegistry::builder();
    for plugin in compiled {
        builder = builder.plugin(plugin);
    }
    for plugin in directory.plugins {
        builder = builder.plugin(Box::new(plugin));
    }
    for (origin, value) in &directory.external {
        builder = builder.external_json(origin, value);
    }
    for warning in directory.warnings {
        builder = builder.warning(warning);
    }
    builder.build(enabled, store)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginConfig {
    #[serde(default)]
    enabled_plugins: Vec<String>,
}

/// `plugin_config.json`, the durable enabled-plugin set.
#[derive(Debug, Clone)]
pub struct JsonPluginStore {
    path: PathBuf,
}

impl JsonPluginStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted set, or `None` when nothing was ever saved. A malformed
    /// file is logged and reads as empty.
    pub fn load(&self) -> Option<BTreeSet<String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                engine_warn!("Could not read {}: {}", self.path.display(), err);
                return Some(BTreeSet::new());
            }
        };
        match serde_json::from_str::<PluginConfig>(&text) {
            Ok(config) => Some(config.enabled_plugins.into_iter().collect()),
            Err(err) => {
                engine_warn!("Ignoring malformed {}: {}", self.path.display(), err);
                Some(BTreeSet::new())
            }
        }
    }
}

impl EnabledPluginStore for JsonPluginStore {
    fn save(&self, enabled: &BTreeSet<String>) -> Result<(), RegistryError> {
        let config = PluginConfig {
            enabled_plugins: enabled.iter().cloned().collect(),
        };
        write_json_atomic(&self.path, &config).map_err(|err| {
            RegistryError::Persist(format!("{}: {err}", self.path.display()))
        })?;
        engine_debug!("Saved enabled plugins to {}", self.path.display());
        Ok(())
    }
}
