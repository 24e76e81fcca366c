use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError, RwLock};

use engine_logging::{engine_info, engine_warn};
use serde_json::Value;
use thiserror::Error;

use crate::{FormatPlugin, PluginDescriptor, RegistryLoadWarning};

/// Selector used when a display name is unknown.
pub const DEFAULT_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Built-in formats, in display order.
pub fn builtin_formats() -> Vec<(String, String)> {
    [
        ("Best (video+audio)", DEFAULT_SELECTOR),
        (
            "MP4 (video+audio)",
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]",
        ),
        ("MP3 (audio only)", "bestaudio[ext=m4a]/bestaudio"),
        ("Audio only", "bestaudio/best"),
        ("Video only", "bestvideo/best"),
    ]
    .into_iter()
    .map(|(name, selector)| (name.to_string(), selector.to_string()))
    .collect()
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to persist enabled plugins: {0}")]
    Persist(String),
}

/// Durable home of the enabled-plugin set.
pub trait EnabledPluginStore: Send + Sync {
    /// Must not return before the set is durably stored.
    fn save(&self, enabled: &BTreeSet<String>) -> Result<(), RegistryError>;
}

/// Store that keeps the last saved set in memory. Used by headless callers
/// and tests.
#[derive(Debug, Default)]
pub struct InMemoryPluginStore {
    saved: Mutex<Vec<BTreeSet<String>>>,
}

impl InMemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every set saved so far, oldest first.
    pub fn history(&self) -> Vec<BTreeSet<String>> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EnabledPluginStore for InMemoryPluginStore {
    fn save(&self, enabled: &BTreeSet<String>) -> Result<(), RegistryError> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(enabled.clone());
        Ok(())
    }
}

impl<T: EnabledPluginStore + ?Sized> EnabledPluginStore for std::sync::Arc<T> {
    fn save(&self, enabled: &BTreeSet<String>) -> Result<(), RegistryError> {
        (**self).save(enabled)
    }
}

/// Externally declared flat name to selector mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSource {
    pub origin: String,
    pub formats: Vec<(String, String)>,
}

impl FormatSource {
    /// Accepts only a flat JSON object whose values are all strings.
    pub fn from_json(
        origin: impl Into<String>,
        value: &Value,
    ) -> Result<Self, RegistryLoadWarning> {
        let origin = origin.into();
        let Value::Object(map) = value else {
            return Err(RegistryLoadWarning::new(
                origin,
                "format declaration is not a JSON object",
            ));
        };
        let mut formats = Vec::with_capacity(map.len());
        for (name, selector) in map {
            match selector {
                Value::String(selector) => formats.push((name.clone(), selector.clone())),
                _ => {
                    return Err(RegistryLoadWarning::new(
                        origin,
                        format!("format {name:?} does not map to a selector string"),
                    ))
                }
            }
        }
        Ok(Self { origin, formats })
    }
}

#[derive(Default)]
pub struct FormatRegistryBuilder {
    builtin: Option<Vec<(String, String)>>,
    plugins: Vec<Box<dyn FormatPlugin>>,
    external: Vec<FormatSource>,
    warnings: Vec<RegistryLoadWarning>,
}

impl FormatRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the built-in table. Defaults to [`builtin_formats`].
    pub fn builtin(mut self, formats: Vec<(String, String)>) -> Self {
        self.builtin = Some(formats);
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn FormatPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn external(mut self, source: FormatSource) -> Self {
        self.external.push(source);
        self
    }

    /// Adds an external declaration; a malformed one becomes a warning.
    pub fn external_json(mut self, origin: &str, value: &Value) -> Self {
        match FormatSource::from_json(origin, value) {
            Ok(source) => self.external.push(source),
            Err(warning) => {
                engine_warn!("Skipping format declaration {}", warning);
                self.warnings.push(warning);
            }
        }
        self
    }

    pub fn warning(mut self, warning: RegistryLoadWarning) -> Self {
        engine_warn!("Registry load warning {}", warning);
        self.warnings.push(warning);
        self
    }

    pub fn build(
        self,
        enabled: BTreeSet<String>,
        store: Box<dyn EnabledPluginStore>,
    ) -> FormatRegistry {
        let mut warnings = self.warnings;
        let mut plugins = Vec::with_capacity(self.plugins.len());

        for plugin in self.plugins {
            let name = plugin.name().to_string();
            if let Err(err) = plugin.on_load() {
                let warning = RegistryLoadWarning::new(&name, format!("on_load failed: {err}"));
                engine_warn!("Plugin not loaded {}", warning);
                warnings.push(warning);
                continue;
            }
            let contributed_formats = match plugin.contributes_formats() {
                Ok(formats) => formats,
                Err(err) => {
                    let warning =
                        RegistryLoadWarning::new(&name, format!("get formats failed: {err}"));
                    engine_warn!("Plugin contributes no formats {}", warning);
                    warnings.push(warning);
                    Vec::new()
                }
            };
            if let Err(err) = plugin.on_register() {
                let warning = RegistryLoadWarning::new(&name, format!("on_register failed: {err}"));
                engine_warn!("Plugin registration hook failed {}", warning);
                warnings.push(warning);
            }
            engine_info!(
                "Loaded plugin {} v{} with {} formats",
                name,
                plugin.version(),
                contributed_formats.len()
            );
            plugins.push(PluginDescriptor {
                name,
                version: plugin.version().to_string(),
                description: plugin.description().to_string(),
                contributed_formats,
            });
        }

        FormatRegistry {
            builtin: self.builtin.unwrap_or_else(builtin_formats),
            plugins,
            external: self.external,
            enabled: RwLock::new(enabled),
            store,
            warnings,
        }
    }
}

/// Merged name to selector table: built-ins, then enabled plugin
/// contributions, then external declarations. Later sources override earlier
/// ones on a name collision while keeping the first position of the name.
pub struct FormatRegistry {
    builtin: Vec<(String, String)>,
    plugins: Vec<PluginDescriptor>,
    external: Vec<FormatSource>,
    /// Empty means every plugin is enabled.
    enabled: RwLock<BTreeSet<String>>,
    store: Box<dyn EnabledPluginStore>,
    warnings: Vec<RegistryLoadWarning>,
}

impl FormatRegistry {
    pub fn builder() -> FormatRegistryBuilder {
        FormatRegistryBuilder::new()
    }

    pub fn resolve(&self, display_name: &str) -> String {
        self.all_formats()
            .into_iter()
            .find(|(name, _)| name == display_name)
            .map(|(_, selector)| selector)
            .unwrap_or_else(|| DEFAULT_SELECTOR.to_string())
    }

    pub fn all_formats(&self) -> Vec<(String, String)> {
        let enabled = self.enabled.read().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.builtin.clone();
        for plugin in &self.plugins {
            if enabled.is_empty() || enabled.contains(&plugin.name) {
                for (name, selector) in &plugin.contributed_formats {
                    upsert(&mut table, name, selector);
                }
            }
        }
        for source in &self.external {
            for (name, selector) in &source.formats {
                upsert(&mut table, name, selector);
            }
        }
        table
    }

    pub fn format_names(&self) -> Vec<String> {
        self.all_formats().into_iter().map(|(name, _)| name).collect()
    }

    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    pub fn enabled_plugins(&self) -> BTreeSet<String> {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_plugin_active(&self, name: &str) -> bool {
        let enabled = self.enabled.read().unwrap_or_else(PoisonError::into_inner);
        enabled.is_empty() || enabled.contains(name)
    }

    /// Adds or removes `plugin_name` from the enabled set. The new set is
    /// saved before it takes effect; on a save failure nothing changes.
    pub fn set_enabled(&self, plugin_name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut guard = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        if enabled {
            next.insert(plugin_name.to_string());
        } else {
            next.remove(plugin_name);
        }
        self.store.save(&next)?;
        engine_info!(
            "Plugin {} {}; enabled set is now {:?}",
            plugin_name,
            if enabled { "enabled" } else { "disabled" },
            next
        );
        *guard = next;
        Ok(())
    }

    pub fn warnings(&self) -> &[RegistryLoadWarning] {
        &self.warnings
    }
}

fn upsert(table: &mut Vec<(String, String)>, name: &str, selector: &str) {
    match table.iter_mut().find(|(existing, _)| existing == name) {
        Some(entry) => entry.1 = selector.to_string(),
        None => table.push((name.to_string(), selector.to_string())),
    }
}
