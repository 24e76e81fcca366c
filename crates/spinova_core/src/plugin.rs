use thiserror::Error;

/// Failure raised by a plugin hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Capability interface every format extension implements.
///
/// Extensions are instantiated once at start-up and handed to the
/// [`FormatRegistryBuilder`](crate::FormatRegistryBuilder); the registry calls
/// `on_load`, then `contributes_formats`, then `on_register`.
pub trait FormatPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "unknown"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Flat display-name to selector mapping, in the plugin's preferred order.
    fn contributes_formats(&self) -> Result<Vec<(String, String)>, PluginError>;

    fn on_load(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_register(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Metadata of a loaded plugin. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub contributed_formats: Vec<(String, String)>,
}

/// Recoverable problem found while assembling the format registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin}: {reason}")]
pub struct RegistryLoadWarning {
    /// Plugin name or file the problem came from.
    pub origin: String,
    pub reason: String,
}

impl RegistryLoadWarning {
    pub fn new(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

