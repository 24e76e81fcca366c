//! Spinova core: domain types, format registry and the pure presentation state machine.
mod batch;
mod effect;
mod event;
mod formats;
mod job;
mod msg;
mod options;
mod plugin;
mod state;
mod update;
mod view_model;

pub use batch::{accept_batch_url, parse_batch_input, BatchLine, BatchSummary};
pub use effect::Effect;
pub use event::{ErrorKind, ProgressEvent, ProgressWire, WireStatus};
pub use formats::{
    builtin_formats, EnabledPluginStore, FormatRegistry, FormatRegistryBuilder, FormatSource,
    InMemoryPluginStore, RegistryError, DEFAULT_SELECTOR,
};
pub use job::{BatchJob, Job};
pub use msg::Msg;
pub use options::{EngineOptions, ExternalDownloader, OptionValue};
pub use plugin::{FormatPlugin, PluginDescriptor, PluginError, RegistryLoadWarning};
pub use state::AppState;
pub use update::update;
pub use view_model::AppViewModel;
