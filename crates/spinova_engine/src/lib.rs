//! Spinova engine: job orchestration, worker execution and on-disk state.
mod batch;
mod channel;
mod controller;
mod extractor;
mod persist;
mod plugins;
mod runner;
mod settings;
mod types;
mod ytdlp;

pub use batch::{BatchRunner, BatchSink};
pub use channel::{progress_channel, EventReceiver, EventSender, ProgressSink, RunSender};
pub use controller::{
    Controller, ControllerSettings, OrchestrationError, OrchestrationState, RunHandle,
};
pub use extractor::{DownloadRequest, EngineProgress, ExtractionError, Extractor, ProgressHook};
pub use persist::{ensure_output_dir, write_atomic, write_json_atomic, PersistError};
pub use plugins::{
    build_registry, scan_plugin_dir, DeclaredPlugin, JsonPluginStore, PluginDirectory,
};
pub use runner::{JobFailure, JobRunner, JobState};
pub use settings::{Settings, SettingsError, SettingsStore};
pub use types::{EngineEvent, RunId, RunKind};
pub use ytdlp::YtDlpExtractor;
