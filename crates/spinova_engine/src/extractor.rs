use std::path::PathBuf;

use async_trait::async_trait;
use spinova_core::{ErrorKind, Job, OptionValue};
use thiserror::Error;

/// Raw progress reported by the extraction engine while it works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineProgress {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
    },
    /// One output file is complete. A job may produce several (video and
    /// audio streams before merging), so this is not the end of the job.
    FileFinished { filename: Option<String> },
}

pub trait ProgressHook: Send + Sync {
    fn on_progress(&self, progress: EngineProgress);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Everything the extraction engine needs for one download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub format_selector: String,
    pub output_directory: PathBuf,
    /// Engine output template, e.g. `downloads/%(title)s.%(ext)s`.
    pub output_template: String,
    /// Only options that were explicitly set.
    pub options: Vec<(&'static str, OptionValue)>,
}

impl DownloadRequest {
    pub fn for_job(job: &Job) -> Self {
        let output_template = job
            .output_directory
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();
        Self {
            url: job.url.clone(),
            format_selector: job.format_selector.clone(),
            output_directory: job.output_directory.clone(),
            output_template,
            options: job.engine_options.forwarded(),
        }
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// The media extraction engine. Performs the network IO and file writing for
/// one URL and reports progress through the hook.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the engine (for logging).
    fn name(&self) -> &'static str;

    /// Checks that the engine can run at all. Called once per job or batch
    /// before the first download.
    async fn prepare(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        hook: &dyn ProgressHook,
    ) -> Result<(), ExtractionError>;
}
