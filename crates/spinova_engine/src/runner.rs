use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::FutureExt;
use spinova_core::{ErrorKind, Job, ProgressEvent};
use thiserror::Error;

use crate::channel::{panic_message, ProgressSink};
use crate::extractor::{
    DownloadRequest, EngineProgress, ExtractionError, Extractor, ProgressHook,
};
use crate::persist::ensure_output_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// A failed job, returned to callers that attached no progress consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} while downloading {url}: {message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub url: String,
}

impl JobFailure {
    fn new(url: &str, err: ExtractionError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            url: url.to_string(),
        }
    }

    pub fn to_event(&self) -> ProgressEvent {
        ProgressEvent::Error {
            kind: self.kind,
            message: self.message.clone(),
            url: self.url.clone(),
        }
    }
}

/// Executes single downloads against the extraction engine.
#[derive(Clone)]
pub struct JobRunner {
    extractor: Arc<dyn Extractor>,
}

impl JobRunner {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub async fn prepare(&self) -> Result<(), ExtractionError> {
        self.extractor.prepare().await
    }

    /// Runs one job to completion.
    ///
    /// With a sink attached, progress and exactly one terminal event go to the
    /// sink and a failure is reported as `Ok(JobState::Failed)`. Without a
    /// sink, a failure is returned as `Err`. A panicking engine counts as an
    /// `UnknownError` failure.
    pub async fn run(
        &self,
        job: &Job,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<JobState, JobFailure> {
        let mut state = JobState::Idle;
        engine_debug!("Job {} is {:?}", job.url, state);
        state = JobState::Running;
        engine_info!(
            "Starting download url={} format={} via {} ({:?})",
            job.url,
            job.format_selector,
            self.extractor.name(),
            state
        );

        let result = AssertUnwindSafe(self.execute(job, sink))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = format!("engine panicked: {}", panic_message(payload.as_ref()));
                engine_error!("{} on {}", message, job.url);
                Err(ExtractionError::new(ErrorKind::UnknownError, message))
            });
        state = match &result {
            Ok(()) => JobState::Succeeded,
            Err(_) => JobState::Failed,
        };

        match result {
            Ok(()) => {
                engine_info!("Download finished url={}", job.url);
                if let Some(sink) = sink {
                    sink.emit(ProgressEvent::Finished);
                }
                Ok(state)
            }
            Err(err) => {
                let failure = JobFailure::new(&job.url, err);
                engine_warn!("Download failed: {}", failure);
                match sink {
                    Some(sink) => {
                        sink.emit(failure.to_event());
                        Ok(state)
                    }
                    None => Err(failure),
                }
            }
        }
    }

    async fn execute(
        &self,
        job: &Job,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<(), ExtractionError> {
        ensure_output_dir(&job.output_directory)
            .map_err(|err| ExtractionError::new(ErrorKind::DownloadError, err.to_string()))?;

        let request = DownloadRequest::for_job(job);
        engine_debug!(
            "Forwarding {} engine options: {:?}",
            request.options.len(),
            request.options
        );
        let hook = ForwardingHook { sink };
        self.extractor.download(&request, &hook).await
    }
}

struct ForwardingHook<'a> {
    sink: Option<&'a dyn ProgressSink>,
}

impl ProgressHook for ForwardingHook<'_> {
    fn on_progress(&self, progress: EngineProgress) {
        match progress {
            EngineProgress::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
            } => {
                if let Some(sink) = self.sink {
                    sink.emit(ProgressEvent::Downloading {
                        downloaded_bytes,
                        total_bytes,
                        total_bytes_estimate,
                    });
                }
            }
            EngineProgress::FileFinished { filename } => {
                engine_debug!("Engine finished file {:?}", filename);
            }
        }
    }
}
