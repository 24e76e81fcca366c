use crate::{BatchLine, BatchSummary, ProgressEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User edited the URL input.
    UrlChanged(String),
    /// User picked a format by display name.
    FormatSelected(String),
    /// User asked to download the current URL.
    DownloadClicked,
    /// User loaded batch input; carries the accepted URLs in order.
    BatchLoaded(Vec<String>),
    /// User asked to stop the active job or batch.
    CancelClicked,
    /// Progress for the active single job.
    JobProgress(ProgressEvent),
    /// Per-item line from the active batch.
    BatchLine(BatchLine),
    /// The batch could not be set up and stops early.
    BatchFatal(String),
    /// Terminal summary of the active batch.
    BatchCompleted(BatchSummary),
    /// The watchdog force-terminated the active job or batch.
    TimeoutRecovered { message: String },
    /// The orchestration layer refused to start a run.
    StartRejected { reason: String },
    /// Secondary diagnostic from the orchestration layer.
    Diagnostic(String),
    /// Render tick.
    Tick,
}
