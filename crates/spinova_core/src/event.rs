use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of every failure the orchestration layer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    /// Transport or IO failure during the fetch.
    #[error("DownloadError")]
    DownloadError,
    /// Site or content could not be parsed.
    #[error("ExtractorError")]
    ExtractorError,
    #[error("UnknownError")]
    UnknownError,
    /// A job or batch is already active.
    #[error("AlreadyRunning")]
    AlreadyRunning,
    /// The watchdog force-terminated a hung worker.
    #[error("TimeoutRecovery")]
    TimeoutRecovery,
    /// Malformed plugin or format source; never fatal.
    #[error("RegistryLoadWarning")]
    RegistryLoadWarning,
}

/// Status notification for one job. Zero or more `Downloading` events are
/// followed by exactly one terminal `Finished` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
    },
    Finished,
    Error {
        kind: ErrorKind,
        message: String,
        url: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Downloading { .. })
    }

    /// Completion percentage, using the estimate when the exact total is unknown.
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
            } => {
                let total = total_bytes.or(*total_bytes_estimate).filter(|t| *t > 0)?;
                let pct = downloaded_bytes.saturating_mul(100) / total;
                Some(pct.min(100) as u8)
            }
            ProgressEvent::Finished => Some(100),
            ProgressEvent::Error { .. } => None,
        }
    }

    pub fn to_wire(&self) -> ProgressWire {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
            } => ProgressWire {
                status: WireStatus::Downloading,
                downloaded_bytes: Some(*downloaded_bytes),
                total_bytes: *total_bytes,
                total_bytes_estimate: *total_bytes_estimate,
                ..ProgressWire::default()
            },
            ProgressEvent::Finished => ProgressWire {
                status: WireStatus::Finished,
                ..ProgressWire::default()
            },
            ProgressEvent::Error { kind, message, url } => ProgressWire {
                status: WireStatus::Error,
                error_type: Some(*kind),
                error: Some(message.clone()),
                url: Some(url.clone()),
                ..ProgressWire::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    #[default]
    Downloading,
    Finished,
    Error,
}

/// Flat record shape consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressWire {
    pub status: WireStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_estimate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
