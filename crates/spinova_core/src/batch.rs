use std::fmt;
use std::io::Read;

use crate::ErrorKind;

/// Per-item line emitted by the batch runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchLine {
    Started {
        index: usize,
        total: usize,
        url: String,
    },
    Succeeded {
        index: usize,
        url: String,
    },
    Failed {
        index: usize,
        url: String,
        kind: ErrorKind,
        message: String,
    },
}

impl BatchLine {
    pub fn url(&self) -> &str {
        match self {
            BatchLine::Started { url, .. }
            | BatchLine::Succeeded { url, .. }
            | BatchLine::Failed { url, .. } => url,
        }
    }
}

impl fmt::Display for BatchLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchLine::Started { index, total, url } => {
                write!(f, "Download started [{}/{}]: {}", index + 1, total, url)
            }
            BatchLine::Succeeded { url, .. } => write!(f, "Download succeeded: {url}"),
            BatchLine::Failed {
                url, kind, message, ..
            } => write!(f, "Download failed: {url} error: {kind}: {message}"),
        }
    }
}

/// Terminal summary of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub attempted: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub cancelled: bool,
    /// Set when the run ended early on a setup failure.
    pub fatal: Option<String>,
    /// `success_count == total && error_count == 0`.
    pub success: bool,
}

impl BatchSummary {
    pub fn new(
        total: usize,
        success_count: usize,
        error_count: usize,
        cancelled: bool,
        fatal: Option<String>,
    ) -> Self {
        Self {
            total,
            attempted: success_count + error_count,
            success_count,
            error_count,
            cancelled,
            fatal,
            success: success_count == total && error_count == 0,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch finished: {} succeeded, {} failed, {} of {} attempted",
            self.success_count, self.error_count, self.attempted, self.total
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        if let Some(reason) = &self.fatal {
            write!(f, " (aborted: {reason})")?;
        }
        Ok(())
    }
}

/// Keeps a batch record's first field when it carries an HTTP(S) URL.
pub fn accept_batch_url(field: &str) -> Option<String> {
    let trimmed = field.trim();
    let lower = trimmed.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")).then(|| trimmed.to_string())
}

/// Reads batch input records (CSV, no header row) and returns the URLs in
/// input order. Records whose first field is not an HTTP(S) URL are skipped.
pub fn parse_batch_input<R: Read>(reader: R) -> Result<Vec<String>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut urls = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if let Some(url) = record.get(0).and_then(accept_batch_url) {
            urls.push(url);
        }
    }
    Ok(urls)
}
