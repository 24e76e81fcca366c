use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::EngineOptions;

/// A single URL-to-file download request with resolved options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub url: String,
    pub format_selector: String,
    pub output_directory: PathBuf,
    #[serde(default)]
    pub engine_options: EngineOptions,
}

impl Job {
    pub fn new(
        url: impl Into<String>,
        format_selector: impl Into<String>,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            format_selector: format_selector.into(),
            output_directory: output_directory.into(),
            engine_options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, engine_options: EngineOptions) -> Self {
        self.engine_options = engine_options;
        self
    }
}

/// Ordered URLs sharing one format selector, output directory and option set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub urls: Vec<String>,
    pub format_selector: String,
    pub output_directory: PathBuf,
    #[serde(default)]
    pub engine_options: EngineOptions,
}

impl BatchJob {
    pub fn new(
        urls: Vec<String>,
        format_selector: impl Into<String>,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            urls,
            format_selector: format_selector.into(),
            output_directory: output_directory.into(),
            engine_options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, engine_options: EngineOptions) -> Self {
        self.engine_options = engine_options;
        self
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Expands the batch into per-URL jobs, in input order.
    pub fn jobs(&self) -> impl Iterator<Item = Job> + '_ {
        self.urls.iter().map(move |url| Job {
            url: url.clone(),
            format_selector: self.format_selector.clone(),
            output_directory: self.output_directory.clone(),
            engine_options: self.engine_options.clone(),
        })
    }
}
