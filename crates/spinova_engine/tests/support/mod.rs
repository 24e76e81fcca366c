#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use spinova_core::{BatchLine, BatchSummary, ErrorKind, ProgressEvent};
use spinova_engine::{
    BatchSink, DownloadRequest, EngineProgress, ExtractionError, Extractor, ProgressHook,
    ProgressSink,
};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// How the fake engine answers a given URL.
#[derive(Debug, Clone)]
pub enum Script {
    /// Reports each `(downloaded, total)` step, then one finished file.
    Succeed(Vec<(u64, Option<u64>)>),
    Fail(ErrorKind, &'static str),
    /// Sleeps asynchronously, then succeeds.
    Delay(Duration),
    /// Never returns, but can be dropped.
    Hang,
    /// Blocks its thread and ignores everything.
    Block(Duration),
    Panic,
}

#[derive(Default)]
pub struct ScriptedExtractor {
    scripts: HashMap<String, Script>,
    prepare_error: Option<ExtractionError>,
    requests: Mutex<Vec<DownloadRequest>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn failing_prepare(mut self, message: &str) -> Self {
        self.prepare_error = Some(ExtractionError::new(ErrorKind::UnknownError, message));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn prepare(&self) -> Result<(), ExtractionError> {
        match &self.prepare_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        hook: &dyn ProgressHook,
    ) -> Result<(), ExtractionError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .get(&request.url)
            .cloned()
            .unwrap_or(Script::Succeed(Vec::new()));
        match script {
            Script::Succeed(steps) => {
                for (downloaded, total) in steps {
                    hook.on_progress(EngineProgress::Downloading {
                        downloaded_bytes: downloaded,
                        total_bytes: total,
                        total_bytes_estimate: None,
                    });
                }
                hook.on_progress(EngineProgress::FileFinished {
                    filename: Some("clip.mp4".into()),
                });
                Ok(())
            }
            Script::Fail(kind, message) => Err(ExtractionError::new(kind, message)),
            Script::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Script::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Script::Block(duration) => {
                std::thread::sleep(duration);
                Ok(())
            }
            Script::Panic => panic!("scripted engine crash"),
        }
    }
}

#[derive(Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRecord {
    Line(BatchLine),
    Fatal(String),
    Completed(BatchSummary),
}

#[derive(Default)]
pub struct RecordingBatchSink {
    records: Mutex<Vec<BatchRecord>>,
    cancel_after_first_success: Option<CancellationToken>,
}

impl RecordingBatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            cancel_after_first_success: Some(token),
        }
    }

    pub fn records(&self) -> Vec<BatchRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                BatchRecord::Line(line) => Some(line.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<BatchSummary> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                BatchRecord::Completed(summary) => Some(summary),
                _ => None,
            })
            .collect()
    }
}

impl BatchSink for RecordingBatchSink {
    fn line(&self, line: BatchLine) {
        if let BatchLine::Succeeded { .. } = &line {
            if let Some(token) = &self.cancel_after_first_success {
                token.cancel();
            }
        }
        self.records.lock().unwrap().push(BatchRecord::Line(line));
    }

    fn fatal(&self, message: String) {
        self.records.lock().unwrap().push(BatchRecord::Fatal(message));
    }

    fn completed(&self, summary: BatchSummary) {
        self.records
            .lock()
            .unwrap()
            .push(BatchRecord::Completed(summary));
    }
}
