use engine_logging::{engine_error, engine_info, engine_warn};
use spinova_core::{BatchJob, BatchLine, BatchSummary};
use tokio_util::sync::CancellationToken;

use crate::runner::JobRunner;

/// Receives the per-item lines and the terminal summary of a batch.
pub trait BatchSink: Send + Sync {
    fn line(&self, line: BatchLine);
    fn fatal(&self, message: String);
    fn completed(&self, summary: BatchSummary);
}

/// Drives the job runner over a batch, one URL after another.
#[derive(Clone)]
pub struct BatchRunner {
    runner: JobRunner,
}

impl BatchRunner {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }

    /// Runs every URL in input order. A failing URL is counted and reported,
    /// never fatal to the batch. `cancel` is checked between URLs only.
    ///
    /// `sink.completed` is called exactly once, on every exit path.
    pub async fn run(
        &self,
        batch: &BatchJob,
        cancel: &CancellationToken,
        sink: &dyn BatchSink,
    ) -> BatchSummary {
        let mut tally = CompletionGuard::new(sink, batch.len());

        if let Err(err) = self.runner.prepare().await {
            let message = format!(
                "{} could not be started: {}",
                self.runner.extractor_name(),
                err
            );
            engine_error!("{}", message);
            sink.fatal(message.clone());
            tally.fatal = Some(message);
            return tally.finish();
        }

        let total = batch.len();
        for (index, job) in batch.jobs().enumerate() {
            if cancel.is_cancelled() {
                engine_info!("Batch cancelled before item {} of {}", index + 1, total);
                tally.cancelled = true;
                break;
            }
            sink.line(BatchLine::Started {
                index,
                total,
                url: job.url.clone(),
            });
            match self.runner.run(&job, None).await {
                Ok(_) => {
                    tally.success_count += 1;
                    sink.line(BatchLine::Succeeded {
                        index,
                        url: job.url.clone(),
                    });
                }
                Err(failure) => {
                    tally.error_count += 1;
                    engine_warn!("Batch item {} failed: {}", index + 1, failure);
                    sink.line(BatchLine::Failed {
                        index,
                        url: failure.url,
                        kind: failure.kind,
                        message: failure.message,
                    });
                }
            }
        }

        tally.finish()
    }
}

/// Emits the batch summary when dropped unless `finish` already did, so an
/// unwinding or dropped batch still completes. Such a summary is marked fatal.
struct CompletionGuard<'a> {
    sink: &'a dyn BatchSink,
    total: usize,
    success_count: usize,
    error_count: usize,
    cancelled: bool,
    fatal: Option<String>,
    done: bool,
}

impl<'a> CompletionGuard<'a> {
    fn new(sink: &'a dyn BatchSink, total: usize) -> Self {
        Self {
            sink,
            total,
            success_count: 0,
            error_count: 0,
            cancelled: false,
            fatal: None,
            done: false,
        }
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary::new(
            self.total,
            self.success_count,
            self.error_count,
            self.cancelled,
            self.fatal.clone(),
        )
    }

    fn finish(mut self) -> BatchSummary {
        self.done = true;
        let summary = self.summary();
        engine_info!("{}", summary);
        self.sink.completed(summary.clone());
        summary
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut summary = self.summary();
            summary.success = false;
            summary
                .fatal
                .get_or_insert_with(|| "batch ended before every item was handled".to_string());
            engine_warn!("Batch ended abruptly: {}", summary);
            self.sink.completed(summary);
        }
    }
}
