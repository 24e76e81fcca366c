use std::path::PathBuf;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use spinova_core::{BatchJob, EngineOptions, Effect, FormatRegistry, Job, Msg};
use spinova_engine::{Controller, EngineEvent};

/// Turns reducer effects into controller calls and controller events back
/// into reducer messages.
pub struct EffectRunner {
    controller: Controller,
    registry: FormatRegistry,
    output_dir: PathBuf,
    options: EngineOptions,
}

impl EffectRunner {
    pub fn new(
        controller: Controller,
        registry: FormatRegistry,
        output_dir: PathBuf,
        options: EngineOptions,
    ) -> Self {
        Self {
            controller,
            registry,
            output_dir,
            options,
        }
    }

    /// Applies effects; a start the controller refuses comes back as a message.
    pub fn apply(&mut self, effects: Vec<Effect>) -> Vec<Msg> {
        let mut replies = Vec::new();
        for effect in effects {
            match effect {
                Effect::StartJob { url, format_name } => {
                    let selector = self.registry.resolve(&format_name);
                    engine_info!(
                        "StartJob url={} format={} selector={}",
                        url,
                        format_name,
                        selector
                    );
                    let job = Job::new(url, selector, self.output_dir.clone())
                        .with_options(self.options.clone());
                    if let Err(err) = self.controller.start_job(job) {
                        engine_warn!("Job not started: {}", err);
                        replies.push(Msg::StartRejected {
                            reason: err.to_string(),
                        });
                    }
                }
                Effect::StartBatch { urls, format_name } => {
                    let selector = self.registry.resolve(&format_name);
                    engine_info!(
                        "StartBatch urls={} format={} selector={}",
                        urls.len(),
                        format_name,
                        selector
                    );
                    let batch = BatchJob::new(urls, selector, self.output_dir.clone())
                        .with_options(self.options.clone());
                    if let Err(err) = self.controller.start_batch(batch) {
                        engine_warn!("Batch not started: {}", err);
                        replies.push(Msg::StartRejected {
                            reason: err.to_string(),
                        });
                    }
                }
                Effect::Cancel => {
                    if !self.controller.cancel() {
                        engine_info!("Nothing to cancel");
                    }
                }
            }
        }
        replies
    }

    /// Waits up to `wait` for the next event, then drains whatever else is
    /// pending.
    pub fn poll(&mut self, wait: Duration) -> Vec<Msg> {
        let mut inbox = Vec::new();
        if let Some(event) = self.controller.recv_timeout(wait) {
            inbox.push(to_msg(&event));
        }
        self.controller.dispatch(|event| inbox.push(to_msg(event)));
        inbox
    }
}

pub fn to_msg(event: &EngineEvent) -> Msg {
    match event {
        EngineEvent::Job { event, .. } => Msg::JobProgress(event.clone()),
        EngineEvent::BatchItem { line, .. } => Msg::BatchLine(line.clone()),
        EngineEvent::BatchFatal { message, .. } => Msg::BatchFatal(message.clone()),
        EngineEvent::BatchCompleted { summary, .. } => Msg::BatchCompleted(summary.clone()),
        EngineEvent::TimeoutRecovery { message, .. } => Msg::TimeoutRecovered {
            message: message.clone(),
        },
        EngineEvent::Diagnostic { message, .. } => Msg::Diagnostic(message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use spinova_core::{BatchSummary, ErrorKind, Msg, ProgressEvent};
    use spinova_engine::{EngineEvent, RunKind};

    use super::to_msg;

    #[test]
    fn engine_events_map_onto_reducer_messages() {
        let error = ProgressEvent::Error {
            kind: ErrorKind::DownloadError,
            message: "HTTP Error 403".into(),
            url: "https://x/1".into(),
        };
        assert_eq!(
            to_msg(&EngineEvent::Job {
                run_id: 1,
                event: error.clone(),
            }),
            Msg::JobProgress(error)
        );
        assert_eq!(
            to_msg(&EngineEvent::TimeoutRecovery {
                run_id: 2,
                kind: RunKind::Batch,
                message: "batch exceeded its time limit".into(),
            }),
            Msg::TimeoutRecovered {
                message: "batch exceeded its time limit".into(),
            }
        );
        let summary = BatchSummary::new(2, 2, 0, false, None);
        assert_eq!(
            to_msg(&EngineEvent::BatchCompleted {
                run_id: 2,
                summary: summary.clone(),
            }),
            Msg::BatchCompleted(summary)
        );
    }
}
