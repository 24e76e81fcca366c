use std::fmt;

use spinova_core::{BatchLine, BatchSummary, ProgressEvent};

pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Job,
    Batch,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Job => write!(f, "job"),
            RunKind::Batch => write!(f, "batch"),
        }
    }
}

/// Everything the orchestration layer delivers to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Job {
        run_id: RunId,
        event: ProgressEvent,
    },
    BatchItem {
        run_id: RunId,
        line: BatchLine,
    },
    /// Setup failure; the batch ends early but still completes.
    BatchFatal {
        run_id: RunId,
        message: String,
    },
    BatchCompleted {
        run_id: RunId,
        summary: BatchSummary,
    },
    /// The watchdog force-terminated the run and the controller is idle again.
    TimeoutRecovery {
        run_id: RunId,
        kind: RunKind,
        message: String,
    },
    /// Secondary notice, e.g. a consumer that failed while handling an event.
    Diagnostic {
        run_id: Option<RunId>,
        message: String,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            EngineEvent::Job { run_id, .. }
            | EngineEvent::BatchItem { run_id, .. }
            | EngineEvent::BatchFatal { run_id, .. }
            | EngineEvent::BatchCompleted { run_id, .. }
            | EngineEvent::TimeoutRecovery { run_id, .. } => Some(*run_id),
            EngineEvent::Diagnostic { run_id, .. } => *run_id,
        }
    }

    /// The last event a run ever delivers.
    pub fn is_terminal(&self) -> bool {
        match self {
            EngineEvent::Job { event, .. } => event.is_terminal(),
            EngineEvent::BatchCompleted { .. } | EngineEvent::TimeoutRecovery { .. } => true,
            EngineEvent::BatchItem { .. }
            | EngineEvent::BatchFatal { .. }
            | EngineEvent::Diagnostic { .. } => false,
        }
    }
}
