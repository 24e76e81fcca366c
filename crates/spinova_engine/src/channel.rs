use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_trace, engine_warn};
use spinova_core::{BatchLine, BatchSummary, ProgressEvent};

use crate::batch::BatchSink;
use crate::controller::ActiveSlot;
use crate::{EngineEvent, RunId};

/// How many finished run ids the receiver remembers for dropping late events.
/// Older runs are also closed on the producer side.
const TERMINATED_WINDOW: usize = 64;

/// Receives structured progress for one job.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Creates the conduit between worker contexts and the controlling context.
///
/// `throttle` is the minimum spacing between two observable `Downloading`
/// updates of the same run; terminal events are never throttled.
pub fn progress_channel(throttle: Duration) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (
        EventSender { tx },
        EventReceiver {
            rx,
            throttle,
            last_progress: HashMap::new(),
            terminated: VecDeque::with_capacity(TERMINATED_WINDOW),
        },
    )
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSender {
    /// Producer handle for a single run.
    pub fn for_run(&self, run_id: RunId) -> RunSender {
        RunSender {
            run_id,
            tx: self.tx.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            slot: None,
        }
    }

    pub(crate) fn for_controlled_run(&self, run_id: RunId, slot: Arc<ActiveSlot>) -> RunSender {
        RunSender {
            slot: Some(slot),
            ..self.for_run(run_id)
        }
    }

    /// Sends an event that does not come from a worker.
    pub(crate) fn send_direct(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            engine_warn!("Event consumer is gone; dropping controller event");
        }
    }
}

/// Producer side for one run. Sending never blocks and never fails from the
/// worker's point of view; once a terminal event went out, or the run was
/// closed by the watchdog, everything else is discarded.
#[derive(Clone)]
pub struct RunSender {
    run_id: RunId,
    tx: mpsc::Sender<EngineEvent>,
    closed: Arc<AtomicBool>,
    slot: Option<Arc<ActiveSlot>>,
}

impl RunSender {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn send(&self, event: EngineEvent) {
        if self.is_closed() {
            engine_debug!("Run {} is closed; dropping {:?}", self.run_id, event);
            return;
        }
        if !event.is_terminal() {
            self.deliver(event);
            return;
        }
        match &self.slot {
            // Releasing the controller and delivering happen under one lock so a
            // concurrent watchdog fire sees either a finished run or none.
            Some(slot) => slot.finish_run(self.run_id, &self.closed, || self.deliver(event)),
            None => {
                if !self.closed.swap(true, Ordering::AcqRel) {
                    self.deliver(event);
                }
            }
        }
    }

    fn deliver(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            engine_warn!("Event consumer is gone; run {} continues unobserved", self.run_id);
        }
    }
}

impl ProgressSink for RunSender {
    fn emit(&self, event: ProgressEvent) {
        self.send(EngineEvent::Job {
            run_id: self.run_id,
            event,
        });
    }
}

impl BatchSink for RunSender {
    fn line(&self, line: BatchLine) {
        self.send(EngineEvent::BatchItem {
            run_id: self.run_id,
            line,
        });
    }

    fn fatal(&self, message: String) {
        self.send(EngineEvent::BatchFatal {
            run_id: self.run_id,
            message,
        });
    }

    fn completed(&self, summary: BatchSummary) {
        self.send(EngineEvent::BatchCompleted {
            run_id: self.run_id,
            summary,
        });
    }
}

/// Consumer side. Applies per-run throttling of `Downloading` updates and
/// drops anything a run emits after its terminal event.
pub struct EventReceiver {
    rx: mpsc::Receiver<EngineEvent>,
    throttle: Duration,
    last_progress: HashMap<RunId, Instant>,
    terminated: VecDeque<RunId>,
}

impl EventReceiver {
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            let event = self.rx.try_recv().ok()?;
            if self.admit(&event) {
                return Some(event);
            }
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<EngineEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self.rx.recv_timeout(remaining).ok()?;
            if self.admit(&event) {
                return Some(event);
            }
        }
    }

    /// Hands every pending event to `listener`. A listener that panics does not
    /// take the caller down; the failure is reported back to it as a
    /// `Diagnostic` event. Returns the number of events delivered.
    pub fn dispatch<F>(&mut self, mut listener: F) -> usize
    where
        F: FnMut(&EngineEvent),
    {
        let mut delivered = 0;
        while let Some(event) = self.try_recv() {
            delivered += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if let Err(payload) = outcome {
                let message = format!(
                    "event handler failed on {:?}: {}",
                    event,
                    panic_message(payload.as_ref())
                );
                engine_warn!("{}", message);
                let diagnostic = EngineEvent::Diagnostic {
                    run_id: event.run_id(),
                    message,
                };
                if panic::catch_unwind(AssertUnwindSafe(|| listener(&diagnostic))).is_err() {
                    engine_warn!("Event handler also failed on the diagnostic; giving up on it");
                }
            }
        }
        delivered
    }

    fn admit(&mut self, event: &EngineEvent) -> bool {
        let Some(run_id) = event.run_id() else {
            return true;
        };
        if self.terminated.contains(&run_id) {
            engine_debug!("Dropping late event for finished run {}", run_id);
            return false;
        }
        if event.is_terminal() {
            if self.terminated.len() == TERMINATED_WINDOW {
                self.terminated.pop_front();
            }
            self.terminated.push_back(run_id);
            self.last_progress.remove(&run_id);
            return true;
        }
        if let EngineEvent::Job {
            event: ProgressEvent::Downloading { .. },
            ..
        } = event
        {
            let now = Instant::now();
            if let Some(last) = self.last_progress.get(&run_id) {
                if now.duration_since(*last) < self.throttle {
                    engine_trace!("Throttled progress update for run {}", run_id);
                    return false;
                }
            }
            self.last_progress.insert(run_id, now);
        }
        true
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use spinova_core::ProgressEvent;

    use super::{progress_channel, ProgressSink, TERMINATED_WINDOW};

    #[test]
    fn finished_runs_are_remembered_in_a_bounded_window() {
        let (sender, mut receiver) = progress_channel(Duration::ZERO);
        for run_id in 1..=200 {
            sender.for_run(run_id).emit(ProgressEvent::Finished);
        }
        assert_eq!(std::iter::from_fn(|| receiver.try_recv()).count(), 200);
        assert_eq!(receiver.terminated.len(), TERMINATED_WINDOW);
        assert!(receiver.last_progress.is_empty());

        sender.for_run(200).emit(ProgressEvent::Finished);
        assert_eq!(receiver.try_recv(), None);
    }
}
