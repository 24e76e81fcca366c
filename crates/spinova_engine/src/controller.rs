use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use spinova_core::{BatchJob, BatchSummary, ErrorKind, Job, ProgressEvent};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::batch::BatchRunner;
use crate::channel::{
    panic_message, progress_channel, EventReceiver, EventSender, ProgressSink, RunSender,
};
use crate::extractor::Extractor;
use crate::runner::JobRunner;
use crate::{EngineEvent, RunId, RunKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub job_timeout: Duration,
    pub batch_timeout: Duration,
    /// When set, cancelling a single job moves its watchdog deadline in to at
    /// most this long from now. Batches always keep their armed deadline.
    pub job_cancel_grace: Option<Duration>,
    /// Bounded wait for a force-terminated worker before it is abandoned.
    pub join_grace: Duration,
    pub throttle_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(120),
            job_cancel_grace: None,
            join_grace: Duration::from_secs(3),
            throttle_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("a {kind} is already running (run {run_id})")]
    AlreadyRunning { run_id: RunId, kind: RunKind },
    #[error("could not start a worker: {0}")]
    Runtime(#[source] std::io::Error),
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            OrchestrationError::Runtime(_) => ErrorKind::UnknownError,
        }
    }
}

/// Snapshot of the controller, as returned by [`Controller::status`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrchestrationState {
    pub run_id: Option<RunId>,
    pub active_job: bool,
    pub active_batch: bool,
    pub watchdog_deadline: Option<Instant>,
    pub cancel_requested: bool,
}

impl OrchestrationState {
    pub fn is_idle(&self) -> bool {
        !self.active_job && !self.active_batch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: RunId,
    pub kind: RunKind,
}

struct ActiveRun {
    run_id: RunId,
    kind: RunKind,
    cancel: CancellationToken,
    kill: CancellationToken,
    deadline: watch::Sender<Instant>,
    closed: Arc<AtomicBool>,
}

/// The busy flag. Holds the active run, if any; every transition goes through
/// this lock.
pub(crate) struct ActiveSlot {
    run: Mutex<Option<ActiveRun>>,
}

impl ActiveSlot {
    fn new() -> Self {
        Self {
            run: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a run's terminal event and frees the slot in one step. Does
    /// nothing if the run was already closed.
    pub(crate) fn finish_run(
        &self,
        run_id: RunId,
        closed: &AtomicBool,
        deliver: impl FnOnce(),
    ) {
        let mut run = self.lock();
        if closed.swap(true, Ordering::AcqRel) {
            engine_debug!("Run {} already closed; terminal event dropped", run_id);
            return;
        }
        deliver();
        if run.as_ref().is_some_and(|active| active.run_id == run_id) {
            *run = None;
            engine_debug!("Run {} finished; controller idle", run_id);
        }
    }

    /// Closes a still-running run on behalf of the watchdog. The slot stays
    /// occupied until [`ActiveSlot::release_if`].
    fn claim_for_timeout(&self, run_id: RunId) -> Option<(CancellationToken, bool)> {
        let run = self.lock();
        let active = run.as_ref().filter(|active| active.run_id == run_id)?;
        if active.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((active.kill.clone(), active.cancel.is_cancelled()))
    }

    fn release_if(&self, run_id: RunId) {
        let mut run = self.lock();
        if run.as_ref().is_some_and(|active| active.run_id == run_id) {
            *run = None;
        }
    }
}

/// Owns the lifecycle of jobs and batches: at most one run at a time, each on
/// its own worker thread, each guarded by a watchdog.
pub struct Controller {
    runner: JobRunner,
    settings: ControllerSettings,
    runtime: Option<Runtime>,
    slot: Arc<ActiveSlot>,
    events: EventSender,
    receiver: EventReceiver,
    next_run_id: AtomicU64,
}

impl Controller {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        settings: ControllerSettings,
    ) -> Result<Self, OrchestrationError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("spinova-supervisor")
            .enable_time()
            .build()
            .map_err(OrchestrationError::Runtime)?;
        let (events, receiver) = progress_channel(settings.throttle_interval);
        Ok(Self {
            runner: JobRunner::new(extractor),
            settings,
            runtime: Some(runtime),
            slot: Arc::new(ActiveSlot::new()),
            events,
            receiver,
            next_run_id: AtomicU64::new(1),
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn start_job(&self, job: Job) -> Result<RunHandle, OrchestrationError> {
        let runner = self.runner.clone();
        let fallback = Fallback::Job {
            url: job.url.clone(),
        };
        self.launch(RunKind::Job, self.settings.job_timeout, fallback, move |sender, _| {
            async move {
                let sink: &dyn ProgressSink = &sender;
                if let Err(failure) = runner.run(&job, Some(sink)).await {
                    engine_error!("Job failed without a progress consumer: {}", failure);
                }
            }
        })
    }

    pub fn start_batch(&self, batch: BatchJob) -> Result<RunHandle, OrchestrationError> {
        let runner = BatchRunner::new(self.runner.clone());
        let fallback = Fallback::Batch { total: batch.len() };
        self.launch(
            RunKind::Batch,
            self.settings.batch_timeout,
            fallback,
            move |sender, cancel| async move {
                runner.run(&batch, &cancel, &sender).await;
            },
        )
    }

    /// Requests a cooperative stop of the active run. The watchdog deadline
    /// stays armed; only a single job with `job_cancel_grace` set has it pulled
    /// in. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        let run = self.slot.lock();
        let Some(active) = run.as_ref() else {
            engine_debug!("Cancel requested while idle");
            return false;
        };
        active.cancel.cancel();
        if let (RunKind::Job, Some(grace)) = (active.kind, self.settings.job_cancel_grace) {
            let pulled_in = Instant::now() + grace;
            active.deadline.send_if_modified(|deadline| {
                if pulled_in < *deadline {
                    *deadline = pulled_in;
                    true
                } else {
                    false
                }
            });
        }
        engine_info!("Cancel requested for {} {}", active.kind, active.run_id);
        true
    }

    pub fn status(&self) -> OrchestrationState {
        let run = self.slot.lock();
        match run.as_ref() {
            None => OrchestrationState::default(),
            Some(active) => OrchestrationState {
                run_id: Some(active.run_id),
                active_job: active.kind == RunKind::Job,
                active_batch: active.kind == RunKind::Batch,
                watchdog_deadline: Some(*active.deadline.borrow()),
                cancel_requested: active.cancel.is_cancelled(),
            },
        }
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<EngineEvent> {
        self.receiver.recv_timeout(timeout)
    }

    /// See [`EventReceiver::dispatch`].
    pub fn dispatch<F>(&mut self, listener: F) -> usize
    where
        F: FnMut(&EngineEvent),
    {
        self.receiver.dispatch(listener)
    }

    fn launch<F, Fut>(
        &self,
        kind: RunKind,
        timeout: Duration,
        fallback: Fallback,
        work: F,
    ) -> Result<RunHandle, OrchestrationError>
    where
        F: FnOnce(RunSender, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(OrchestrationError::Runtime(std::io::Error::other(
                "controller is shutting down",
            )));
        };

        let mut run = self.slot.lock();
        if let Some(active) = run.as_ref() {
            engine_warn!(
                "Rejected {} start: {} {} is still active",
                kind,
                active.kind,
                active.run_id
            );
            return Err(OrchestrationError::AlreadyRunning {
                run_id: active.run_id,
                kind: active.kind,
            });
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let sender = self.events.for_controlled_run(run_id, Arc::clone(&self.slot));
        let cancel = CancellationToken::new();
        let kill = CancellationToken::new();
        let (deadline_tx, deadline_rx) = watch::channel(Instant::now() + timeout);
        let (done_tx, done_rx) = oneshot::channel();

        let worker_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(OrchestrationError::Runtime)?;
        let label = format!("{kind}-{run_id}");
        let worker_sender = sender.clone();
        let worker_cancel = cancel.clone();
        let worker_kill = kill.clone();
        thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                engine_logging::set_worker_label(label);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    worker_runtime.block_on(async {
                        tokio::select! {
                            biased;
                            _ = worker_kill.cancelled() => WorkerExit::Killed,
                            _ = work(worker_sender, worker_cancel) => WorkerExit::Completed,
                        }
                    })
                }));
                let exit = outcome.unwrap_or_else(|payload| {
                    WorkerExit::Panicked(panic_message(payload.as_ref()))
                });
                engine_debug!("Worker exiting: {:?}", exit);
                engine_logging::clear_worker_label();
                let _ = done_tx.send(exit);
            })
            .map_err(OrchestrationError::Runtime)?;

        *run = Some(ActiveRun {
            run_id,
            kind,
            cancel,
            kill,
            deadline: deadline_tx,
            closed: sender.closed_handle(),
        });
        drop(run);

        runtime.spawn(supervise(Supervision {
            run_id,
            kind,
            slot: Arc::clone(&self.slot),
            events: self.events.clone(),
            sender,
            fallback,
            deadline: deadline_rx,
            done: done_rx,
            join_grace: self.settings.join_grace,
        }));

        engine_info!("Started {} {} (watchdog {:?})", kind, run_id, timeout);
        Ok(RunHandle { run_id, kind })
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(active) = self.slot.lock().take() {
            engine_warn!(
                "Controller dropped with {} {} active; killing it",
                active.kind,
                active.run_id
            );
            active.closed.store(true, Ordering::Release);
            active.cancel.cancel();
            active.kill.cancel();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[derive(Debug)]
enum WorkerExit {
    Completed,
    Killed,
    Panicked(String),
}

/// Terminal event stand-in for a worker that ends without delivering one.
enum Fallback {
    Job { url: String },
    Batch { total: usize },
}

impl Fallback {
    fn event(&self, run_id: RunId, reason: String) -> EngineEvent {
        match self {
            Fallback::Job { url } => EngineEvent::Job {
                run_id,
                event: ProgressEvent::Error {
                    kind: ErrorKind::UnknownError,
                    message: reason,
                    url: url.clone(),
                },
            },
            Fallback::Batch { total } => EngineEvent::BatchCompleted {
                run_id,
                summary: BatchSummary::new(*total, 0, 0, false, Some(reason)),
            },
        }
    }
}

struct Supervision {
    run_id: RunId,
    kind: RunKind,
    slot: Arc<ActiveSlot>,
    events: EventSender,
    sender: RunSender,
    fallback: Fallback,
    deadline: watch::Receiver<Instant>,
    done: oneshot::Receiver<WorkerExit>,
    join_grace: Duration,
}

/// Waits for the worker to exit or the watchdog deadline to pass, whichever
/// comes first. The deadline may move closer while waiting.
async fn supervise(mut sup: Supervision) {
    let mut watch_open = true;
    loop {
        let deadline = tokio::time::Instant::from_std(*sup.deadline.borrow_and_update());
        tokio::select! {
            exit = &mut sup.done => {
                on_worker_exit(&sup, exit.ok());
                return;
            }
            changed = sup.deadline.changed(), if watch_open => {
                if changed.is_err() {
                    watch_open = false;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                on_deadline(&mut sup).await;
                return;
            }
        }
    }
}

fn on_worker_exit(sup: &Supervision, exit: Option<WorkerExit>) {
    if sup.sender.is_closed() {
        return;
    }
    let reason = match exit {
        Some(WorkerExit::Panicked(message)) => format!("worker panicked: {message}"),
        Some(WorkerExit::Completed) | Some(WorkerExit::Killed) | None => {
            "worker exited without a result".to_string()
        }
    };
    engine_error!("{} {}: {}", sup.kind, sup.run_id, reason);
    sup.sender.send(sup.fallback.event(sup.run_id, reason));
}

async fn on_deadline(sup: &mut Supervision) {
    let Some((kill, cancel_requested)) = sup.slot.claim_for_timeout(sup.run_id) else {
        return;
    };
    engine_warn!(
        "Watchdog fired for {} {}; terminating worker",
        sup.kind,
        sup.run_id
    );
    kill.cancel();
    match tokio::time::timeout(sup.join_grace, &mut sup.done).await {
        Ok(_) => engine_info!("Worker for {} {} stopped", sup.kind, sup.run_id),
        Err(_) => engine_warn!(
            "Worker for {} {} did not stop within {:?}; abandoning it",
            sup.kind,
            sup.run_id,
            sup.join_grace
        ),
    }
    sup.slot.release_if(sup.run_id);

    let message = if cancel_requested {
        format!("cancelled {} did not stop in time; worker terminated", sup.kind)
    } else {
        format!("{} exceeded its time limit; worker terminated", sup.kind)
    };
    sup.events.send_direct(EngineEvent::TimeoutRecovery {
        run_id: sup.run_id,
        kind: sup.kind,
        message,
    });
}
