use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use engine_logging::engine_info;
use spinova_core::{update, AppState, AppViewModel, Effect, Msg, ProgressEvent};

use crate::effects::EffectRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(75);

pub enum Request {
    Single(String),
    Batch(Vec<String>),
}

pub struct Outcome {
    pub view: AppViewModel,
    /// A job or batch was actually handed to the controller.
    pub started: bool,
    pub failed: bool,
}

/// Drives one download request through the reducer until the UI is idle
/// again, printing what changes.
pub fn run(mut runner: EffectRunner, format_name: String, request: Request) -> Outcome {
    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    spawn_cancel_listener(msg_tx);

    let mut state = AppState::with_format(format_name);
    let mut printer = Printer::default();
    let mut started = false;
    let mut failed = false;
    let mut pending: VecDeque<Msg> = match request {
        Request::Single(url) => VecDeque::from([Msg::UrlChanged(url), Msg::DownloadClicked]),
        Request::Batch(urls) => VecDeque::from([Msg::BatchLoaded(urls)]),
    };

    loop {
        while let Some(msg) = pending.pop_front() {
            failed |= is_failure(&msg);
            let (next, effects) = update(state, msg);
            state = next;
            started |= effects
                .iter()
                .any(|effect| !matches!(effect, Effect::Cancel));
            pending.extend(runner.apply(effects));
        }
        printer.render(&mut state);
        if !state.view().busy {
            break;
        }
        pending.extend(msg_rx.try_iter());
        pending.extend(runner.poll(POLL_INTERVAL));
        pending.push_back(Msg::Tick);
    }

    Outcome {
        view: state.view(),
        started,
        failed,
    }
}

fn is_failure(msg: &Msg) -> bool {
    match msg {
        Msg::JobProgress(ProgressEvent::Error { .. })
        | Msg::TimeoutRecovered { .. }
        | Msg::StartRejected { .. }
        | Msg::BatchFatal(_) => true,
        Msg::BatchCompleted(summary) => !summary.success,
        _ => false,
    }
}

/// Typing `c` (or `cancel`) and Enter asks the active run to stop.
fn spawn_cancel_listener(msg_tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let word = line.trim();
            if word.eq_ignore_ascii_case("c") || word.eq_ignore_ascii_case("cancel") {
                engine_info!("Cancel requested from the terminal");
                if msg_tx.send(Msg::CancelClicked).is_err() {
                    break;
                }
            }
        }
    });
}

#[derive(Default)]
struct Printer {
    printed_lines: usize,
    last_status: String,
}

impl Printer {
    fn render(&mut self, state: &mut AppState) {
        if !state.consume_dirty() {
            return;
        }
        let view = state.view();
        if view.log.len() < self.printed_lines {
            self.printed_lines = 0;
        }
        for line in &view.log[self.printed_lines..] {
            println!("{line}");
        }
        self.printed_lines = view.log.len();
        if view.status != self.last_status && view.log.last() != Some(&view.status) {
            println!("{}", view.status);
        }
        self.last_status = view.status;
    }
}
