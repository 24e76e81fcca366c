use std::sync::Once;

use pretty_assertions::assert_eq;
use spinova_core::{
    update, AppState, BatchLine, BatchSummary, Effect, ErrorKind, Msg, ProgressEvent,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn request_download(state: AppState, url: &str) -> (AppState, Vec<Effect>) {
    let (state, _) = update(state, Msg::UrlChanged(url.to_string()));
    update(state, Msg::DownloadClicked)
}

#[test]
fn download_request_emits_start_job_with_selected_format() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::FormatSelected("Audio only".into()));
    let (mut state, effects) = request_download(state, "  https://example.com/v  ");

    assert_eq!(
        effects,
        vec![Effect::StartJob {
            url: "https://example.com/v".into(),
            format_name: "Audio only".into(),
        }]
    );
    assert!(state.view().busy);
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn empty_url_sets_status_and_emits_nothing() {
    init_logging();
    let (state, effects) = request_download(AppState::new(), "   ");

    assert!(effects.is_empty());
    assert!(!state.view().busy);
    assert_eq!(state.view().status, "Please enter a URL.");
}

#[test]
fn requests_while_busy_are_ignored() {
    init_logging();
    let (state, _) = request_download(AppState::new(), "https://example.com/1");
    let (state, effects) = request_download(state, "https://example.com/2");
    assert!(effects.is_empty());

    let (_, effects) = update(state, Msg::BatchLoaded(vec!["https://example.com/3".into()]));
    assert!(effects.is_empty());
}

#[test]
fn progress_renders_percent_and_bytes() {
    init_logging();
    let (state, _) = request_download(AppState::new(), "https://example.com/v");
    let (state, _) = update(
        state,
        Msg::JobProgress(ProgressEvent::Downloading {
            downloaded_bytes: 250,
            total_bytes: None,
            total_bytes_estimate: Some(1000),
        }),
    );
    let view = state.view();
    assert_eq!(view.percent, 25);
    assert_eq!(view.status, "Downloading: 25% (250/1000 bytes)");

    let (state, _) = update(
        state,
        Msg::JobProgress(ProgressEvent::Downloading {
            downloaded_bytes: 512,
            total_bytes: None,
            total_bytes_estimate: None,
        }),
    );
    assert_eq!(state.view().status, "Downloading: 512 bytes");

    let (state, _) = update(state, Msg::JobProgress(ProgressEvent::Finished));
    let view = state.view();
    assert_eq!(view.percent, 100);
    assert_eq!(view.status, "Download complete");
    assert!(!view.busy);
}

#[test]
fn job_error_shows_kind_message_and_url_and_frees_the_ui() {
    init_logging();
    let (state, _) = request_download(AppState::new(), "https://example.com/v");
    let (state, _) = update(
        state,
        Msg::JobProgress(ProgressEvent::Error {
            kind: ErrorKind::ExtractorError,
            message: "Unsupported URL".into(),
            url: "https://example.com/v".into(),
        }),
    );
    let view = state.view();

    assert_eq!(
        view.status,
        "Error (ExtractorError): Unsupported URL [https://example.com/v]"
    );
    assert!(!view.busy);
}

#[test]
fn batch_lines_keep_a_running_tally_and_summary_ends_the_run() {
    init_logging();
    let urls = vec!["https://x/1".to_string(), "https://x/2".to_string()];
    let (state, effects) = update(
        AppState::with_format("Best (video+audio)"),
        Msg::BatchLoaded(urls.clone()),
    );
    assert_eq!(
        effects,
        vec![Effect::StartBatch {
            urls,
            format_name: "Best (video+audio)".into(),
        }]
    );

    let lines = vec![
        BatchLine::Started { index: 0, total: 2, url: "https://x/1".into() },
        BatchLine::Succeeded { index: 0, url: "https://x/1".into() },
        BatchLine::Started { index: 1, total: 2, url: "https://x/2".into() },
        BatchLine::Failed {
            index: 1,
            url: "https://x/2".into(),
            kind: ErrorKind::DownloadError,
            message: "HTTP Error 403".into(),
        },
    ];
    let state = lines
        .into_iter()
        .fold(state, |state, line| update(state, Msg::BatchLine(line)).0);
    let view = state.view();
    assert_eq!(view.success_count, 1);
    assert_eq!(view.error_count, 1);
    assert!(view.busy);
    assert!(view.log[3].ends_with("(1 ok / 1 failed)"));

    let (state, _) = update(state, Msg::BatchCompleted(BatchSummary::new(2, 1, 1, false, None)));
    let view = state.view();
    assert!(!view.busy);
    assert_eq!(
        view.log.last().map(String::as_str),
        Some("Batch finished: 1 succeeded, 1 failed, 2 of 2 attempted")
    );
}

#[test]
fn timeout_recovery_returns_to_idle() {
    init_logging();
    let (state, _) = request_download(AppState::new(), "https://example.com/v");
    let (state, effects) = update(state, Msg::CancelClicked);
    assert_eq!(effects, vec![Effect::Cancel]);

    let (state, _) = update(
        state,
        Msg::TimeoutRecovered {
            message: "worker terminated".into(),
        },
    );
    assert!(!state.view().busy);

    let (_, effects) = request_download(state, "https://example.com/again");
    assert_eq!(effects.len(), 1);
}

#[test]
fn cancel_when_idle_does_nothing() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::CancelClicked);
    assert!(effects.is_empty());
    assert_eq!(state, AppState::new());
}

#[test]
fn rejected_start_frees_the_ui() {
    init_logging();
    let (state, _) = request_download(AppState::new(), "https://example.com/v");
    let (state, _) = update(
        state,
        Msg::StartRejected {
            reason: "a job is already running (run 1)".into(),
        },
    );
    let view = state.view();

    assert!(!view.busy);
    assert_eq!(view.status, "Could not start: a job is already running (run 1)");
}

#[test]
fn error_kinds_display_as_their_names() {
    assert_eq!(ErrorKind::DownloadError.to_string(), "DownloadError");
    assert_eq!(ErrorKind::TimeoutRecovery.to_string(), "TimeoutRecovery");
    let as_error: &dyn std::error::Error = &ErrorKind::RegistryLoadWarning;
    assert_eq!(as_error.to_string(), "RegistryLoadWarning");
}
