use crate::{AppState, BatchLine, Effect, Msg, ProgressEvent};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::UrlChanged(url) => {
            state.set_url_input(url);
            Vec::new()
        }
        Msg::FormatSelected(name) => {
            state.set_format_name(name);
            Vec::new()
        }
        Msg::DownloadClicked => {
            if state.is_busy() {
                return (state, Vec::new());
            }
            let url = state.url_input().trim().to_string();
            if url.is_empty() {
                state.set_status("Please enter a URL.".to_string());
                return (state, Vec::new());
            }
            state.begin_run("Download starting...".to_string());
            vec![Effect::StartJob {
                url,
                format_name: state.format_name(),
            }]
        }
        Msg::BatchLoaded(urls) => {
            if state.is_busy() {
                return (state, Vec::new());
            }
            if urls.is_empty() {
                state.set_status("No valid URLs to download.".to_string());
                return (state, Vec::new());
            }
            state.begin_run(format!("Starting {} downloads.", urls.len()));
            vec![Effect::StartBatch {
                urls,
                format_name: state.format_name(),
            }]
        }
        Msg::CancelClicked => {
            if state.is_busy() {
                state.set_status("Cancelling...".to_string());
                vec![Effect::Cancel]
            } else {
                Vec::new()
            }
        }
        Msg::JobProgress(event) => {
            apply_progress(&mut state, event);
            Vec::new()
        }
        Msg::BatchLine(line) => {
            match &line {
                BatchLine::Succeeded { .. } => state.count_success(),
                BatchLine::Failed { .. } => state.count_error(),
                BatchLine::Started { .. } => {}
            }
            let (ok, failed) = state.tally();
            state.push_log(format!("{line} ({ok} ok / {failed} failed)"));
            Vec::new()
        }
        Msg::BatchFatal(reason) => {
            state.push_log(format!("Batch could not start: {reason}"));
            Vec::new()
        }
        Msg::BatchCompleted(summary) => {
            if summary.success {
                state.set_percent(100);
            }
            state.push_log(summary.to_string());
            state.end_run();
            Vec::new()
        }
        Msg::TimeoutRecovered { message } => {
            state.push_log(format!("Timed out, recovered: {message}"));
            state.end_run();
            Vec::new()
        }
        Msg::StartRejected { reason } => {
            state.push_log(format!("Could not start: {reason}"));
            state.end_run();
            Vec::new()
        }
        Msg::Diagnostic(message) => {
            state.push_log(format!("[diagnostic] {message}"));
            Vec::new()
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}

fn apply_progress(state: &mut AppState, event: ProgressEvent) {
    let percent = event.percent();
    let line = match &event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
        } => match (percent, total_bytes.or(*total_bytes_estimate)) {
            (Some(pct), Some(total)) if state.show_bytes() => {
                format!("Downloading: {pct}% ({downloaded_bytes}/{total} bytes)")
            }
            (Some(pct), _) => format!("Downloading: {pct}%"),
            (None, _) if state.show_bytes() => format!("Downloading: {downloaded_bytes} bytes"),
            (None, _) => "Downloading...".to_string(),
        },
        ProgressEvent::Finished => "Download complete".to_string(),
        ProgressEvent::Error { kind, message, url } => {
            format!("Error ({kind}): {message} [{url}]")
        }
    };
    if let Some(pct) = percent {
        state.set_percent(pct);
    }
    state.push_log(line);
    if event.is_terminal() {
        state.end_run();
    }
}
