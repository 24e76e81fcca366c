mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use spinova_core::{ErrorKind, ProgressEvent};
use spinova_engine::{progress_channel, EngineEvent, ProgressSink};
use support::init_logging;

fn downloading(bytes: u64) -> ProgressEvent {
    ProgressEvent::Downloading {
        downloaded_bytes: bytes,
        total_bytes: Some(1000),
        total_bytes_estimate: None,
    }
}

fn drain(receiver: &mut spinova_engine::EventReceiver) -> Vec<EngineEvent> {
    std::iter::from_fn(|| receiver.try_recv()).collect()
}

#[test]
fn progress_is_throttled_but_terminal_events_are_not() {
    init_logging();
    let (sender, mut receiver) = progress_channel(Duration::from_secs(60));
    let run = sender.for_run(1);

    run.emit(downloading(100));
    run.emit(downloading(200));
    run.emit(downloading(300));
    run.emit(ProgressEvent::Finished);

    assert_eq!(
        drain(&mut receiver),
        vec![
            EngineEvent::Job {
                run_id: 1,
                event: downloading(100),
            },
            EngineEvent::Job {
                run_id: 1,
                event: ProgressEvent::Finished,
            },
        ]
    );
}

#[test]
fn throttling_is_per_run() {
    init_logging();
    let (sender, mut receiver) = progress_channel(Duration::from_secs(60));

    sender.for_run(1).emit(downloading(1));
    sender.for_run(2).emit(downloading(2));

    assert_eq!(drain(&mut receiver).len(), 2);
}

#[test]
fn nothing_follows_a_terminal_event() {
    init_logging();
    let (sender, mut receiver) = progress_channel(Duration::ZERO);
    let run = sender.for_run(7);
    let other_producer = sender.for_run(7);

    run.emit(ProgressEvent::Error {
        kind: ErrorKind::DownloadError,
        message: "HTTP Error 500".into(),
        url: "https://x/1".into(),
    });
    run.emit(downloading(10));
    run.emit(ProgressEvent::Finished);
    other_producer.emit(downloading(20));

    let events = drain(&mut receiver);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_terminal());
    assert!(run.is_closed());
}

#[test]
fn events_of_one_run_keep_their_order() {
    init_logging();
    let (sender, mut receiver) = progress_channel(Duration::ZERO);
    let run = sender.for_run(3);

    for bytes in [10, 20, 30] {
        run.emit(downloading(bytes));
    }
    run.emit(ProgressEvent::Finished);

    let bytes: Vec<Option<u64>> = drain(&mut receiver)
        .into_iter()
        .map(|event| match event {
            EngineEvent::Job {
                event: ProgressEvent::Downloading { downloaded_bytes, .. },
                ..
            } => Some(downloaded_bytes),
            _ => None,
        })
        .collect();
    assert_eq!(bytes, vec![Some(10), Some(20), Some(30), None]);
}

#[test]
fn failing_listener_gets_a_diagnostic_instead_of_crashing() {
    init_logging();
    let (sender, mut receiver) = progress_channel(Duration::ZERO);
    let run = sender.for_run(4);
    run.emit(downloading(1));
    run.emit(ProgressEvent::Finished);

    let mut seen = Vec::new();
    let delivered = receiver.dispatch(|event| {
        seen.push(event.clone());
        if let EngineEvent::Job {
            event: ProgressEvent::Downloading { .. },
            ..
        } = event
        {
            panic!("listener bug");
        }
    });

    assert_eq!(delivered, 2);
    assert_eq!(seen.len(), 3);
    match &seen[1] {
        EngineEvent::Diagnostic { run_id, message } => {
            assert_eq!(*run_id, Some(4));
            assert!(message.contains("listener bug"));
        }
        other => panic!("expected a diagnostic, got {other:?}"),
    }
    assert_eq!(
        seen[2],
        EngineEvent::Job {
            run_id: 4,
            event: ProgressEvent::Finished,
        }
    );
}

#[test]
fn recv_timeout_returns_none_when_quiet() {
    init_logging();
    let (_sender, mut receiver) = progress_channel(Duration::ZERO);
    assert_eq!(receiver.recv_timeout(Duration::from_millis(20)), None);
}
