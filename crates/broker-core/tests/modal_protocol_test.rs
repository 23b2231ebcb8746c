//! Integration tests for the modal protocol across many concurrent sessions.

use broker_abstraction::{
    DialogueData, DialogueResult, MessageBoxButtons, MessageBoxResult, RenderTrigger,
};
use broker_core::testing::RecordingRenderTrigger;
use broker_core::{
    BrokerConfig, BrokerError, Clock, ManualClock, ModalBroker, ModalState, Session,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn wait_until_open(session: &Session) {
    for _ in 0..2000 {
        if session.pending().is_some() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("session {} never opened a modal", session.id());
}

#[test]
fn test_round_trip_under_concurrent_sessions() {
    let broker = Arc::new(ModalBroker::default());
    let render = Arc::new(RecordingRenderTrigger::new());

    let askers: Vec<_> = (0..16)
        .map(|n| {
            let session = broker.open_session(format!("s{n}"), Arc::clone(&render) as Arc<dyn RenderTrigger>);
            thread::spawn(move || {
                session.ask_modal(Some(DialogueData::text_input("Name", format!("Session {n}"), "")))
            })
        })
        .collect();

    // Answer in reverse order so no session depends on another's progress
    for n in (0..16).rev() {
        let id = format!("s{n}");
        let session = broker.session(&id).unwrap();
        wait_until_open(&session);
        assert!(broker.answer(&id, DialogueResult::Text(format!("answer-{n}"))).unwrap());
    }

    for (n, asker) in askers.into_iter().enumerate() {
        assert_eq!(asker.join().unwrap().unwrap(), DialogueResult::Text(format!("answer-{n}")));
    }
    for n in 0..16 {
        let id = format!("s{n}");
        assert_eq!(broker.session(&id).unwrap().state(), ModalState::Idle);
        // open + close per session
        assert_eq!(render.notification_count(&id), 2);
    }
}

#[test]
fn test_delete_prompt_cancelled() {
    let broker = ModalBroker::default();
    let session = broker.open_session("A", Arc::new(RecordingRenderTrigger::new()));

    let asker = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            session.ask_modal(Some(DialogueData::message_box(
                "Delete?",
                "Delete the selected element?",
                MessageBoxButtons::OkCancel,
            )))
        })
    };

    wait_until_open(&session);
    assert_eq!(session.pending_kind(), Some("message_box"));
    broker.answer("A", DialogueResult::Button(MessageBoxResult::Cancel)).unwrap();

    assert_eq!(asker.join().unwrap().unwrap(), DialogueResult::Button(MessageBoxResult::Cancel));
    assert_eq!(session.state(), ModalState::Idle);
}

#[test]
fn test_sequential_modals_respect_quiet_interval() {
    let clock = Arc::new(ManualClock::new());
    let broker = ModalBroker::with_clock(
        BrokerConfig::from_toml_str("[modal]\nquiet_interval_ms = 1500\n").unwrap(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let session = broker.open_session("A", Arc::new(RecordingRenderTrigger::new()));

    let mut close_times = Vec::new();
    let mut open_times = Vec::new();
    for _ in 0..3 {
        let asker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.ask_modal(Some(DialogueData::text_input("Q", "?", ""))))
        };
        wait_until_open(&session);
        open_times.push(clock.now());
        session.answer(DialogueResult::Cancelled).unwrap();
        assert_eq!(asker.join().unwrap().unwrap(), DialogueResult::Cancelled);
        close_times.push(session.last_modal_close().unwrap());
    }

    for (closed, opened) in close_times.iter().zip(open_times.iter().skip(1)) {
        assert!(opened.saturating_duration_since(*closed) >= Duration::from_millis(1500));
    }
}

#[test]
fn test_nested_modal_reports_error_and_keeps_first() {
    let broker = ModalBroker::default();
    let session = broker.open_session("A", Arc::new(RecordingRenderTrigger::new()));
    let first = DialogueData::message_box("First", "", MessageBoxButtons::Ok);

    assert_eq!(session.start_modal(Some(first.clone())).unwrap(), ModalState::Open);
    let err = session
        .start_modal(Some(DialogueData::message_box("Second", "", MessageBoxButtons::Ok)))
        .unwrap_err();

    assert!(err.to_string().contains("Some modal dialogue is still active"));
    assert_eq!(session.pending_kind(), Some("message_box"));
    session.answer(DialogueResult::Button(MessageBoxResult::Ok)).unwrap();
    assert_eq!(session.wait_blocking(None).unwrap(), DialogueResult::Button(MessageBoxResult::Ok));
    assert!(session.end_modal());
}

#[test]
fn test_closing_session_releases_blocked_asker() {
    let broker = ModalBroker::default();
    let session = broker.open_session("A", Arc::new(RecordingRenderTrigger::new()));
    let asker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.ask_modal(Some(DialogueData::text_input("Q", "?", ""))))
    };

    wait_until_open(&session);
    assert!(broker.close_session("A"));

    assert!(matches!(asker.join().unwrap(), Err(BrokerError::SessionClosed(_))));
    assert!(!broker.answer("A", DialogueResult::Cancelled).unwrap());
}

#[test]
fn test_configured_wait_timeout_abandons_dialogue() {
    let config = BrokerConfig::from_toml_str("[modal]\nquiet_interval_ms = 0\nwait_timeout_ms = 40\n")
        .unwrap();
    let broker = ModalBroker::new(config);
    let session = broker.open_session("A", Arc::new(RecordingRenderTrigger::new()));

    let err = session.ask_modal(Some(DialogueData::text_input("Q", "?", ""))).unwrap_err();
    assert!(matches!(err, BrokerError::WaitAbandoned { .. }));
    assert_eq!(session.state(), ModalState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_askers_on_many_sessions() {
    let broker = Arc::new(ModalBroker::with_clock(
        BrokerConfig::default(),
        Arc::new(ManualClock::new()),
    ));

    let mut askers = Vec::new();
    for n in 0..8 {
        let session = broker.open_session(format!("a{n}"), Arc::new(RecordingRenderTrigger::new()));
        askers.push(tokio::spawn(async move {
            let first = session
                .ask_modal_async(Some(DialogueData::message_box("One", "", MessageBoxButtons::YesNo)))
                .await?;
            let second = session
                .ask_modal_async(Some(DialogueData::text_input("Two", "?", "")))
                .await?;
            Ok::<_, BrokerError>((first, second))
        }));
    }

    for round in 0..2 {
        for n in 0..8 {
            let id = format!("a{n}");
            let session = broker.session(&id).unwrap();
            while session.pending().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let answer = if round == 0 {
                DialogueResult::Button(MessageBoxResult::Yes)
            } else {
                DialogueResult::Text(id.clone())
            };
            broker.answer(&id, answer).unwrap();
        }
    }

    for (n, asker) in askers.into_iter().enumerate() {
        let (first, second) = asker.await.unwrap().unwrap();
        assert_eq!(first, DialogueResult::Button(MessageBoxResult::Yes));
        assert_eq!(second, DialogueResult::Text(format!("a{n}")));
    }
}
