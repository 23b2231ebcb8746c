//! Simulate command implementation.
//!
//! Runs a set of sessions against a live broker. Even-numbered sessions use the
//! blocking API from a blocking thread, odd-numbered ones the async API. A
//! simulated client per session answers whatever is pending.

use crate::render::LoggingRenderTrigger;
use anyhow::Context;
use broker_abstraction::{
    ContextMenu, DialogueData, DialogueKind, DialogueResult, FollowUpAction, MessageBoxButtons,
    MessageBoxResult, RenderTrigger, SessionId,
};
use broker_core::{
    BrokerConfig, DispatchStatsSnapshot, ModalBroker, ModalState, PendingInteraction, Session,
};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Options for the simulate command.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub sessions: usize,
    pub rounds: usize,
    pub answer_delay_ms: u64,
    pub quiet_interval_ms: Option<u64>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct SimulationSummary {
    sessions: usize,
    rounds: usize,
    quiet_interval_ms: u64,
    dialogues_answered: u64,
    menu_callbacks: u64,
    renders: u64,
    follow_ups: u64,
    dispatch: DispatchStatsSnapshot,
    elapsed_ms: u128,
}

/// Execute the simulate command.
pub async fn execute(config_path: Option<&Path>, options: SimulateOptions) -> anyhow::Result<()> {
    let mut config = BrokerConfig::load(config_path).context("Failed to load broker configuration")?;
    if let Some(quiet_interval_ms) = options.quiet_interval_ms {
        config.modal.quiet_interval_ms = quiet_interval_ms;
    }
    config.validate()?;

    let quiet_interval_ms = config.modal.quiet_interval_ms;
    let broker = Arc::new(ModalBroker::new(config));
    let render = Arc::new(LoggingRenderTrigger::for_current_runtime());
    let menu_callbacks = Arc::new(AtomicU64::new(0));
    let answer_delay = Duration::from_millis(options.answer_delay_ms);

    broker.start_dispatch()?;
    info!(sessions = options.sessions, rounds = options.rounds, "Simulation started");
    let started = Instant::now();

    let mut clients = Vec::with_capacity(options.sessions);
    let mut workers = Vec::with_capacity(options.sessions);
    for n in 0..options.sessions {
        let session =
            broker.open_session(SessionId::generate(), Arc::clone(&render) as Arc<dyn RenderTrigger>);
        clients.push(tokio::spawn(simulated_client(Arc::clone(&session), answer_delay)));

        let callbacks = Arc::clone(&menu_callbacks);
        let rounds = options.rounds;
        if n % 2 == 0 {
            let runtime = Handle::current();
            workers.push(tokio::task::spawn_blocking(move || {
                blocking_worker(&session, rounds, &callbacks, &runtime)
            }));
        } else {
            workers.push(tokio::spawn(async move { async_worker(&session, rounds, &callbacks).await }));
        }
    }

    let mut dialogues_answered = 0;
    let mut first_error = None;
    for worker in workers {
        match worker.await.context("Session worker panicked").and_then(|answered| answered) {
            Ok(answered) => dialogues_answered += answered,
            Err(err) if first_error.is_none() => {
                warn!(error = %err, "Session worker failed, closing all sessions");
                // Wakes the remaining workers with SessionClosed
                close_all(&broker);
                first_error = Some(err);
            }
            Err(err) => debug!(error = %err, "Session worker stopped"),
        }
    }
    for client in &clients {
        client.abort();
    }
    broker.stop_dispatch()?;
    close_all(&broker);
    if let Some(err) = first_error {
        return Err(err);
    }

    let summary = SimulationSummary {
        sessions: options.sessions,
        rounds: options.rounds,
        quiet_interval_ms,
        dialogues_answered,
        menu_callbacks: menu_callbacks.load(Ordering::Relaxed),
        renders: render.renders(),
        follow_ups: render.follow_ups(),
        dispatch: broker.dispatch_stats(),
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(elapsed_ms = summary.elapsed_ms, "Simulation finished");

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn close_all(broker: &ModalBroker) {
    for id in broker.registry().ids() {
        broker.close_session(id.as_str());
    }
}

fn print_summary(summary: &SimulationSummary) {
    println!("{}", "Modal Broker Simulation".bold().cyan());
    println!();
    println!("  Sessions:           {}", summary.sessions);
    println!("  Rounds per session: {}", summary.rounds);
    println!("  Quiet interval:     {}ms", summary.quiet_interval_ms);
    println!();
    println!("{}", "Results:".bold());
    println!("  Dialogues answered: {}", summary.dialogues_answered.to_string().green());
    println!("  Menu callbacks:     {}", summary.menu_callbacks.to_string().green());
    println!("  Render requests:    {}", summary.renders);
    println!("  Follow-ups:         {}", summary.follow_ups);
    println!("  Dispatch scans:     {}", summary.dispatch.scans);
    let failures = summary.dispatch.failures.to_string();
    if summary.dispatch.failures == 0 {
        println!("  Dispatch failures:  {}", failures.green());
    } else {
        println!("  Dispatch failures:  {}", failures.red());
    }
    println!("  Elapsed:            {}ms", summary.elapsed_ms);
}

fn confirm_dialogue(round: usize) -> DialogueData {
    DialogueData::message_box(
        "Confirm",
        format!("Apply changes from round {round}?"),
        MessageBoxButtons::YesNo,
    )
}

fn name_dialogue(round: usize) -> DialogueData {
    DialogueData::text_input("Rename", "New element name", format!("element-{round}"))
}

fn counting_menu(callbacks: &Arc<AtomicU64>) -> ContextMenu {
    let callbacks = Arc::clone(callbacks);
    ContextMenu::new(["Edit", "Delete"], move |index| {
        callbacks.fetch_add(1, Ordering::Relaxed);
        if index == 1 {
            Ok(Some(FollowUpAction::RedrawAll { focus: None }))
        } else {
            Ok(None)
        }
    })
}

fn blocking_worker(
    session: &Session,
    rounds: usize,
    callbacks: &Arc<AtomicU64>,
    runtime: &Handle,
) -> anyhow::Result<u64> {
    let mut answered = 0;
    for round in 0..rounds {
        let confirm = session.ask_modal(Some(confirm_dialogue(round)))?;
        let name = session.ask_modal(Some(name_dialogue(round)))?;
        debug!(session = %session.id(), ?confirm, ?name, "Blocking round answered");
        answered += 2;

        session.fire_context_menu(counting_menu(callbacks))?;
        runtime.block_on(wait_for_idle(session))?;
    }
    Ok(answered)
}

async fn async_worker(
    session: &Session,
    rounds: usize,
    callbacks: &Arc<AtomicU64>,
) -> anyhow::Result<u64> {
    let mut answered = 0;
    for round in 0..rounds {
        let confirm = session.ask_modal_async(Some(confirm_dialogue(round))).await?;
        let name = session.ask_modal_async(Some(name_dialogue(round))).await?;
        debug!(session = %session.id(), ?confirm, ?name, "Async round answered");
        answered += 2;

        session.fire_context_menu(counting_menu(callbacks))?;
        wait_for_idle(session).await?;
    }
    Ok(answered)
}

/// Waits until the dispatch loop has consumed the session's menu.
///
/// Fails once the session is closed.
async fn wait_for_idle(session: &Session) -> anyhow::Result<()> {
    let mut state_rx = session.watch_state();
    loop {
        // The borrow must end before `is_closed` takes the session lock
        let idle = *state_rx.borrow_and_update() == ModalState::Idle;
        if idle {
            return Ok(());
        }
        if session.is_closed() {
            anyhow::bail!("Session {} closed while waiting for idle", session.id());
        }
        state_rx.changed().await.context("Session state channel closed")?;
    }
}

/// Answers whatever the session shows, after `delay`.
async fn simulated_client(session: Arc<Session>, delay: Duration) {
    let mut state_rx = session.watch_state();
    loop {
        if let Some(pending) = session.pending() {
            tokio::time::sleep(delay).await;
            let answer = answer_for(&pending, session.id());
            if let Err(err) = session.answer(answer) {
                warn!(session = %session.id(), error = %err, "Simulated answer rejected");
            }
        }
        if state_rx.changed().await.is_err() {
            break;
        }
    }
}

fn answer_for(pending: &PendingInteraction, session: &SessionId) -> DialogueResult {
    match pending {
        PendingInteraction::Dialogue(dialogue) => match &dialogue.kind {
            DialogueKind::MessageBox { buttons, .. } => {
                if buttons.offers(MessageBoxResult::Yes) {
                    DialogueResult::Button(MessageBoxResult::Yes)
                } else {
                    DialogueResult::Button(MessageBoxResult::Ok)
                }
            }
            DialogueKind::TextInput { .. } => DialogueResult::Text(format!("{session}-name")),
            DialogueKind::SelectFromList { items, .. } if !items.is_empty() => {
                DialogueResult::Selected(0)
            }
            _ => DialogueResult::Cancelled,
        },
        PendingInteraction::ContextMenu { items } if !items.is_empty() => {
            DialogueResult::Selected(items.len() - 1)
        }
        PendingInteraction::ContextMenu { .. } | PendingInteraction::ValueEdit { .. } => {
            DialogueResult::Cancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_all_releases_unanswered_workers() {
        let broker = Arc::new(ModalBroker::new(BrokerConfig::default()));
        let render = Arc::new(LoggingRenderTrigger::for_current_runtime());
        let callbacks = Arc::new(AtomicU64::new(0));

        let render = render as Arc<dyn RenderTrigger>;
        let blocking = broker.open_session("blocking", Arc::clone(&render));
        let runtime = Handle::current();
        let blocking_callbacks = Arc::clone(&callbacks);
        let blocked = tokio::task::spawn_blocking(move || {
            blocking_worker(&blocking, 1, &blocking_callbacks, &runtime)
        });

        let menu = broker.open_session("menu", render);
        menu.fire_context_menu(counting_menu(&callbacks)).unwrap();
        let idle_menu = Arc::clone(&menu);
        let idle = tokio::spawn(async move { wait_for_idle(&idle_menu).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        close_all(&broker);

        let blocked = tokio::time::timeout(Duration::from_secs(5), blocked).await.unwrap().unwrap();
        assert!(blocked.is_err());
        let idle = tokio::time::timeout(Duration::from_secs(5), idle).await.unwrap().unwrap();
        assert!(idle.is_err());
        assert_eq!(broker.registry().count(), 0);
    }

    #[test]
    fn test_answer_for_message_box_prefers_yes() {
        let id = SessionId::from("s");
        let yes_no = PendingInteraction::Dialogue(confirm_dialogue(0));
        assert_eq!(answer_for(&yes_no, &id), DialogueResult::Button(MessageBoxResult::Yes));

        let ok = PendingInteraction::Dialogue(DialogueData::message_box(
            "Info",
            "",
            MessageBoxButtons::Ok,
        ));
        assert_eq!(answer_for(&ok, &id), DialogueResult::Button(MessageBoxResult::Ok));
    }

    #[test]
    fn test_answer_for_menu_picks_last_item() {
        let id = SessionId::from("s");
        let menu = PendingInteraction::ContextMenu { items: vec!["Edit".into(), "Delete".into()] };
        assert_eq!(answer_for(&menu, &id), DialogueResult::Selected(1));

        let empty = PendingInteraction::ContextMenu { items: Vec::new() };
        assert_eq!(answer_for(&empty, &id), DialogueResult::Cancelled);
    }
}
