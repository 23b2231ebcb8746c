//! Background dispatch loop.
//!
//! A single background task scans the session registry on a fixed tick and runs
//! the callbacks of answered context menus and value edits. The original caller
//! of `fire_context_menu`/`fire_value_edit` has usually returned long before the
//! client answers, so nobody else is left to run them.

use crate::config::DispatchConfig;
use crate::error::{BrokerError, Result};
use crate::registry::SessionRegistry;
use crate::session::Session;
use broker_abstraction::{BackgroundAction, CallbackError, CallbackOutcome};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Running totals across every scan of one dispatch loop.
#[derive(Debug, Default)]
pub struct DispatchStats {
    scans: AtomicU64,
    menu_choices: AtomicU64,
    value_edits: AtomicU64,
    dismissed: AtomicU64,
    failures: AtomicU64,
}

impl DispatchStats {
    fn record(&self, report: &DispatchReport) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.menu_choices.fetch_add(report.menu_choices, Ordering::Relaxed);
        self.value_edits.fetch_add(report.value_edits, Ordering::Relaxed);
        self.dismissed.fetch_add(report.dismissed, Ordering::Relaxed);
        self.failures.fetch_add(report.failures, Ordering::Relaxed);
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            menu_choices: self.menu_choices.load(Ordering::Relaxed),
            value_edits: self.value_edits.load(Ordering::Relaxed),
            dismissed: self.dismissed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub scans: u64,
    pub menu_choices: u64,
    pub value_edits: u64,
    pub dismissed: u64,
    pub failures: u64,
}

/// What one scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Sessions looked at.
    pub sessions: u64,
    /// Menu callbacks run.
    pub menu_choices: u64,
    /// Value-changed callbacks run.
    pub value_edits: u64,
    /// Menus closed without a choice.
    pub dismissed: u64,
    /// Callbacks that returned an error or panicked.
    pub failures: u64,
}

impl DispatchReport {
    /// Number of actions taken off sessions in this scan.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.menu_choices + self.value_edits + self.dismissed
    }
}

/// Scans the registry once and dispatches every answered background action.
///
/// Each session's action is taken (returning the session to `Idle`) before its
/// callback runs, so a failing callback never leaves a session stuck.
pub fn dispatch_pending(registry: &SessionRegistry, stats: &DispatchStats) -> DispatchReport {
    let mut report = DispatchReport::default();

    for session in registry.snapshot() {
        report.sessions += 1;
        let Some(action) = session.take_answered_action() else {
            continue;
        };
        dispatch_action(&session, action, &mut report);
    }

    stats.record(&report);
    if report.dispatched() > 0 {
        debug!(
            dispatched = report.dispatched(),
            failures = report.failures,
            "Dispatch scan finished"
        );
    }
    report
}

fn dispatch_action(session: &Session, action: BackgroundAction, report: &mut DispatchReport) {
    let kind = action.kind();
    let outcome = match action {
        BackgroundAction::ContextMenuChoice(choice) => {
            let Some(index) = choice.chosen else {
                debug!(session = %session.id(), "Context menu dismissed");
                report.dismissed += 1;
                return;
            };
            debug!(
                session = %session.id(),
                index,
                item = choice.menu.item(index).unwrap_or_default(),
                "Dispatching context menu choice"
            );
            report.menu_choices += 1;
            run_callback(|| choice.menu.select(index))
        }
        BackgroundAction::ValueEdit(edit) => {
            debug!(
                session = %session.id(),
                element = %edit.target.element_id,
                "Dispatching value edit"
            );
            report.value_edits += 1;
            run_callback(|| edit.target.apply(&edit.new_value))
        }
    };

    match outcome {
        Ok(Some(follow_up)) => {
            debug!(session = %session.id(), ?follow_up, "Scheduling follow-up");
            session.render_trigger().schedule(session.id(), follow_up);
        }
        Ok(None) => {}
        Err(err) => {
            error!(session = %session.id(), kind = ?kind, error = %err, "Background action failed");
            report.failures += 1;
        }
    }
}

/// Runs an application callback, turning a panic into an error.
fn run_callback<F>(callback: F) -> CallbackOutcome
where
    F: FnOnce() -> CallbackOutcome,
{
    panic::catch_unwind(AssertUnwindSafe(callback)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(CallbackError::Panicked(message))
    })
}

/// Owns the background task that runs [`dispatch_pending`] on every tick.
pub struct DispatchLoop {
    /// Registry scanned on every tick.
    registry: Arc<SessionRegistry>,
    /// Configuration.
    config: DispatchConfig,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<()>>,
    /// The most recently spawned task, possibly still finishing after `stop`.
    task: Option<JoinHandle<()>>,
    /// Counters shared with the background task.
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for DispatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchLoop")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DispatchLoop {
    /// Creates a stopped dispatch loop.
    ///
    /// # Arguments
    /// * `registry` - Session registry to scan
    /// * `config` - Dispatch configuration
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, config: DispatchConfig) -> Self {
        Self {
            registry,
            config,
            shutdown_tx: None,
            task: None,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Starts the loop in a background task. Must be called within a Tokio runtime.
    ///
    /// If a previous task is still finishing its last scan, the new task waits
    /// for it before its first tick.
    ///
    /// # Errors
    /// Returns [`BrokerError::DispatcherAlreadyRunning`] if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Err(BrokerError::DispatcherAlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        self.shutdown_tx = Some(shutdown_tx);

        let tick_interval = self.config.tick_interval();
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let previous = self.task.take();

        self.task = Some(tokio::spawn(async move {
            if let Some(previous) = previous
                && let Err(err) = previous.await
            {
                warn!(error = %err, "Previous dispatch task ended abnormally");
            }
            info!(tick_ms = tick_interval.as_millis(), "Dispatch loop started");

            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("Dispatch loop shutdown signal received");
                        break;
                    }
                    _ = interval.tick() => {
                        dispatch_pending(&registry, &stats);
                    }
                }
            }

            info!("Dispatch loop stopped");
        }));

        Ok(())
    }

    /// Signals the loop to stop. A scan already in progress finishes first.
    ///
    /// # Errors
    /// Returns [`BrokerError::DispatcherNotRunning`] if not running.
    pub fn stop(&mut self) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.take().ok_or(BrokerError::DispatcherNotRunning)?;
        shutdown_tx.send_replace(());
        Ok(())
    }

    /// Checks if the loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Counters across every scan so far.
    #[must_use]
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// The counters shared with the background task.
    #[must_use]
    pub fn shared_stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Returns `true` once the last spawned task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send_replace(());
        }
    }
}
