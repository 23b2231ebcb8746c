//! Modal interaction broker.
//!
//! Lets application code ask a client something ("delete this?", "pick a
//! file") and wait for the answer, although the answer only arrives later on an
//! unrelated request. Each client connection gets a [`Session`] in the
//! [`SessionRegistry`]; fire-and-forget interactions (context menus, in-place
//! edits) are executed by the [`DispatchLoop`] once answered.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod session;
pub mod testing;

use broker_abstraction::{DialogueResult, RenderTrigger, SessionId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BrokerConfig, DispatchConfig, ModalConfig};
pub use dispatcher::{
    dispatch_pending, DispatchLoop, DispatchReport, DispatchStats, DispatchStatsSnapshot,
};
pub use error::{BrokerError, Result};
pub use registry::SessionRegistry;
pub use session::{ModalState, PendingInteraction, Session, SessionSettings, ThrottleGuard};

/// Owns the session registry and its dispatch loop.
pub struct ModalBroker {
    config: BrokerConfig,
    registry: Arc<SessionRegistry>,
    stats: Arc<DispatchStats>,
    /// Held only to start, stop or query the loop, never across a scan.
    dispatch: Mutex<DispatchLoop>,
}

impl std::fmt::Debug for ModalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModalBroker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ModalBroker {
    /// Creates a broker using the system clock. The dispatch loop is not started.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a broker with an explicit time source for the throttle guard.
    #[must_use]
    pub fn with_clock(config: BrokerConfig, clock: Arc<dyn Clock>) -> Self {
        let registry =
            Arc::new(SessionRegistry::with_clock(SessionSettings::from(&config.modal), clock));
        let dispatch = DispatchLoop::new(Arc::clone(&registry), config.dispatch.clone());
        let stats = Arc::clone(dispatch.shared_stats());
        Self { config, registry, stats, dispatch: Mutex::new(dispatch) }
    }

    fn dispatch(&self) -> MutexGuard<'_, DispatchLoop> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration the broker was built with.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Registers a connection, or returns its session if already registered.
    pub fn open_session(
        &self,
        id: impl Into<SessionId>,
        render: Arc<dyn RenderTrigger>,
    ) -> Arc<Session> {
        self.registry.get_or_add(id, render).0
    }

    /// Unregisters a connection, waking anyone still waiting on it.
    pub fn close_session(&self, id: &str) -> bool {
        self.registry.remove(id)
    }

    /// Looks up a live session.
    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.registry.find(id)
    }

    /// Routes a client's answer to its session.
    ///
    /// Returns `Ok(false)` if the session no longer exists, which is normal when
    /// a reply races with the connection closing.
    ///
    /// # Errors
    ///
    /// Propagates the session's rejection of the answer.
    pub fn answer(&self, id: &str, result: DialogueResult) -> Result<bool> {
        let Some(session) = self.registry.find(id) else {
            debug!(session = %id, "Answer for unknown session dropped");
            return Ok(false);
        };
        session.answer(result)?;
        Ok(true)
    }

    /// Starts the background dispatch loop. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DispatcherAlreadyRunning`] if already started.
    pub fn start_dispatch(&self) -> Result<()> {
        self.dispatch().start()
    }

    /// Stops the background dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::DispatcherNotRunning`] if not started.
    pub fn stop_dispatch(&self) -> Result<()> {
        self.dispatch().stop()
    }

    /// Checks if the dispatch loop is running.
    pub fn is_dispatch_running(&self) -> bool {
        self.dispatch().is_running()
    }

    /// Runs one dispatch scan on the calling thread.
    ///
    /// Callbacks run here may call back into the broker.
    pub fn scan_once(&self) -> DispatchReport {
        dispatch_pending(&self.registry, &self.stats)
    }

    /// Dispatch counters so far.
    pub fn dispatch_stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for ModalBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
