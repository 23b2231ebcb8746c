//! Session registry.
//!
//! The process-wide map of live sessions, keyed by session id. Request
//! handlers and the dispatch loop share it; the dispatch loop works on
//! snapshots so concurrent adds and removes never block a scan.

use crate::clock::{Clock, SystemClock};
use crate::session::{Session, SessionSettings};
use broker_abstraction::{RenderTrigger, SessionId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Registry owning every live [`Session`].
pub struct SessionRegistry {
    /// Map of session ID to session record.
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Settings applied to every new session.
    settings: SessionSettings,
    /// Time source handed to every new session.
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("session_count", &self.sessions.try_read().map(|s| s.len()).unwrap_or(0))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates an empty registry using the system clock.
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Creates an empty registry with an explicit time source.
    #[must_use]
    pub fn with_clock(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), settings, clock }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settings applied to new sessions.
    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Creates a session for a new connection.
    ///
    /// # Arguments
    /// * `id` - The connection's session id
    /// * `render` - The host's render trigger for this connection
    ///
    /// # Returns
    /// Returns `true` if the session was created, `false` if the id was already
    /// registered. An existing session is never replaced.
    pub fn add(&self, id: impl Into<SessionId>, render: Arc<dyn RenderTrigger>) -> bool {
        self.get_or_add(id, render).1
    }

    /// Returns the session for `id`, creating it first if needed.
    ///
    /// # Returns
    /// The session and whether it was newly created.
    pub fn get_or_add(
        &self,
        id: impl Into<SessionId>,
        render: Arc<dyn RenderTrigger>,
    ) -> (Arc<Session>, bool) {
        let id = id.into();
        let mut sessions = self.write();

        if let Some(existing) = sessions.get(&id) {
            debug!(session = %id, "Session already registered");
            return (Arc::clone(existing), false);
        }

        debug!(session = %id, "Registering session");
        let session = Arc::new(Session::with_settings(
            id.clone(),
            render,
            self.settings,
            Arc::clone(&self.clock),
        ));
        sessions.insert(id, Arc::clone(&session));
        (session, true)
    }

    /// Removes a session when its connection closes.
    ///
    /// Anyone still waiting on the session is woken with
    /// [`BrokerError::SessionClosed`](crate::BrokerError::SessionClosed).
    ///
    /// # Returns
    /// Returns `true` if the session was found and removed, `false` otherwise.
    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.write();

        match sessions.remove(id) {
            Some(session) => {
                // Closed before the write lock is released, so a scan holding
                // an older snapshot never runs this session's callbacks.
                session.close();
                drop(sessions);
                debug!(session = %id, "Removed session");
                true
            }
            None => {
                warn!(session = %id, "Attempted to remove unknown session");
                false
            }
        }
    }

    /// Looks up a session.
    ///
    /// # Returns
    /// Returns `Some(Arc<Session>)` if found, `None` otherwise.
    pub fn find(&self, id: &str) -> Option<Arc<Session>> {
        self.read().get(id).cloned()
    }

    /// Checks if a session is registered.
    pub fn is_registered(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Returns the number of live sessions.
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Ids of every live session, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Point-in-time copy of the live sessions.
    ///
    /// Sessions added afterwards are missed; sessions removed afterwards are
    /// already marked closed and refuse further work.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.read().values().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
