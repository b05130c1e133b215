//! Application-level session listeners.

use std::fmt;
use std::sync::{Arc, RwLock};

use super::ExpirationCause;
use crate::session::ImmutableSession;

/// Application hook for session creation and destruction.
///
/// Both callbacks default to doing nothing.
pub trait SessionListener: Send + Sync {
    /// A session creation committed.
    fn session_created(&self, _session: &ImmutableSession) {}

    /// A session ended.
    fn session_destroyed(&self, _session: &ImmutableSession, _cause: ExpirationCause) {}
}

/// Thread-safe list of registered [`SessionListener`]s.
///
/// Callbacks run against a copy of the list, so a listener may register or
/// remove listeners while being notified.
#[derive(Default)]
pub struct SessionListeners {
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn SessionListener>) {
        self.write().push(listener);
    }

    /// Remove a listener by identity. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn SessionListener>) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn notify_created(&self, session: &ImmutableSession) {
        let listeners = self.read().clone();
        for listener in listeners {
            listener.session_created(session);
        }
    }

    pub fn notify_destroyed(&self, session: &ImmutableSession, cause: ExpirationCause) {
        let listeners = self.read().clone();
        for listener in listeners {
            listener.session_destroyed(session, cause);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn SessionListener>>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn SessionListener>>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for SessionListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionListeners")
            .field("len", &self.len())
            .finish()
    }
}
