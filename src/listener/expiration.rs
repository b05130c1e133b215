//! Expiration listener installed by the session manager.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::{ExpirationCause, ExpirationListener, SessionListeners};
use crate::session::ImmutableSession;
use crate::statistics::{ActiveSessionCounter, Statistics};

/// Bridges store expiration events to the manager's bookkeeping.
///
/// For each ended session it releases one active-session slot, records the
/// session's lifetime when statistics are enabled, and then notifies the
/// registered [`SessionListeners`].
pub struct ManagerExpirationListener {
    deployment: String,
    listeners: Arc<SessionListeners>,
    statistics: Statistics,
    active: Option<Arc<ActiveSessionCounter>>,
}

impl ManagerExpirationListener {
    pub fn new(
        deployment: impl Into<String>,
        listeners: Arc<SessionListeners>,
        statistics: Statistics,
        active: Option<Arc<ActiveSessionCounter>>,
    ) -> Self {
        Self {
            deployment: deployment.into(),
            listeners,
            statistics,
            active,
        }
    }

    /// Undo a creation whose batch rolled back.
    ///
    /// Frees the slot and tells listeners the session is gone, but leaves
    /// statistics alone since the session never existed outside the batch.
    pub fn session_discarded(&self, session: &ImmutableSession) {
        if let Some(active) = &self.active {
            active.release();
        }
        debug!(
            deployment = %self.deployment,
            session = %session.id,
            "uncommitted session discarded"
        );
        self.listeners
            .notify_destroyed(session, ExpirationCause::Invalidated);
    }
}

impl ExpirationListener for ManagerExpirationListener {
    fn session_expired(&self, session: &ImmutableSession, cause: ExpirationCause) {
        if let Some(active) = &self.active {
            active.release();
        }
        if let Some(stats) = self.statistics.as_enabled() {
            stats.record_inactive(session, cause, SystemTime::now());
        }

        debug!(
            deployment = %self.deployment,
            session = %session.id,
            %cause,
            "session ended"
        );
        self.listeners.notify_destroyed(session, cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::SessionListener;
    use crate::session::SessionMetaData;
    use crate::statistics::SessionStatistics;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingListener {
        destroyed: AtomicUsize,
    }

    impl SessionListener for CountingListener {
        fn session_destroyed(&self, _session: &ImmutableSession, _cause: ExpirationCause) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session() -> ImmutableSession {
        ImmutableSession::new(
            "ended".parse().unwrap(),
            SessionMetaData::new(SystemTime::now(), Duration::from_secs(60)),
            HashMap::new(),
        )
    }

    #[test]
    fn test_expiration_updates_bookkeeping() {
        let active = Arc::new(ActiveSessionCounter::new(Some(4)));
        active.try_acquire().unwrap();
        let stats = Arc::new(SessionStatistics::new(Arc::clone(&active)));
        let listeners = Arc::new(SessionListeners::new());
        let counting = Arc::new(CountingListener::default());
        listeners.add(counting.clone());

        let listener = ManagerExpirationListener::new(
            "ROOT",
            listeners,
            Statistics::Enabled(Arc::clone(&stats)),
            Some(Arc::clone(&active)),
        );
        listener.session_expired(&session(), ExpirationCause::Expired);

        assert_eq!(active.get(), 0);
        assert_eq!(stats.inactive().expired_count(), 1);
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_statistics_still_notifies() {
        let listeners = Arc::new(SessionListeners::new());
        let counting = Arc::new(CountingListener::default());
        listeners.add(counting.clone());

        let listener =
            ManagerExpirationListener::new("ROOT", listeners, Statistics::Disabled, None);
        listener.session_expired(&session(), ExpirationCause::Invalidated);

        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discarded_session_skips_statistics() {
        let active = Arc::new(ActiveSessionCounter::new(Some(4)));
        active.try_acquire().unwrap();
        let stats = Arc::new(SessionStatistics::new(Arc::clone(&active)));
        let listeners = Arc::new(SessionListeners::new());
        let counting = Arc::new(CountingListener::default());
        listeners.add(counting.clone());

        let listener = ManagerExpirationListener::new(
            "ROOT",
            listeners,
            Statistics::Enabled(Arc::clone(&stats)),
            Some(Arc::clone(&active)),
        );
        listener.session_discarded(&session());

        assert_eq!(active.get(), 0);
        assert_eq!(stats.inactive().expired_count(), 0);
        assert_eq!(stats.inactive().invalidated_count(), 0);
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
    }
}
