//! Builds session managers over a store.

use std::sync::Arc;

use tracing::info;

use super::distributable::ManagerParts;
use super::{DistributableSessionManager, ManagerConfig};
use crate::batch::{Batcher, Transactional};
use crate::listener::{ManagerExpirationListener, SessionListeners};
use crate::session::{default_identifier_factory, IdentifierFactory, SessionStore};
use crate::statistics::{ActiveSessionCounter, SessionStatistics, Statistics};

/// Composes a store, an identifier source and a listener registry into
/// [`DistributableSessionManager`]s.
///
/// The factory installs the manager's expiration listener on the store, so
/// a store should back one manager at a time.
pub struct DistributableSessionManagerFactory {
    store: Arc<dyn SessionStore>,
    tx: Arc<dyn Transactional>,
    identifiers: IdentifierFactory,
    listeners: Arc<SessionListeners>,
}

impl DistributableSessionManagerFactory {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: SessionStore + 'static,
    {
        let tx: Arc<dyn Transactional> = store.clone();
        Self {
            store,
            tx,
            identifiers: default_identifier_factory(),
            listeners: Arc::new(SessionListeners::new()),
        }
    }

    /// Use `identifiers` instead of random UUIDs for new sessions.
    pub fn with_identifier_factory(mut self, identifiers: IdentifierFactory) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Registry shared with every manager this factory creates.
    pub fn listeners(&self) -> &Arc<SessionListeners> {
        &self.listeners
    }

    pub fn create_session_manager(&self, config: ManagerConfig) -> Arc<DistributableSessionManager> {
        let active = (config.statistics_enabled || config.max_active_sessions.is_some())
            .then(|| Arc::new(ActiveSessionCounter::new(config.max_active_sessions)));

        let statistics = match &active {
            Some(active) if config.statistics_enabled => {
                Statistics::Enabled(Arc::new(SessionStatistics::new(Arc::clone(active))))
            }
            _ => Statistics::Disabled,
        };

        let expiration = Arc::new(ManagerExpirationListener::new(
            config.deployment_name.clone(),
            Arc::clone(&self.listeners),
            statistics.clone(),
            active.clone(),
        ));
        self.store.set_expiration_listener(expiration.clone());

        info!(
            deployment = %config.deployment_name,
            default_timeout_secs = config.default_timeout.as_secs(),
            max_active_sessions = ?config.max_active_sessions,
            statistics = config.statistics_enabled,
            orphan_sessions = config.orphan_session_allowed,
            "session manager created"
        );

        Arc::new(DistributableSessionManager::from_parts(ManagerParts {
            config,
            store: Arc::clone(&self.store),
            batcher: Batcher::new(Arc::clone(&self.tx)),
            identifiers: Arc::clone(&self.identifiers),
            active,
            statistics,
            listeners: Arc::clone(&self.listeners),
            expiration,
        }))
    }
}

impl std::fmt::Debug for DistributableSessionManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributableSessionManagerFactory")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
