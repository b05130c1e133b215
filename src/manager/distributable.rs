//! The distributable session manager facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ManagerConfig;
use crate::batch::{Batch, BatchContext, BatchOutcome, Batcher};
use crate::error::SessionError;
use crate::listener::{ManagerExpirationListener, SessionListeners};
use crate::session::{
    IdentifierFactory, ImmutableSession, Session, SessionId, SessionState, SessionStore,
};
use crate::statistics::{ActiveSessionCounter, Statistics};
use crate::wrapper::RequestBatchWrapper;
use crate::Result;

/// Session manager shared by every request of one deployment.
///
/// Each operation runs in the batch already bound to the caller's
/// [`BatchContext`] when there is one (the normal case inside
/// [`RequestBatchWrapper`]); otherwise it runs in a batch of its own that
/// commits before the call returns. Handles returned from such a
/// self-contained call are therefore already closed for further use.
pub struct DistributableSessionManager {
    config: ManagerConfig,
    store: Arc<dyn SessionStore>,
    batcher: Batcher,
    wrapper: RequestBatchWrapper,
    identifiers: IdentifierFactory,
    default_timeout_ms: AtomicU64,
    active: Option<Arc<ActiveSessionCounter>>,
    statistics: Statistics,
    listeners: Arc<SessionListeners>,
    expiration: Arc<ManagerExpirationListener>,
}

/// Everything the factory resolved for a new manager.
pub(crate) struct ManagerParts {
    pub config: ManagerConfig,
    pub store: Arc<dyn SessionStore>,
    pub batcher: Batcher,
    pub identifiers: IdentifierFactory,
    pub active: Option<Arc<ActiveSessionCounter>>,
    pub statistics: Statistics,
    pub listeners: Arc<SessionListeners>,
    pub expiration: Arc<ManagerExpirationListener>,
}

impl DistributableSessionManager {
    pub(crate) fn from_parts(parts: ManagerParts) -> Self {
        let default_timeout_ms = AtomicU64::new(duration_ms(parts.config.default_timeout));
        Self {
            wrapper: RequestBatchWrapper::new(parts.batcher.clone()),
            config: parts.config,
            store: parts.store,
            batcher: parts.batcher,
            identifiers: parts.identifiers,
            default_timeout_ms,
            active: parts.active,
            statistics: parts.statistics,
            listeners: parts.listeners,
            expiration: parts.expiration,
        }
    }

    /// Create a session, generating an identifier unless one is requested.
    ///
    /// The session gets the current default timeout. Fails with
    /// `MaxSessionsExceeded` when the active-session bound is reached and
    /// with `IdentifierConflict` when the identifier is taken; both leave
    /// the caller's batch usable.
    ///
    /// Lifecycle listeners hear about the session immediately. If the batch
    /// later rolls back, they hear about its invalidation and the slot is
    /// released; statistics only count creations that commit.
    pub fn create_session(&self, ctx: &BatchContext, id: Option<SessionId>) -> Result<Session> {
        let id = id.unwrap_or_else(|| (self.identifiers)());
        let timeout = self.default_session_timeout();

        self.in_batch(ctx, |batch, _| {
            if let Some(active) = &self.active {
                if let Err(e) = active.try_acquire() {
                    warn!(
                        deployment = %self.config.deployment_name,
                        session = %id,
                        "session creation rejected: {e}"
                    );
                    return Err(e);
                }
            }

            let metadata = match self.store.create_session(&id, timeout, batch) {
                Ok(metadata) => metadata,
                Err(e) => {
                    if let Some(active) = &self.active {
                        active.release();
                    }
                    return Err(e);
                }
            };

            let snapshot = ImmutableSession::new(id.clone(), metadata, HashMap::new());
            self.listeners.notify_created(&snapshot);

            let expiration = Arc::clone(&self.expiration);
            let statistics = self.statistics.clone();
            batch.on_completion(move |outcome| match outcome {
                BatchOutcome::Committed => {
                    if let Some(stats) = statistics.as_enabled() {
                        stats.record_created();
                    }
                }
                // Never persisted, so it neither counts as created nor as
                // expired.
                BatchOutcome::RolledBack => expiration.session_discarded(&snapshot),
            });

            debug!(session = %id, batch = %batch.id(), ?timeout, "session created");
            Ok(Session::new(
                id.clone(),
                metadata,
                SessionState::Created,
                batch.clone(),
                Arc::clone(&self.store),
            ))
        })
    }

    /// Look up a session and record the access.
    ///
    /// `Ok(None)` if it does not exist or has expired; a miss changes
    /// nothing.
    pub fn get_session(&self, ctx: &BatchContext, id: &SessionId) -> Result<Option<Session>> {
        self.in_batch(ctx, |batch, owned| {
            let Some(metadata) = self.store.find_session(id, batch)? else {
                if owned {
                    batch.discard();
                }
                debug!(session = %id, "session not found");
                return Ok(None);
            };

            let state = if metadata.is_new() {
                SessionState::Created
            } else {
                SessionState::Active
            };
            Ok(Some(Session::new(
                id.clone(),
                metadata,
                state,
                batch.clone(),
                Arc::clone(&self.store),
            )))
        })
    }

    /// Remove a session. Removing a missing session is not an error.
    ///
    /// Returns whether a session was removed.
    pub fn remove_session(&self, ctx: &BatchContext, id: &SessionId) -> Result<bool> {
        self.in_batch(ctx, |batch, _| {
            let removed = self.store.remove_session(id, batch)?;
            debug!(session = %id, removed, "session removal staged");
            Ok(removed)
        })
    }

    /// Statistics, unless they were disabled when the manager was created.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn is_orphan_session_allowed(&self) -> bool {
        self.config.orphan_session_allowed
    }

    /// Timeout given to sessions created from now on.
    pub fn default_session_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.load(Ordering::Acquire))
    }

    /// Change the default timeout. Sessions already created keep theirs.
    pub fn set_default_session_timeout(&self, timeout: Duration) {
        self.default_timeout_ms
            .store(duration_ms(timeout), Ordering::Release);
        info!(
            deployment = %self.config.deployment_name,
            timeout_secs = timeout.as_secs(),
            "default session timeout changed"
        );
    }

    pub fn deployment_name(&self) -> &str {
        &self.config.deployment_name
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    /// Wrapper that runs request handlers in their own batch.
    pub fn request_wrapper(&self) -> &RequestBatchWrapper {
        &self.wrapper
    }

    pub fn listeners(&self) -> &Arc<SessionListeners> {
        &self.listeners
    }

    /// Live sessions counted against the bound, or the store's count when
    /// neither a bound nor statistics are configured.
    pub fn active_session_count(&self) -> usize {
        match &self.active {
            Some(active) => active.get(),
            None => self.store.session_count(),
        }
    }

    /// Run `f` in the context's open batch, or in a batch of its own.
    ///
    /// `f` learns whether it owns the batch. Errors roll an owned batch
    /// back; a joined batch is marked rollback-only unless the error is a
    /// rejection that staged nothing.
    fn in_batch<T>(
        &self,
        ctx: &BatchContext,
        f: impl FnOnce(&Batch, bool) -> Result<T>,
    ) -> Result<T> {
        if let Some(batch) = self.batcher.current_batch(ctx) {
            return f(&batch, false).map_err(|e| {
                if !e.is_rejection() {
                    batch.discard();
                }
                e
            });
        }

        self.wrapper.call(ctx, |ctx| {
            let batch = self.batcher.current_batch(ctx).ok_or_else(|| {
                SessionError::InvalidBatchState("request batch not bound".to_string())
            })?;
            f(&batch, true)
        })
    }
}

impl std::fmt::Debug for DistributableSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributableSessionManager")
            .field("config", &self.config)
            .field("statistics", &self.statistics.is_enabled())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
