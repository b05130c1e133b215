//! Live session handle bound to a batch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{ImmutableSession, SessionId, SessionMetaData, SessionState, SessionStore};
use crate::batch::Batch;
use crate::error::SessionError;
use crate::Result;

/// A session as seen by one batch.
///
/// Every read and write goes through the store under the handle's batch, so
/// changes become visible to other requests when that batch commits. Using
/// the handle after its batch closed fails with `InvalidBatchState`.
pub struct Session {
    id: SessionId,
    metadata: SessionMetaData,
    state: SessionState,
    batch: Batch,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        metadata: SessionMetaData,
        state: SessionState,
        batch: Batch,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            id,
            metadata,
            state,
            batch,
            store,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Metadata as it was when the handle was obtained.
    pub fn metadata(&self) -> &SessionMetaData {
        &self.metadata
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether this handle is the first access since the session was created.
    ///
    /// Also true for a session committed by an earlier batch that nothing
    /// has looked up since.
    pub fn is_new(&self) -> bool {
        self.state == SessionState::Created
    }

    /// The batch this handle reads and writes through.
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn attribute(&self, name: &str) -> Result<Option<Value>> {
        self.check()?;
        self.store.attribute(&self.id, name, &self.batch)
    }

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        self.check()?;
        self.store.attribute_names(&self.id, &self.batch)
    }

    /// Set an attribute, returning the previous value.
    pub fn set_attribute(&self, name: &str, value: Value) -> Result<Option<Value>> {
        self.check()?;
        self.store.set_attribute(&self.id, name, value, &self.batch)
    }

    pub fn remove_attribute(&self, name: &str) -> Result<Option<Value>> {
        self.check()?;
        self.store.remove_attribute(&self.id, name, &self.batch)
    }

    /// Change this session's inactive interval.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.check()?;
        self.store.set_timeout(&self.id, timeout, &self.batch)?;
        self.metadata.timeout = timeout;
        Ok(())
    }

    /// Copy of the session as currently seen by the batch.
    pub fn snapshot(&self) -> Result<ImmutableSession> {
        self.check()?;
        self.store
            .snapshot(&self.id, &self.batch)?
            .ok_or_else(|| SessionError::SessionRemoved(self.id.clone()))
    }

    /// Invalidate the session. Listeners are notified once the batch commits.
    pub fn invalidate(&mut self) -> Result<()> {
        self.batch.ensure_open()?;
        let mut next = self.state;
        next.transition_to(SessionState::Invalidated)?;
        if !self.store.remove_session(&self.id, &self.batch)? {
            return Err(SessionError::SessionRemoved(self.id.clone()));
        }
        self.state = next;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        self.batch.ensure_open()?;
        if !self.state.is_valid() {
            return Err(SessionError::SessionRemoved(self.id.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("batch", &self.batch.id())
            .finish_non_exhaustive()
    }
}
