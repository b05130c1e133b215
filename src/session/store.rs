//! Session store adapter interface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{ImmutableSession, SessionId, SessionMetaData};
use crate::batch::{Batch, Transactional};
use crate::listener::ExpirationListener;
use crate::Result;

/// Replicated key/value storage of session attribute maps.
///
/// Every read and write names the batch it belongs to. Changes made under a
/// batch are visible to that batch immediately and to other batches once the
/// batch commits through [`Transactional::commit`]. Operations against a
/// batch the store has not begun (or has already closed) fail with
/// `InvalidBatchState`, attribute access to a session the batch cannot see
/// fails with `SessionRemoved`, and infrastructure failures surface as
/// `StoreUnavailable` and are never retried by the manager.
///
/// Whether sessions owned by departed cluster members are still served
/// (orphan sessions) is a policy of the store implementation.
pub trait SessionStore: Transactional {
    /// Create a session record.
    ///
    /// Fails with `IdentifierConflict` if the ID is in use, including by a
    /// creation still pending in another batch.
    fn create_session(
        &self,
        id: &SessionId,
        timeout: Duration,
        batch: &Batch,
    ) -> Result<SessionMetaData>;

    /// Look up a session and record the access.
    ///
    /// Returns the metadata as it was before this access, or `None` if the
    /// session does not exist or has expired.
    fn find_session(&self, id: &SessionId, batch: &Batch) -> Result<Option<SessionMetaData>>;

    /// Delete a session. Returns false if it did not exist.
    ///
    /// The expiration listener is told about the removal, with cause
    /// `Invalidated`, once the batch commits.
    fn remove_session(&self, id: &SessionId, batch: &Batch) -> Result<bool>;

    /// Read an attribute. `Ok(None)` if the attribute is not set.
    fn attribute(&self, id: &SessionId, name: &str, batch: &Batch) -> Result<Option<Value>>;

    /// Names of all attributes.
    fn attribute_names(&self, id: &SessionId, batch: &Batch) -> Result<Vec<String>>;

    /// Write an attribute, returning the previous value.
    fn set_attribute(
        &self,
        id: &SessionId,
        name: &str,
        value: Value,
        batch: &Batch,
    ) -> Result<Option<Value>>;

    /// Remove an attribute, returning the removed value.
    fn remove_attribute(&self, id: &SessionId, name: &str, batch: &Batch) -> Result<Option<Value>>;

    /// Change the inactive interval.
    fn set_timeout(&self, id: &SessionId, timeout: Duration, batch: &Batch) -> Result<()>;

    /// Copy of the session as seen by `batch`.
    fn snapshot(&self, id: &SessionId, batch: &Batch) -> Result<Option<ImmutableSession>>;

    /// Install the listener told about expired and invalidated sessions.
    fn set_expiration_listener(&self, listener: Arc<dyn ExpirationListener>);

    /// Number of committed sessions held by this node.
    fn session_count(&self) -> usize;
}
