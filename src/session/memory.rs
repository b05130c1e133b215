//! In-process session store with batch isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{ImmutableSession, SessionId, SessionMetaData, SessionStore};
use crate::batch::{Batch, BatchId, Transactional};
use crate::error::SessionError;
use crate::listener::{ExpirationCause, ExpirationListener};
use crate::Result;

#[derive(Debug, Clone)]
struct SessionRecord {
    metadata: SessionMetaData,
    attributes: HashMap<String, Value>,
}

impl SessionRecord {
    fn new(metadata: SessionMetaData) -> Self {
        Self {
            metadata,
            attributes: HashMap::new(),
        }
    }

    fn snapshot(&self, id: &SessionId) -> ImmutableSession {
        ImmutableSession::new(id.clone(), self.metadata, self.attributes.clone())
    }
}

/// A change made by an open batch, invisible to other batches until commit.
#[derive(Debug)]
enum Staged {
    Upsert {
        record: SessionRecord,
        created: bool,
    },
    Removed {
        snapshot: ImmutableSession,
        created: bool,
    },
}

#[derive(Debug, Default)]
struct Pending {
    batches: HashMap<BatchId, HashMap<SessionId, Staged>>,
    /// Identifiers of sessions created by a batch that has not committed yet.
    reserved: HashMap<SessionId, BatchId>,
}

impl Pending {
    fn batch(&self, batch: BatchId) -> Result<&HashMap<SessionId, Staged>> {
        self.batches.get(&batch).ok_or_else(|| unknown_batch(batch))
    }
}

fn unknown_batch(batch: BatchId) -> SessionError {
    SessionError::InvalidBatchState(format!("{batch} is not open in this store"))
}

/// Thread-safe, single-node implementation of [`SessionStore`].
///
/// Each batch works on private copies of the sessions it touches. Commit
/// publishes those copies atomically with respect to other commits; rollback
/// throws them away. Lock order is always pending changes, then sessions.
///
/// Expired sessions are removed by [`expire`](Self::expire), either from a
/// periodic task started with
/// [`spawn_expiration_task`](Self::spawn_expiration_task) or when a lookup
/// runs into one. Either way the listener hears about each session once.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    pending: Mutex<Pending>,
    listener: RwLock<Option<Arc<dyn ExpirationListener>>>,
    available: AtomicBool,
}

impl InMemorySessionStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pending: Mutex::new(Pending::default()),
            listener: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    /// Mark the store as reachable or not.
    ///
    /// While unavailable, beginning or committing a batch fails with
    /// `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Remove every session whose inactive interval has elapsed at `now`.
    ///
    /// Returns the number of sessions removed.
    pub fn expire(&self, now: SystemTime) -> usize {
        let expired: Vec<ImmutableSession> = {
            let mut sessions = self.write_sessions();
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, record)| record.metadata.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();

            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|record| record.snapshot(&id)))
                .collect()
        };

        let count = expired.len();
        if count > 0 {
            debug!(count, "expired sessions removed");
        }
        self.notify(expired, ExpirationCause::Expired);
        count
    }

    /// Sweep expired sessions every `period` until the store is dropped.
    pub fn spawn_expiration_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "session expiration task started");

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.expire(SystemTime::now());
            }
            debug!("session expiration task stopped");
        })
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(SessionError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Pending>> {
        self.pending.lock().map_err(|_| SessionError::LockPoisoned)
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, sessions: Vec<ImmutableSession>, cause: ExpirationCause) {
        if sessions.is_empty() {
            return;
        }
        let listener = self
            .listener
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(listener) = listener else {
            trace!(count = sessions.len(), %cause, "no expiration listener installed");
            return;
        };
        for session in &sessions {
            listener.session_expired(session, cause);
        }
    }

    /// Remove a single session if it is still expired at `now`.
    fn expire_session(&self, id: &SessionId, now: SystemTime) {
        let expired = {
            let mut sessions = self.write_sessions();
            let still_expired = sessions
                .get(id)
                .is_some_and(|record| record.metadata.is_expired(now));
            if still_expired {
                sessions.remove(id).map(|record| record.snapshot(id))
            } else {
                None
            }
        };
        self.notify(expired.into_iter().collect(), ExpirationCause::Expired);
    }

    /// Apply `f` to the batch's view of a session.
    ///
    /// `Ok(None)` if the batch cannot see the session.
    fn view<R>(
        &self,
        id: &SessionId,
        batch: &Batch,
        f: impl FnOnce(&SessionRecord) -> R,
    ) -> Result<Option<R>> {
        let pending = self.lock_pending()?;
        match pending.batch(batch.id())?.get(id) {
            Some(Staged::Upsert { record, .. }) => Ok(Some(f(record))),
            Some(Staged::Removed { .. }) => Ok(None),
            None => {
                let now = SystemTime::now();
                let sessions = self.read_sessions();
                Ok(sessions
                    .get(id)
                    .filter(|record| !record.metadata.is_expired(now))
                    .map(f))
            }
        }
    }

    /// Apply `f` to the batch's private copy of a session, creating the copy
    /// from committed state on first write.
    fn stage<R>(
        &self,
        id: &SessionId,
        batch: &Batch,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Result<R> {
        let mut pending = self.lock_pending()?;
        let staged = pending
            .batches
            .get_mut(&batch.id())
            .ok_or_else(|| unknown_batch(batch.id()))?;

        if let Some(entry) = staged.get_mut(id) {
            return match entry {
                Staged::Upsert { record, .. } => Ok(f(record)),
                Staged::Removed { .. } => Err(SessionError::SessionRemoved(id.clone())),
            };
        }

        let now = SystemTime::now();
        let mut record = self
            .read_sessions()
            .get(id)
            .filter(|record| !record.metadata.is_expired(now))
            .cloned()
            .ok_or_else(|| SessionError::SessionRemoved(id.clone()))?;
        let result = f(&mut record);
        staged.insert(
            id.clone(),
            Staged::Upsert {
                record,
                created: false,
            },
        );
        Ok(result)
    }

    fn require<R>(id: &SessionId, value: Option<R>) -> Result<R> {
        value.ok_or_else(|| SessionError::SessionRemoved(id.clone()))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Transactional for InMemorySessionStore {
    fn begin(&self, batch: BatchId) -> Result<()> {
        self.check_available()?;
        let mut pending = self.lock_pending()?;
        if pending.batches.contains_key(&batch) {
            return Err(SessionError::InvalidBatchState(format!(
                "{batch} already begun"
            )));
        }
        pending.batches.insert(batch, HashMap::new());
        trace!(%batch, "store batch begun");
        Ok(())
    }

    fn commit(&self, batch: BatchId) -> Result<()> {
        self.check_available()?;

        let mut invalidated = Vec::new();
        {
            let mut pending = self.lock_pending()?;
            let staged = pending
                .batches
                .remove(&batch)
                .ok_or_else(|| unknown_batch(batch))?;
            pending.reserved.retain(|_, owner| *owner != batch);

            let changes = staged.len();
            let mut sessions = self.write_sessions();
            for (id, change) in staged {
                match change {
                    Staged::Upsert {
                        record,
                        created: true,
                    } => {
                        sessions.insert(id, record);
                    }
                    Staged::Upsert {
                        mut record,
                        created: false,
                    } => {
                        // Gone means expired or removed by another batch.
                        if let Some(current) = sessions.get_mut(&id) {
                            record.metadata.touch(current.metadata.last_accessed_at);
                            *current = record;
                        }
                    }
                    Staged::Removed { snapshot, created } => {
                        if created || sessions.remove(&id).is_some() {
                            invalidated.push(snapshot);
                        }
                    }
                }
            }
            trace!(%batch, changes, "store batch committed");
        }

        self.notify(invalidated, ExpirationCause::Invalidated);
        Ok(())
    }

    fn rollback(&self, batch: BatchId) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pending.batches.remove(&batch).is_none() {
            warn!(%batch, "rollback of batch unknown to store");
        }
        pending.reserved.retain(|_, owner| *owner != batch);
        trace!(%batch, "store batch rolled back");
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(
        &self,
        id: &SessionId,
        timeout: Duration,
        batch: &Batch,
    ) -> Result<SessionMetaData> {
        let mut pending = self.lock_pending()?;
        let Pending { batches, reserved } = &mut *pending;
        let staged = batches
            .get_mut(&batch.id())
            .ok_or_else(|| unknown_batch(batch.id()))?;

        if reserved.contains_key(id) || self.read_sessions().contains_key(id) {
            return Err(SessionError::IdentifierConflict(id.clone()));
        }

        let metadata = SessionMetaData::new(SystemTime::now(), timeout);
        staged.insert(
            id.clone(),
            Staged::Upsert {
                record: SessionRecord::new(metadata),
                created: true,
            },
        );
        reserved.insert(id.clone(), batch.id());
        Ok(metadata)
    }

    fn find_session(&self, id: &SessionId, batch: &Batch) -> Result<Option<SessionMetaData>> {
        let now = SystemTime::now();
        let mut expired = false;

        let found = {
            let mut pending = self.lock_pending()?;
            let staged = pending
                .batches
                .get_mut(&batch.id())
                .ok_or_else(|| unknown_batch(batch.id()))?;

            match staged.get_mut(id) {
                Some(Staged::Upsert { record, .. }) => {
                    let before = record.metadata;
                    record.metadata.touch(now);
                    Some(before)
                }
                Some(Staged::Removed { .. }) => None,
                None => {
                    let committed = self.read_sessions().get(id).cloned();
                    match committed {
                        Some(record) if record.metadata.is_expired(now) => {
                            expired = true;
                            None
                        }
                        Some(mut record) => {
                            let before = record.metadata;
                            record.metadata.touch(now);
                            staged.insert(
                                id.clone(),
                                Staged::Upsert {
                                    record,
                                    created: false,
                                },
                            );
                            Some(before)
                        }
                        None => None,
                    }
                }
            }
        };

        if expired {
            self.expire_session(id, now);
        }
        Ok(found)
    }

    fn remove_session(&self, id: &SessionId, batch: &Batch) -> Result<bool> {
        let mut pending = self.lock_pending()?;
        let staged = pending
            .batches
            .get_mut(&batch.id())
            .ok_or_else(|| unknown_batch(batch.id()))?;

        let removed = match staged.remove(id) {
            Some(Staged::Upsert { record, created }) => Staged::Removed {
                snapshot: record.snapshot(id),
                created,
            },
            Some(already @ Staged::Removed { .. }) => {
                staged.insert(id.clone(), already);
                return Ok(false);
            }
            None => {
                let now = SystemTime::now();
                let snapshot = self
                    .read_sessions()
                    .get(id)
                    .filter(|record| !record.metadata.is_expired(now))
                    .map(|record| record.snapshot(id));
                match snapshot {
                    Some(snapshot) => Staged::Removed {
                        snapshot,
                        created: false,
                    },
                    None => return Ok(false),
                }
            }
        };

        staged.insert(id.clone(), removed);
        Ok(true)
    }

    fn attribute(&self, id: &SessionId, name: &str, batch: &Batch) -> Result<Option<Value>> {
        let value = self.view(id, batch, |record| record.attributes.get(name).cloned())?;
        Self::require(id, value)
    }

    fn attribute_names(&self, id: &SessionId, batch: &Batch) -> Result<Vec<String>> {
        let names = self.view(id, batch, |record| {
            let mut names: Vec<String> = record.attributes.keys().cloned().collect();
            names.sort();
            names
        })?;
        Self::require(id, names)
    }

    fn set_attribute(
        &self,
        id: &SessionId,
        name: &str,
        value: Value,
        batch: &Batch,
    ) -> Result<Option<Value>> {
        self.stage(id, batch, |record| {
            record.attributes.insert(name.to_string(), value)
        })
    }

    fn remove_attribute(&self, id: &SessionId, name: &str, batch: &Batch) -> Result<Option<Value>> {
        self.stage(id, batch, |record| record.attributes.remove(name))
    }

    fn set_timeout(&self, id: &SessionId, timeout: Duration, batch: &Batch) -> Result<()> {
        self.stage(id, batch, |record| record.metadata.timeout = timeout)
    }

    fn snapshot(&self, id: &SessionId, batch: &Batch) -> Result<Option<ImmutableSession>> {
        self.view(id, batch, |record| record.snapshot(id))
    }

    fn set_expiration_listener(&self, listener: Arc<dyn ExpirationListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(listener);
    }

    fn session_count(&self) -> usize {
        self.read_sessions().len()
    }
}
