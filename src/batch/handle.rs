//! Transactional batch handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use super::context::ContextId;
use crate::error::SessionError;
use crate::Result;

/// Global counter for batch ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a batch within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    fn next() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create a BatchId from a raw u64 value.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{:08x}", self.0)
    }
}

/// Store-level transaction primitives a batch is driven through.
pub trait Transactional: Send + Sync {
    /// Start tracking changes made under `batch`.
    fn begin(&self, batch: BatchId) -> Result<()>;

    /// Make every change staged under `batch` visible to other batches.
    fn commit(&self, batch: BatchId) -> Result<()>;

    /// Discard every change staged under `batch`. Must not fail.
    fn rollback(&self, batch: BatchId);
}

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Bound to exactly one calling context.
    Active,
    /// Open but not bound to any context.
    Suspended,
    /// Closed, changes applied.
    Committed,
    /// Closed, changes discarded.
    RolledBack,
}

impl BatchState {
    /// Check if this is a terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, BatchState::Committed | BatchState::RolledBack)
    }
}

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed,
    RolledBack,
}

type CompletionCallback = Box<dyn FnOnce(BatchOutcome) + Send>;

struct Status {
    state: BatchState,
    owner: Option<ContextId>,
    rollback_only: bool,
    callbacks: Vec<CompletionCallback>,
}

struct Inner {
    id: BatchId,
    tx: Arc<dyn Transactional>,
    status: Mutex<Status>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let status = self.status.get_mut().unwrap_or_else(PoisonError::into_inner);
        if status.state.is_closed() {
            return;
        }
        error!(batch = %self.id, state = ?status.state, "open batch abandoned, rolling back");
        status.state = BatchState::RolledBack;
        self.tx.rollback(self.id);
        for callback in status.callbacks.drain(..) {
            callback(BatchOutcome::RolledBack);
        }
    }
}

/// A transactional unit of work scoping session reads and writes.
///
/// `Batch` is a shared handle: clones refer to the same unit of work. A batch
/// is bound to at most one [`BatchContext`](super::BatchContext) at a time;
/// binding moves only through [`Batcher`](super::Batcher) suspend/resume.
/// Dropping the last handle of a batch that is still open rolls it back.
#[derive(Clone)]
pub struct Batch {
    inner: Arc<Inner>,
}

impl Batch {
    /// Begin a new batch, active in `owner`.
    pub(crate) fn begin(tx: Arc<dyn Transactional>, owner: ContextId) -> Result<Self> {
        let id = BatchId::next();
        tx.begin(id)?;
        debug!(batch = %id, context = owner, "batch started");
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                tx,
                status: Mutex::new(Status {
                    state: BatchState::Active,
                    owner: Some(owner),
                    rollback_only: false,
                    callbacks: Vec::new(),
                }),
            }),
        })
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the batch identifier.
    pub fn id(&self) -> BatchId {
        self.inner.id
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> BatchState {
        self.status().state
    }

    /// Check if the batch is bound to a context.
    pub fn is_active(&self) -> bool {
        self.state() == BatchState::Active
    }

    /// Check if the batch has been committed or rolled back.
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Mark the batch rollback-only: a later [`close`](Self::close) rolls back.
    pub fn discard(&self) {
        self.status().rollback_only = true;
    }

    /// Check if the batch has been marked rollback-only.
    pub fn is_discarded(&self) -> bool {
        self.status().rollback_only
    }

    /// Register a callback invoked exactly once when the batch closes.
    ///
    /// If the batch is already closed the callback runs immediately.
    pub fn on_completion(&self, callback: impl FnOnce(BatchOutcome) + Send + 'static) {
        let mut status = self.status();
        let outcome = match status.state {
            BatchState::Committed => BatchOutcome::Committed,
            BatchState::RolledBack => BatchOutcome::RolledBack,
            BatchState::Active | BatchState::Suspended => {
                status.callbacks.push(Box::new(callback));
                return;
            }
        };
        drop(status);
        callback(outcome);
    }

    /// Close the batch, committing its changes unless it was discarded.
    ///
    /// Closing a closed batch does nothing. If the commit fails the batch is
    /// rolled back and the error returned.
    pub fn close(&self) -> Result<()> {
        let mut status = self.status();
        if status.state.is_closed() {
            return Ok(());
        }
        if status.rollback_only {
            drop(status);
            self.rollback();
            return Ok(());
        }
        status.state = BatchState::Committed;
        status.owner = None;
        let callbacks = std::mem::take(&mut status.callbacks);
        drop(status);

        let id = self.id();
        match self.inner.tx.commit(id) {
            Ok(()) => {
                debug!(batch = %id, "batch committed");
                Self::complete(callbacks, BatchOutcome::Committed);
                Ok(())
            }
            Err(e) => {
                error!(batch = %id, error = %e, "batch commit failed, rolling back");
                self.status().state = BatchState::RolledBack;
                self.inner.tx.rollback(id);
                Self::complete(callbacks, BatchOutcome::RolledBack);
                Err(e)
            }
        }
    }

    /// Roll the batch back. Rolling back a closed batch does nothing.
    pub fn rollback(&self) {
        let mut status = self.status();
        if status.state.is_closed() {
            return;
        }
        status.state = BatchState::RolledBack;
        status.owner = None;
        let callbacks = std::mem::take(&mut status.callbacks);
        drop(status);

        self.inner.tx.rollback(self.id());
        debug!(batch = %self.id(), "batch rolled back");
        Self::complete(callbacks, BatchOutcome::RolledBack);
    }

    fn complete(callbacks: Vec<CompletionCallback>, outcome: BatchOutcome) {
        for callback in callbacks {
            callback(outcome);
        }
    }

    /// Fail unless the batch is still open.
    pub fn ensure_open(&self) -> Result<()> {
        let state = self.state();
        if state.is_closed() {
            Err(SessionError::InvalidBatchState(format!(
                "{} is already {:?}",
                self.id(),
                state
            )))
        } else {
            Ok(())
        }
    }

    /// Bind the batch to `context`.
    ///
    /// Succeeds if the batch is suspended or already bound to `context`.
    /// Leaves the batch untouched on failure.
    pub(crate) fn activate(&self, context: ContextId) -> Result<()> {
        let mut status = self.status();
        match (status.state, status.owner) {
            (BatchState::Active, Some(owner)) if owner == context => Ok(()),
            (BatchState::Active, _) => Err(SessionError::ConcurrencyConflict { batch: self.id() }),
            (BatchState::Suspended, _) => {
                status.state = BatchState::Active;
                status.owner = Some(context);
                Ok(())
            }
            (state, _) => Err(SessionError::InvalidBatchState(format!(
                "cannot resume {} in state {:?}",
                self.id(),
                state
            ))),
        }
    }

    /// Unbind the batch from `context`. Returns false if it was not bound there.
    pub(crate) fn suspend(&self, context: ContextId) -> bool {
        let mut status = self.status();
        if status.state == BatchState::Active && status.owner == Some(context) {
            status.state = BatchState::Suspended;
            status.owner = None;
            true
        } else {
            false
        }
    }

    /// The context the batch is currently bound to.
    pub(crate) fn owner(&self) -> Option<ContextId> {
        self.status().owner
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Batch {}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("Batch")
            .field("id", &self.inner.id)
            .field("state", &status.state)
            .field("owner", &status.owner)
            .field("rollback_only", &status.rollback_only)
            .finish()
    }
}
