//! Explicit calling context carrying the active-batch slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use super::Batch;

/// Identifier of a calling context.
pub(crate) type ContextId = u64;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// The active-batch slot of one context.
pub(crate) struct Slot {
    /// Batch bound to the context, if any. May hold a batch that has since
    /// been closed; readers treat that as empty.
    pub(crate) active: Option<Batch>,
    /// Number of open [`BatchScope`](super::BatchScope)s.
    pub(crate) depth: usize,
}

struct ContextInner {
    id: ContextId,
    slot: Mutex<Slot>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(batch) = slot.active.take() {
            if !batch.is_closed() && batch.owner() == Some(self.id) {
                error!(
                    batch = %batch.id(),
                    context = self.id,
                    "context ended with an open batch, rolling back"
                );
                batch.rollback();
            }
        }
    }
}

/// A logical unit of request processing that may have one active batch.
///
/// Contexts are passed explicitly through the call chain instead of being
/// looked up from thread-local state: every request (or task) owns one, and
/// every [`Batcher`](super::Batcher) operation names the context it acts on.
/// Clones share the same slot, so a context can move across `.await` points
/// and threads together with the request it belongs to.
///
/// When the last clone is dropped while the context still owns an open
/// batch, that batch is rolled back and an error is logged.
#[derive(Clone)]
pub struct BatchContext {
    inner: Arc<ContextInner>,
}

impl BatchContext {
    /// Create a new context with no active batch.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
                slot: Mutex::new(Slot {
                    active: None,
                    depth: 0,
                }),
            }),
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        self.inner.id
    }

    pub(crate) fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The open batch currently bound to this context.
    pub fn active_batch(&self) -> Option<Batch> {
        self.slot()
            .active
            .as_ref()
            .filter(|batch| !batch.is_closed())
            .cloned()
    }

    /// Number of resume scopes currently open on this context.
    pub fn depth(&self) -> usize {
        self.slot().depth
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for BatchContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for BatchContext {}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot();
        f.debug_struct("BatchContext")
            .field("id", &self.inner.id)
            .field("active", &slot.active.as_ref().map(Batch::id))
            .field("depth", &slot.depth)
            .finish()
    }
}
