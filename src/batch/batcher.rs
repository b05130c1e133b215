//! Batch coordination: create, suspend and resume batches per context.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use super::{Batch, BatchContext, Transactional};
use crate::error::SessionError;
use crate::Result;

/// Creates batches and moves them between calling contexts.
///
/// At most one batch is active per [`BatchContext`]. Suspend/resume pairs
/// nest like a stack; [`BatchScope`] enforces the order at release time.
#[derive(Clone)]
pub struct Batcher {
    tx: Arc<dyn Transactional>,
}

impl Batcher {
    /// Create a batcher driving batches through the given store primitives.
    pub fn new(tx: Arc<dyn Transactional>) -> Self {
        Self { tx }
    }

    /// Start a new batch and bind it to `ctx`.
    ///
    /// Fails with `InvalidBatchState` if `ctx` already has an open batch;
    /// batches do not nest.
    pub fn create_batch(&self, ctx: &BatchContext) -> Result<Batch> {
        let mut slot = ctx.slot();
        if let Some(current) = slot.active.as_ref().filter(|b| !b.is_closed()) {
            return Err(SessionError::InvalidBatchState(format!(
                "{} is already active in this context",
                current.id()
            )));
        }

        let batch = Batch::begin(Arc::clone(&self.tx), ctx.id())?;
        slot.active = Some(batch.clone());
        Ok(batch)
    }

    /// The open batch bound to `ctx`, if any.
    pub fn current_batch(&self, ctx: &BatchContext) -> Option<Batch> {
        ctx.active_batch()
    }

    /// Detach the active batch from `ctx`.
    ///
    /// Returns `None` if no open batch was bound. The returned batch stays
    /// open and can be resumed later, by this or any other context.
    pub fn suspend_batch(&self, ctx: &BatchContext) -> Option<Batch> {
        let mut slot = ctx.slot();
        let batch = slot.active.take()?;
        if batch.is_closed() {
            return None;
        }
        batch.suspend(ctx.id());
        debug!(batch = %batch.id(), "batch suspended");
        Some(batch)
    }

    /// Bind `batch` (or nothing) as the active batch of `ctx`.
    ///
    /// Whatever batch was active in `ctx` is suspended first and restored
    /// when the returned scope is released. On failure neither `ctx` nor
    /// `batch` is changed:
    ///
    /// - `ConcurrencyConflict` if `batch` is active in another context;
    /// - `InvalidBatchState` if `batch` is closed.
    pub fn resume_batch(&self, ctx: &BatchContext, batch: Option<Batch>) -> Result<BatchScope> {
        let mut slot = ctx.slot();
        if let Some(target) = &batch {
            target.activate(ctx.id())?;
        }

        let prior = slot.active.take().filter(|b| !b.is_closed());
        if let Some(prior) = &prior {
            if Some(prior) != batch.as_ref() {
                prior.suspend(ctx.id());
            }
        }

        slot.active = batch.clone();
        slot.depth += 1;
        debug!(
            resumed = ?batch.as_ref().map(Batch::id),
            suspended = ?prior.as_ref().map(Batch::id),
            depth = slot.depth,
            "batch scope entered"
        );

        Ok(BatchScope {
            ctx: ctx.clone(),
            prior,
            resumed: batch,
            depth: slot.depth,
            released: false,
        })
    }
}

impl fmt::Debug for Batcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher").finish_non_exhaustive()
    }
}

/// Scoped binding of a resumed batch to a context.
///
/// Releasing the scope, explicitly through [`exit`](Self::exit) or
/// implicitly on drop (including unwinding):
///
/// 1. checks that no scope opened later on the same context is still open;
/// 2. rolls back any open batch created inside the scope and left bound;
/// 3. suspends the resumed batch again if it is still open;
/// 4. re-binds the batch that was active before the scope was entered.
#[must_use = "dropping the scope immediately restores the previous batch"]
pub struct BatchScope {
    ctx: BatchContext,
    prior: Option<Batch>,
    resumed: Option<Batch>,
    depth: usize,
    released: bool,
}

impl BatchScope {
    /// The batch this scope resumed.
    pub fn batch(&self) -> Option<&Batch> {
        self.resumed.as_ref()
    }

    /// The context this scope is bound to.
    pub fn context(&self) -> &BatchContext {
        &self.ctx
    }

    /// Release the scope, reporting misuse instead of only logging it.
    ///
    /// An out-of-order release fails and leaves the scope open, so it can
    /// still be released once the scopes entered after it are gone.
    /// Releasing a released scope does nothing.
    pub fn exit(&mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        let mut slot = self.ctx.slot();
        if slot.depth != self.depth {
            return Err(SessionError::InvalidBatchState(format!(
                "batch scope released out of order: scope depth {}, context depth {}",
                self.depth, slot.depth
            )));
        }
        self.released = true;
        slot.depth -= 1;

        let mut leaked = None;
        if let Some(current) = slot.active.take().filter(|b| !b.is_closed()) {
            if Some(&current) == self.resumed.as_ref() {
                current.suspend(self.ctx.id());
            } else if Some(&current) != self.prior.as_ref() {
                leaked = Some(current);
            }
        }

        let restored = match self.prior.take() {
            Some(prior) if !prior.is_closed() => {
                prior.activate(self.ctx.id()).map(|()| Some(prior))
            }
            _ => Ok(None),
        };
        let result = match restored {
            Ok(prior) => {
                slot.active = prior;
                Ok(())
            }
            Err(e) => Err(e),
        };
        debug!(depth = slot.depth, "batch scope released");
        drop(slot);

        if let Some(batch) = leaked {
            error!(
                batch = %batch.id(),
                "batch still open at end of scope, forcing rollback"
            );
            batch.rollback();
        }
        result
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!(error = %e, "failed to release batch scope");
        }
    }
}

impl fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScope")
            .field("prior", &self.prior.as_ref().map(Batch::id))
            .field("resumed", &self.resumed.as_ref().map(Batch::id))
            .field("depth", &self.depth)
            .field("released", &self.released)
            .finish()
    }
}
