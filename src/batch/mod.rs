//! Transactional batches and their binding to calling contexts.
//!
//! A [`Batch`] scopes session reads and writes to one commit/rollback
//! boundary. The [`Batcher`] creates batches and moves them between
//! [`BatchContext`]s with suspend/resume; [`BatchScope`] guarantees the
//! previous binding is restored on every exit path.

mod batcher;
mod context;
mod handle;

pub use batcher::{BatchScope, Batcher};
pub use context::BatchContext;
pub use handle::{Batch, BatchId, BatchOutcome, BatchState, Transactional};

#[cfg(test)]
pub(crate) use handle::tests::RecordingTx;
