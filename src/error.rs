//! Error types for the distributable session manager.

use thiserror::Error;

use crate::batch::BatchId;
use crate::session::SessionId;

/// Main error type for session manager and batch operations.
///
/// A lookup miss is not represented here: operations that can miss return
/// `Ok(None)`.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session with the given ID already exists (or is being created).
    #[error("session identifier already in use: {0}")]
    IdentifierConflict(SessionId),

    /// The batch is already active in another calling context.
    #[error("batch {batch} is already active in another context")]
    ConcurrencyConflict { batch: BatchId },

    /// Suspend/resume/close misuse, or use of a handle whose batch is closed.
    #[error("invalid batch state: {0}")]
    InvalidBatchState(String),

    /// Creating another session would exceed the configured maximum.
    #[error("maximum active sessions exceeded: {max}")]
    MaxSessionsExceeded { max: usize },

    /// The session behind a live handle no longer exists in its batch.
    #[error("session no longer exists: {0}")]
    SessionRemoved(SessionId),

    /// Invalid session lifecycle transition attempted.
    #[error("invalid session state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// The backing store could not service the request.
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    /// The supplied string is not a valid session identifier.
    #[error("invalid session identifier: {0:?}")]
    InvalidSessionId(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the caller may reasonably retry the failed operation.
    ///
    /// Identifier conflicts are retried with a fresh identifier; batch
    /// misuse is a programming error and never retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IdentifierConflict(_)
                | Self::ConcurrencyConflict { .. }
                | Self::MaxSessionsExceeded { .. }
                | Self::StoreUnavailable(_)
        )
    }

    /// Whether the operation was refused before it staged any change, so the
    /// surrounding batch is still safe to commit.
    pub(crate) fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::IdentifierConflict(_)
                | Self::MaxSessionsExceeded { .. }
                | Self::InvalidSessionId(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for SessionError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

/// Convenience Result type for session manager operations.
pub type Result<T> = std::result::Result<T, SessionError>;
