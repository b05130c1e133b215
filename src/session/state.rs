//! Session lifecycle as observed by the manager.

use serde::Serialize;

/// Represents the lifecycle state of a web session.
///
/// The store owns the session; this state only records what the manager
/// has observed through a [`Session`](super::Session) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session was created in the current batch.
    #[default]
    Created,
    /// Session existed before the current batch and has been accessed.
    Active,
    /// Inactive interval elapsed without access.
    Expired,
    /// Session was explicitly invalidated.
    Invalidated,
    /// Session record has been deleted. Terminal.
    Removed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Active
    /// - Created -> Invalidated
    /// - Active -> Active (repeated access)
    /// - Active -> Expired
    /// - Active -> Invalidated
    /// - Expired -> Removed
    /// - Invalidated -> Removed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Created, Active)
                | (Created, Invalidated)
                | (Active, Active)
                | (Active, Expired)
                | (Active, Invalidated)
                | (Expired, Removed)
                | (Invalidated, Removed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::SessionError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Removed)
    }

    /// Check if the session can still be read or written.
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionState::Created | SessionState::Active)
    }
}
