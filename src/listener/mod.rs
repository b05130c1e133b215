//! Session lifecycle notifications.
//!
//! The store reports ended sessions through an [`ExpirationListener`]. The
//! manager installs [`ManagerExpirationListener`], which keeps statistics and
//! the active-session count in step and fans events out to the application's
//! [`SessionListener`]s.

mod expiration;
mod registry;

use std::fmt;

use serde::Serialize;

pub use expiration::ManagerExpirationListener;
pub use registry::{SessionListener, SessionListeners};

use crate::session::ImmutableSession;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationCause {
    /// The inactive interval elapsed.
    Expired,
    /// The session was removed explicitly.
    Invalidated,
}

impl fmt::Display for ExpirationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Invalidated => write!(f, "invalidated"),
        }
    }
}

/// Receives every session the store removes, exactly once per session.
///
/// Called after the store has released its locks; implementations may call
/// back into the store.
pub trait ExpirationListener: Send + Sync {
    fn session_expired(&self, session: &ImmutableSession, cause: ExpirationCause);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_display() {
        assert_eq!(ExpirationCause::Expired.to_string(), "expired");
        assert_eq!(ExpirationCause::Invalidated.to_string(), "invalidated");
    }

    #[test]
    fn test_cause_serialization() {
        let json = serde_json::to_string(&ExpirationCause::Invalidated).unwrap();
        assert_eq!(json, "\"invalidated\"");
    }
}
