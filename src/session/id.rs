//! Session identifier type.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Longest identifier accepted from clients.
const MAX_ID_LEN: usize = 256;

/// Produces fresh session identifiers.
///
/// Supplied by the deployment; the manager never assumes anything about
/// the shape of the identifiers beyond [`SessionId`] validation.
pub type IdentifierFactory = Arc<dyn Fn() -> SessionId + Send + Sync>;

/// Unique identifier for a web session.
///
/// Identifiers are opaque strings. Generated identifiers are random UUIDs
/// rendered without hyphens; identifiers supplied by clients only need to be
/// non-empty, at most 256 characters and free of whitespace and control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Generate a new random session ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string().into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), SessionError> {
        let valid = !s.is_empty()
            && s.len() <= MAX_ID_LEN
            && !s.chars().any(|c| c.is_whitespace() || c.is_control());
        if valid {
            Ok(())
        } else {
            Err(SessionError::InvalidSessionId(s.into()))
        }
    }
}

/// The default identifier factory, backed by [`SessionId::generate`].
pub fn default_identifier_factory() -> IdentifierFactory {
    Arc::new(SessionId::generate)
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.into()))
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(Self(value.into()))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
