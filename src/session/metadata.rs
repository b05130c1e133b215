//! Session metadata and immutable snapshots.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::SessionId;

/// Timing information tracked for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetaData {
    /// Time the session was created.
    pub created_at: SystemTime,
    /// Time of the last request that accessed the session.
    pub last_accessed_at: SystemTime,
    /// Maximum inactive interval. Zero means the session never expires.
    pub timeout: Duration,
}

impl SessionMetaData {
    /// Metadata for a session created at `now`.
    pub fn new(now: SystemTime, timeout: Duration) -> Self {
        Self {
            created_at: now,
            last_accessed_at: now,
            timeout,
        }
    }

    /// Check if the session has not been accessed since it was created.
    pub fn is_new(&self) -> bool {
        self.created_at == self.last_accessed_at
    }

    /// Check if the inactive interval has elapsed at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        if self.timeout.is_zero() {
            return false;
        }
        now.duration_since(self.last_accessed_at)
            .map(|idle| idle >= self.timeout)
            .unwrap_or(false)
    }

    /// Time remaining before expiration, or `None` if the session never expires.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        if self.timeout.is_zero() {
            return None;
        }
        let idle = now
            .duration_since(self.last_accessed_at)
            .unwrap_or(Duration::ZERO);
        Some(self.timeout.saturating_sub(idle))
    }

    /// How long the session has existed at `now`.
    pub fn alive_time(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or(Duration::ZERO)
    }

    /// Record an access at `now`.
    pub fn touch(&mut self, now: SystemTime) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }
}

/// Read-only copy of a session, handed to listeners when the session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableSession {
    pub id: SessionId,
    pub metadata: SessionMetaData,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ImmutableSession {
    pub fn new(
        id: SessionId,
        metadata: SessionMetaData,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            metadata,
            attributes,
        }
    }

    /// Get a single attribute value.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}
