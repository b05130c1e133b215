//! Session statistics for a single node.
//!
//! Statistics are optional per deployment. When disabled the manager holds
//! [`Statistics::Disabled`] and queries report `None` instead of zeros.

mod active;
mod inactive;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub use active::ActiveSessionCounter;
pub use inactive::InactiveSessionStatistics;

use crate::listener::ExpirationCause;
use crate::session::ImmutableSession;
use inactive::duration_ms;

/// Aggregated counters for one deployment.
#[derive(Debug)]
pub struct SessionStatistics {
    active: Arc<ActiveSessionCounter>,
    inactive: InactiveSessionStatistics,
    created: AtomicU64,
    started_at_ms: AtomicU64,
}

impl SessionStatistics {
    /// Build statistics around the counter the manager uses for admission.
    pub fn new(active: Arc<ActiveSessionCounter>) -> Self {
        Self {
            active,
            inactive: InactiveSessionStatistics::new(),
            created: AtomicU64::new(0),
            started_at_ms: AtomicU64::new(epoch_ms(SystemTime::now())),
        }
    }

    /// Count a committed session creation.
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a session that ended at `now`.
    pub fn record_inactive(
        &self,
        session: &ImmutableSession,
        cause: ExpirationCause,
        now: SystemTime,
    ) {
        self.inactive.record(session, cause, now);
    }

    pub fn active_sessions(&self) -> usize {
        self.active.get()
    }

    pub fn created_sessions(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn inactive(&self) -> &InactiveSessionStatistics {
        &self.inactive
    }

    /// Time since the statistics were created or last reset.
    pub fn uptime(&self) -> Duration {
        let started = self.started_at_ms.load(Ordering::Relaxed);
        Duration::from_millis(epoch_ms(SystemTime::now()).saturating_sub(started))
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            active_sessions: self.active.get(),
            highest_active_sessions: self.active.highest(),
            max_active_sessions: self.active.max(),
            created_sessions: self.created_sessions(),
            expired_sessions: self.inactive.expired_count(),
            invalidated_sessions: self.inactive.invalidated_count(),
            max_session_alive_ms: duration_ms(self.inactive.max_alive_time()),
            average_session_alive_ms: duration_ms(self.inactive.average_alive_time()),
            uptime_ms: duration_ms(self.uptime()),
        }
    }

    /// Clear historical counters. The live active count is left alone.
    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.inactive.reset();
        self.active.reset_highest();
        self.started_at_ms
            .store(epoch_ms(SystemTime::now()), Ordering::Relaxed);
    }
}

/// Serializable view of [`SessionStatistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub active_sessions: usize,
    pub highest_active_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_active_sessions: Option<usize>,
    pub created_sessions: u64,
    pub expired_sessions: u64,
    pub invalidated_sessions: u64,
    pub max_session_alive_ms: u64,
    pub average_session_alive_ms: u64,
    pub uptime_ms: u64,
}

/// Statistics that are either collected or explicitly switched off.
#[derive(Debug, Clone)]
pub enum Statistics {
    Enabled(Arc<SessionStatistics>),
    Disabled,
}

impl Statistics {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn as_enabled(&self) -> Option<&Arc<SessionStatistics>> {
        match self {
            Self::Enabled(stats) => Some(stats),
            Self::Disabled => None,
        }
    }

    /// Snapshot, or `None` when statistics are disabled.
    pub fn snapshot(&self) -> Option<StatisticsSnapshot> {
        self.as_enabled().map(|stats| stats.snapshot())
    }
}

fn epoch_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}
