//! Statistics about sessions that have ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::listener::ExpirationCause;
use crate::session::ImmutableSession;

/// Counters describing expired and invalidated sessions on this node.
#[derive(Debug, Default)]
pub struct InactiveSessionStatistics {
    expired: AtomicU64,
    invalidated: AtomicU64,
    max_alive_ms: AtomicU64,
    total_alive_ms: AtomicU64,
}

impl InactiveSessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session that ended at `now`.
    pub fn record(&self, session: &ImmutableSession, cause: ExpirationCause, now: SystemTime) {
        let alive_ms = duration_ms(session.metadata.alive_time(now));

        self.expired.fetch_add(1, Ordering::Relaxed);
        if cause == ExpirationCause::Invalidated {
            self.invalidated.fetch_add(1, Ordering::Relaxed);
        }
        self.total_alive_ms.fetch_add(alive_ms, Ordering::Relaxed);
        self.max_alive_ms.fetch_max(alive_ms, Ordering::Relaxed);
    }

    /// Sessions that ended for any reason, invalidation included.
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// The subset of [`expired_count`](Self::expired_count) that ended
    /// through explicit invalidation.
    pub fn invalidated_count(&self) -> u64 {
        self.invalidated.load(Ordering::Relaxed)
    }

    /// Longest lifetime of any ended session.
    pub fn max_alive_time(&self) -> Duration {
        Duration::from_millis(self.max_alive_ms.load(Ordering::Relaxed))
    }

    /// Mean lifetime of ended sessions, zero if none ended yet.
    pub fn average_alive_time(&self) -> Duration {
        let ended = self.expired_count();
        if ended == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_alive_ms.load(Ordering::Relaxed) / ended)
    }

    pub fn reset(&self) {
        self.expired.store(0, Ordering::Relaxed);
        self.invalidated.store(0, Ordering::Relaxed);
        self.max_alive_ms.store(0, Ordering::Relaxed);
        self.total_alive_ms.store(0, Ordering::Relaxed);
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
