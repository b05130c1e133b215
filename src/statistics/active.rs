//! Bounded active-session counter.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SessionError;
use crate::Result;

/// Lock-free count of live sessions with an optional upper bound.
///
/// The bound check and the increment happen in one compare-and-swap, so
/// concurrent creations can never push the count past the maximum.
#[derive(Debug)]
pub struct ActiveSessionCounter {
    count: AtomicUsize,
    highest: AtomicUsize,
    max: Option<usize>,
}

impl ActiveSessionCounter {
    /// Create a counter. `None` means unbounded.
    pub fn new(max: Option<usize>) -> Self {
        Self {
            count: AtomicUsize::new(0),
            highest: AtomicUsize::new(0),
            max,
        }
    }

    /// Take one slot, returning the new count.
    ///
    /// Fails with `MaxSessionsExceeded` if the counter is at its bound.
    pub fn try_acquire(&self) -> Result<usize> {
        let max = self.max;
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => current.checked_add(1),
            })
            .map_err(|_| SessionError::MaxSessionsExceeded {
                max: max.unwrap_or(usize::MAX),
            })?;

        let current = previous + 1;
        self.highest.fetch_max(current, Ordering::Relaxed);
        Ok(current)
    }

    /// Give one slot back. Never drops below zero.
    pub fn release(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
    }

    /// Current number of live sessions.
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Highest count observed since creation or the last reset.
    pub fn highest(&self) -> usize {
        self.highest.load(Ordering::Relaxed)
    }

    /// Configured bound.
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Reset the high-water mark to the current count.
    pub fn reset_highest(&self) {
        self.highest.store(self.get(), Ordering::Relaxed);
    }
}
