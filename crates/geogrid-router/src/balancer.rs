//! Round-robin selection counter.
//!
//! A single monotonically-increasing atomic counter shared across calls.
//! Lock-free and safe for concurrent access; the counter wraps around
//! the candidate count at selection time, so the pool may grow or
//! shrink between calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic round-robin counter selecting indices into a candidate list.
pub struct RoundRobinBalancer {
    counter: AtomicU64,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Select the next index, wrapping around `count`.
    ///
    /// Returns `None` if count is zero.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        Some((idx % count as u64) as usize)
    }

    /// Current counter value (for diagnostics).
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}
