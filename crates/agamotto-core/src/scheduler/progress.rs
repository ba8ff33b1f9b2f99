//! Run progress counters

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Scenarios in the run
    pub total: usize,
    /// Scenarios finished (either way)
    pub completed: usize,
    /// Scenarios that produced metrics
    pub succeeded: usize,
    /// Scenarios that failed
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Scenarios not yet finished
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// Lock-free progress shared by all lanes
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressTracker {
    /// Create a tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting a new run
    pub fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.succeeded.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
    }

    /// Record a finished scenario, returning the completed count
    pub fn record(&self, success: bool) -> usize {
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current counters
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}
