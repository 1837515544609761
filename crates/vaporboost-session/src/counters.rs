//! Run-wide counters shared by all sessions.

use std::sync::atomic::{AtomicU64, Ordering};

use vaporboost_core::CounterSnapshot;

/// Monotonic counters for the current run.
#[derive(Debug, Default)]
pub struct RunCounters {
    messages_received: AtomicU64,
    reconnections: AtomicU64,
    errors: AtomicU64,
}

impl RunCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
