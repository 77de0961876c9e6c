//! Global atomic counters for promotion passes.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit the current values as one `tracing::info!`
//! event at the end of a pass.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    promoted: AtomicU64,
    waiting: AtomicU64,
    blocked: AtomicU64,
    failed: AtomicU64,
    graph_fetches: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            promoted: AtomicU64::new(0),
            waiting: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            graph_fetches: AtomicU64::new(0),
        }
    }

    pub fn inc_promoted(&self) {
        self.promoted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "promoted", "counter incremented");
    }

    pub fn inc_waiting(&self) {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "waiting", "counter incremented");
    }

    pub fn inc_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "blocked", "counter incremented");
    }

    /// Candidates whose evaluation errored, as opposed to being blocked.
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "failed", "counter incremented");
    }

    /// Counts remote graph retrievals, not cache hits.
    pub fn inc_graph_fetches(&self) {
        self.graph_fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "graph_fetches", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            promoted = self.promoted(),
            waiting = self.waiting(),
            blocked = self.blocked(),
            failed = self.failed(),
            graph_fetches = self.graph_fetches(),
        );
    }

    pub fn promoted(&self) -> u64 {
        self.promoted.load(Ordering::Relaxed)
    }

    pub fn waiting(&self) -> u64 {
        self.waiting.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn graph_fetches(&self) -> u64 {
        self.graph_fetches.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.promoted.store(0, Ordering::Relaxed);
        self.waiting.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.graph_fetches.store(0, Ordering::Relaxed);
    }
}
