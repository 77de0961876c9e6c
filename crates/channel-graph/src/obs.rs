//! Structured lifecycle events for promotion passes.
//!
//! - `PassSpan` RAII guard tagging everything logged during one pass
//! - emission helpers for pass start, per-candidate decisions, candidate
//!   errors, and pass completion

use tracing::{info, warn};

/// RAII guard that enters a pass-scoped span.
///
/// ```ignore
/// let _span = PassSpan::enter(3);
/// // every event now carries pass = 3
/// ```
pub struct PassSpan {
    _span: tracing::span::EnteredSpan,
}

impl PassSpan {
    pub fn enter(pass: u64) -> Self {
        let span = tracing::info_span!("promoter.pass", pass = pass);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: pass started over `channels` channels.
pub fn emit_pass_started(channels: usize, blocked_edges: usize) {
    info!(
        event = "pass.started",
        channels = channels,
        blocked_edges = blocked_edges
    );
}

/// Emit event: one candidate decided.
pub fn emit_decision(channel: &str, version: &str, decision: &str, detail: &str) {
    info!(
        event = "candidate.decided",
        channel = %channel,
        version = %version,
        decision = %decision,
        detail = %detail,
    );
}

/// Emit event: a candidate failed during history lookup or promotion.
pub fn emit_candidate_error(channel: &str, version: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "candidate.error",
        channel = %channel,
        version = %version,
        error = %error,
    );
}

/// Emit event: pass finished.
pub fn emit_pass_finished(
    duration_ms: u64,
    promoted: usize,
    waiting: usize,
    blocked: usize,
    failed: usize,
) {
    info!(
        event = "pass.finished",
        duration_ms = duration_ms,
        promoted = promoted,
        waiting = waiting,
        blocked = blocked,
        failed = failed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_span_create() {
        let _span = PassSpan::enter(1);
        emit_pass_started(0, 0);
        emit_pass_finished(0, 0, 0, 0, 0);
    }
}
