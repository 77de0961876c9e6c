//! Promotion gate.
//!
//! Pure decision logic: no I/O happens here. The engine gathers the age,
//! advisory status and concerns, then acts on the returned [`Decision`].

use std::fmt;

use chrono::Duration;

use crate::model::{ErrataGate, Feeder};

/// How much weight a concern carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks promotion even when the gate is open.
    Fatal,
    /// Reported alongside the decision, never blocking on its own.
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcernKind {
    RiskContinuity,
    Reachability,
    InvalidVersion,
}

/// A problem found while evaluating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concern {
    pub kind: ConcernKind,
    pub severity: Severity,
    pub message: String,
}

impl Concern {
    pub fn fatal(kind: ConcernKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Fatal,
            message: message.into(),
        }
    }

    pub fn advisory(kind: ConcernKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Advisory,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Promote,
    Wait,
    Blocked(String),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Promote => "promote",
            Decision::Wait => "wait",
            Decision::Blocked(_) => "blocked",
        }
    }
}

/// Whether the delay or the errata condition allows promotion.
///
/// The delay must be strictly exceeded. With no delay and no public advisory
/// the gate stays closed.
pub fn gate_open(age: Duration, delay: Option<Duration>, errata_public: bool) -> bool {
    delay.is_some_and(|delay| age > delay) || errata_public
}

/// [`gate_open`] using a feeder's settings. The advisory only counts when
/// the feeder asks for it.
pub fn feeder_gate_open(feeder: &Feeder, age: Duration, errata_public: bool) -> bool {
    gate_open(
        age,
        feeder.delay.as_ref().map(|d| d.duration()),
        feeder.errata == ErrataGate::Public && errata_public,
    )
}

/// Combine the gate with the concerns. Any fatal concern blocks.
pub fn decide(open: bool, concerns: &[Concern]) -> Decision {
    let fatal: Vec<&str> = concerns
        .iter()
        .filter(|c| c.is_fatal())
        .map(|c| c.message.as_str())
        .collect();
    if !fatal.is_empty() {
        return Decision::Blocked(fatal.join(" "));
    }
    if open {
        Decision::Promote
    } else {
        Decision::Wait
    }
}

/// Render a duration the way promotion messages show elapsed time,
/// e.g. `2 days, 3:04:05`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds();
    let (sign, total) = if total < 0 { ("-", -total) } else { ("", total) };
    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => format!("{sign}{clock}"),
        1 => format!("{sign}1 day, {clock}"),
        n => format!("{sign}{n} days, {clock}"),
    }
}
