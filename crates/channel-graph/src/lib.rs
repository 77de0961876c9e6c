//! Channel-Graph: channel model, promotion gate and update-graph audits
//!
//! Loads channel definitions into a graph of feeder relationships, decides
//! which feeder versions are ready to promote, and checks that promotions
//! keep declared risks and update paths intact.
//!
//! ## Layer 2 - Promotion logic
//!
//! - `semver`: version parsing and ordering
//! - `model`: channels, feeders, candidates
//! - `risk`: blocked-edge validation and the risk index
//! - `update_graph`: observed update graphs and the per-pass cache
//! - `gate`, `continuity`, `reachability`, `connectivity`: per-candidate and
//!   per-channel checks
//! - `engine`: the pass driver

pub mod connectivity;
pub mod continuity;
pub mod engine;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod reachability;
pub mod risk;
pub mod semver;
pub mod telemetry;
pub mod update_graph;

pub use connectivity::{audit_connectivity, classify, Connectivity, ConnectivityReport, Exemptions};
pub use continuity::{check_continuity, continuity_violations, previous_version};
pub use engine::{
    CandidateReport, Collaborators, EngineConfig, Outcome, PassReport, PromotionEngine,
    ValidationReport,
};
pub use error::{PromoterError, Result};
pub use gate::{decide, feeder_gate_open, gate_open, Concern, ConcernKind, Decision, Severity};
pub use model::{
    split_channel_name, Candidates, Channel, ChannelGraph, Delay, ErrataGate, Feeder, CHANNEL_ORDER,
};
pub use reachability::{check_reachability, path_to_line, reaches_line};
pub use risk::{validate_blocked_edge, RiskAnnotation, RiskIndex};
pub use semver::{compare, major_minor, ReleaseLine, Version};
pub use telemetry::init_tracing;
pub use update_graph::{Edge, GraphCache, UpdateGraph};
