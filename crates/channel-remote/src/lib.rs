//! Channel-Remote: remote collaborators for the channel promoter
//!
//! HTTP clients for the update-graph service, errata advisories, GitHub pull
//! requests and chat webhooks, each behind an async trait so the promotion
//! engine can be driven by in-memory fakes.
//!
//! ## Layer 1 - Remote I/O
//!
//! - `GraphService` / `HttpGraphService`: update graphs with bounded retries
//! - `AdvisoryProbe` / `HttpAdvisoryProbe`: errata publication status
//! - `PullRequests` / `GitHubPullRequests`: promotion pull requests
//! - `Notifier` / `WebhookNotifier` / `StdoutNotifier`: notifications

pub mod advisory;
mod error;
pub mod fakes;
pub mod graph;
pub mod notify;
pub mod pulls;
pub mod retry;

pub use advisory::{advisory_phrasings, AdvisoryProbe, AdvisoryStatus, HttpAdvisoryProbe};
pub use error::{RemoteError, RemoteResult};
pub use graph::{
    ConditionalEdge, ConditionalEdgeGroup, GraphDocument, GraphNode, GraphRisk, GraphService,
    GraphServiceConfig, HttpGraphService, DEFAULT_GRAPH_URI,
};
pub use notify::{notifier_for, Notifier, StdoutNotifier, WebhookNotifier};
pub use pulls::{GitHubConfig, GitHubPullRequests, PullRequests};
pub use retry::RetryPolicy;
