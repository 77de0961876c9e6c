//! Update-graph service client.
//!
//! The service answers `GET <base>?channel=<c>&arch=<a>` with the graph of
//! releases in that channel: a node list, unconditional edges as index pairs,
//! and conditional edges grouped by the risks that guard them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RemoteError, RemoteResult};
use crate::retry::{send_with_retry, RetryPolicy};

/// Public update service used when no base URI is configured.
pub const DEFAULT_GRAPH_URI: &str = "https://api.openshift.com/api/upgrades_info/v1/graph";

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// One release in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub version: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl GraphNode {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.insert("url".to_string(), url.into());
        self
    }

    /// Advisory URI declared in `metadata.url`, if any.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").map(String::as_str).filter(|u| !u.is_empty())
    }
}

/// A conditional edge, by version string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalEdge {
    pub from: String,
    pub to: String,
}

/// A risk guarding a group of conditional edges. Only the name is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRisk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A set of conditional edges sharing the same risks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalEdgeGroup {
    pub edges: Vec<ConditionalEdge>,
    #[serde(default)]
    pub risks: Vec<GraphRisk>,
}

/// Response body of the update-graph service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Unconditional edges as `[from_index, to_index]` into `nodes`.
    #[serde(default)]
    pub edges: Vec<[usize; 2]>,
    #[serde(default, rename = "conditionalEdges")]
    pub conditional_edges: Vec<ConditionalEdgeGroup>,
}

// ---------------------------------------------------------------------------
// GraphService trait
// ---------------------------------------------------------------------------

/// Retrieval of update graphs by channel and architecture.
///
/// Implementations own retry behaviour; callers own caching.
#[async_trait]
pub trait GraphService: Send + Sync {
    /// The URI a graph is retrieved from, used in messages.
    fn source_uri(&self, channel: &str, architecture: &str) -> String;

    async fn fetch(&self, channel: &str, architecture: &str) -> RemoteResult<GraphDocument>;
}

/// Graph service client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphServiceConfig {
    pub base_uri: String,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub user_agent: String,
}

impl Default for GraphServiceConfig {
    fn default() -> Self {
        Self {
            base_uri: std::env::var("GRAPH_SERVICE_URI")
                .unwrap_or_else(|_| DEFAULT_GRAPH_URI.to_string()),
            max_attempts: RetryPolicy::default().max_attempts,
            backoff: RetryPolicy::default().backoff,
            user_agent: concat!("channel-promoter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GraphServiceConfig {
    /// Config for a specific service endpoint.
    pub fn new(base_uri: &str) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        }
    }
}

/// reqwest-backed `GraphService`.
pub struct HttpGraphService {
    config: GraphServiceConfig,
    http_client: reqwest::Client,
}

impl HttpGraphService {
    pub fn new(config: GraphServiceConfig) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RemoteError::http(&config.base_uri, e))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GraphServiceConfig {
        &self.config
    }
}

#[async_trait]
impl GraphService for HttpGraphService {
    fn source_uri(&self, channel: &str, architecture: &str) -> String {
        format!(
            "{}?channel={}&arch={}",
            self.config.base_uri, channel, architecture
        )
    }

    async fn fetch(&self, channel: &str, architecture: &str) -> RemoteResult<GraphDocument> {
        let uri = self.source_uri(channel, architecture);
        debug!(uri = %uri, "retrieving update graph");
        let response = send_with_retry(self.config.retry_policy(), &uri, || {
            self.http_client
                .get(&self.config.base_uri)
                .query(&[("channel", channel), ("arch", architecture)])
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                uri,
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::http(&uri, e))?;
        let document: GraphDocument =
            serde_json::from_slice(&body).map_err(|e| RemoteError::decode(&uri, e))?;
        info!(
            channel,
            architecture,
            nodes = document.nodes.len(),
            edges = document.edges.len(),
            "retrieved update graph"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_document_parses_conditional_edges() {
        let json = r#"{
            "nodes": [
                {"version": "4.9.1", "payload": "quay.io/x@sha256:1", "metadata": {"url": "https://access.redhat.com/errata/RHBA-2021:1"}},
                {"version": "4.9.2", "metadata": {}}
            ],
            "edges": [[0, 1]],
            "conditionalEdges": [
                {"edges": [{"from": "4.9.1", "to": "4.9.2"}], "risks": [{"name": "Foo", "url": "https://example.com", "message": "bad", "matchingRules": [{"type": "Always"}]}]}
            ]
        }"#;
        let doc: GraphDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges, vec![[0, 1]]);
        assert_eq!(doc.conditional_edges[0].risks[0].name, "Foo");
        assert_eq!(
            doc.nodes[0].url(),
            Some("https://access.redhat.com/errata/RHBA-2021:1")
        );
        assert_eq!(doc.nodes[1].url(), None);
    }

    #[test]
    fn test_source_uri_includes_channel_and_arch() {
        let service =
            HttpGraphService::new(GraphServiceConfig::new("https://graph.example.com/graph"))
                .unwrap();
        assert_eq!(
            service.source_uri("candidate-4.9", "amd64"),
            "https://graph.example.com/graph?channel=candidate-4.9&arch=amd64"
        );
    }
}
