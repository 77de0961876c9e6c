//! In-memory fakes for remote collaborators (testing only)
//!
//! Provides `StaticGraphService`, `StaticAdvisoryProbe`,
//! `RecordingPullRequests`, and `RecordingNotifier`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::advisory::{AdvisoryProbe, AdvisoryStatus};
use crate::error::{RemoteError, RemoteResult};
use crate::graph::{
    ConditionalEdge, ConditionalEdgeGroup, GraphDocument, GraphNode, GraphRisk, GraphService,
};
use crate::notify::Notifier;
use crate::pulls::PullRequests;

// ---------------------------------------------------------------------------
// GraphDocument builder
// ---------------------------------------------------------------------------

impl GraphDocument {
    /// Graph containing `versions` as nodes and no edges.
    pub fn with_nodes<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: versions.into_iter().map(GraphNode::new).collect(),
            ..Self::default()
        }
    }

    fn index_of(&mut self, version: &str) -> usize {
        match self.nodes.iter().position(|n| n.version == version) {
            Some(i) => i,
            None => {
                self.nodes.push(GraphNode::new(version));
                self.nodes.len() - 1
            }
        }
    }

    /// Add an unconditional edge, creating nodes as needed.
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        let from = self.index_of(from);
        let to = self.index_of(to);
        self.edges.push([from, to]);
        self
    }

    /// Add a conditional edge guarded by `risks`, creating nodes as needed.
    pub fn conditional_edge(mut self, from: &str, to: &str, risks: &[&str]) -> Self {
        self.index_of(from);
        self.index_of(to);
        self.conditional_edges.push(ConditionalEdgeGroup {
            edges: vec![ConditionalEdge {
                from: from.to_string(),
                to: to.to_string(),
            }],
            risks: risks
                .iter()
                .map(|name| GraphRisk {
                    name: name.to_string(),
                    url: None,
                    message: None,
                })
                .collect(),
        });
        self
    }

    /// Set `metadata.url` on a node, creating it as needed.
    pub fn advisory(mut self, version: &str, url: &str) -> Self {
        let i = self.index_of(version);
        self.nodes[i].metadata.insert("url".to_string(), url.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// StaticGraphService
// ---------------------------------------------------------------------------

/// Serves fixed graphs keyed by `(channel, architecture)` and counts fetches.
///
/// Unknown channels answer with HTTP 404.
#[derive(Debug, Default)]
pub struct StaticGraphService {
    graphs: Mutex<HashMap<(String, String), GraphDocument>>,
    fetches: AtomicUsize,
}

impl StaticGraphService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(self, channel: &str, architecture: &str, graph: GraphDocument) -> Self {
        self.graphs
            .lock()
            .unwrap()
            .insert((channel.to_string(), architecture.to_string()), graph);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphService for StaticGraphService {
    fn source_uri(&self, channel: &str, architecture: &str) -> String {
        format!("memory://graph?channel={channel}&arch={architecture}")
    }

    async fn fetch(&self, channel: &str, architecture: &str) -> RemoteResult<GraphDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.graphs
            .lock()
            .unwrap()
            .get(&(channel.to_string(), architecture.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                uri: self.source_uri(channel, architecture),
                status: 404,
            })
    }
}

// ---------------------------------------------------------------------------
// StaticAdvisoryProbe
// ---------------------------------------------------------------------------

/// Reports advisories as public when their URI was registered.
#[derive(Debug, Default)]
pub struct StaticAdvisoryProbe {
    public: Mutex<Vec<String>>,
    probed: Mutex<Vec<String>>,
}

impl StaticAdvisoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public(self, uri: &str) -> Self {
        self.public.lock().unwrap().push(uri.to_string());
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdvisoryProbe for StaticAdvisoryProbe {
    async fn probe(&self, uri: &str) -> RemoteResult<AdvisoryStatus> {
        self.probed.lock().unwrap().push(uri.to_string());
        let public = self.public.lock().unwrap().iter().any(|u| u == uri);
        Ok(AdvisoryStatus {
            uri: uri.to_string(),
            public,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingPullRequests
// ---------------------------------------------------------------------------

/// A pull request opened through `RecordingPullRequests`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPull {
    pub branch: String,
    pub title: String,
    pub body: String,
}

/// Records pull requests and hands back sequential fake URLs.
#[derive(Debug, Default)]
pub struct RecordingPullRequests {
    pulls: Mutex<Vec<RecordedPull>>,
}

impl RecordingPullRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulls(&self) -> Vec<RecordedPull> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequests for RecordingPullRequests {
    async fn create(&self, branch: &str, title: &str, body: &str) -> RemoteResult<String> {
        let mut pulls = self.pulls.lock().unwrap();
        pulls.push(RecordedPull {
            branch: branch.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(format!("https://github.example/pull/{}", pulls.len()))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Keeps every delivered message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> RemoteResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder_reuses_nodes() {
        let graph = GraphDocument::with_nodes(["4.9.1"])
            .edge("4.9.1", "4.9.2")
            .edge("4.9.2", "4.9.3")
            .conditional_edge("4.9.1", "4.9.3", &["Foo"]);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges, vec![[0, 1], [1, 2]]);
        assert_eq!(graph.conditional_edges[0].risks[0].name, "Foo");
    }

    #[tokio::test]
    async fn test_static_graph_service_counts_and_404s() {
        let service = StaticGraphService::new().with_graph("a", "amd64", GraphDocument::default());
        service.fetch("a", "amd64").await.unwrap();
        let err = service.fetch("b", "amd64").await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 404, .. }));
        assert_eq!(service.fetch_count(), 2);
    }
}
