//! Observed update graphs and the per-pass cache that retrieves them.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use channel_remote::{GraphDocument, GraphService, RemoteError};
use tracing::{debug, warn};

use crate::error::{PromoterError, Result};
use crate::metrics::METRICS;
use crate::semver::Version;

/// A directed update from one release to another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: Version,
    pub to: Version,
}

impl Edge {
    pub fn new(from: Version, to: Version) -> Self {
        Self { from, to }
    }
}

/// Edge set of one `(channel, architecture)` graph.
///
/// Unconditional and conditional edges share one set; conditional edges are
/// additionally indexed by the names of the risks guarding them. An edge that
/// is served both ways counts as unconditional.
#[derive(Debug, Clone, Default)]
pub struct UpdateGraph {
    pub channel: String,
    pub architecture: String,
    /// Where the graph was retrieved from.
    pub source_uri: String,
    nodes: BTreeMap<Version, Option<String>>,
    edges: BTreeSet<Edge>,
    risks: BTreeMap<Edge, BTreeSet<String>>,
}

impl UpdateGraph {
    pub fn new(channel: &str, architecture: &str, source_uri: &str) -> Self {
        Self {
            channel: channel.to_string(),
            architecture: architecture.to_string(),
            source_uri: source_uri.to_string(),
            ..Self::default()
        }
    }

    /// Convert a service response. Nodes whose version does not parse are
    /// dropped along with their edges; out-of-range edge indices are a
    /// decode failure.
    pub fn from_document(
        channel: &str,
        architecture: &str,
        source_uri: &str,
        document: &GraphDocument,
    ) -> Result<Self> {
        let mut graph = Self::new(channel, architecture, source_uri);
        let mut by_index: Vec<Option<Version>> = Vec::with_capacity(document.nodes.len());
        for node in &document.nodes {
            match Version::parse(&node.version) {
                Ok(version) => {
                    graph
                        .nodes
                        .insert(version.clone(), node.url().map(str::to_string));
                    by_index.push(Some(version));
                }
                Err(e) => {
                    warn!(uri = %source_uri, error = %e, "skipping graph node");
                    by_index.push(None);
                }
            }
        }

        for [from, to] in &document.edges {
            let lookup = |i: usize| {
                by_index.get(i).ok_or_else(|| {
                    PromoterError::GraphService(RemoteError::Decode {
                        uri: source_uri.to_string(),
                        message: format!("edge index {i} out of range"),
                    })
                })
            };
            if let (Some(from), Some(to)) = (lookup(*from)?, lookup(*to)?) {
                graph.add_edge(from.clone(), to.clone());
            }
        }

        for group in &document.conditional_edges {
            let names: Vec<&str> = group.risks.iter().map(|r| r.name.as_str()).collect();
            for edge in &group.edges {
                match (Version::parse(&edge.from), Version::parse(&edge.to)) {
                    (Ok(from), Ok(to)) => graph.add_conditional_edge(from, to, &names),
                    _ => warn!(
                        uri = %source_uri,
                        from = %edge.from,
                        to = %edge.to,
                        "skipping conditional edge"
                    ),
                }
            }
        }
        Ok(graph)
    }

    pub fn add_node(&mut self, version: Version, advisory: Option<String>) {
        self.nodes.insert(version, advisory);
    }

    pub fn add_edge(&mut self, from: Version, to: Version) {
        let edge = Edge::new(from, to);
        self.risks.remove(&edge);
        self.edges.insert(edge);
    }

    pub fn add_conditional_edge(&mut self, from: Version, to: Version, risks: &[&str]) {
        let edge = Edge::new(from, to);
        if self.edges.contains(&edge) && !self.risks.contains_key(&edge) {
            return;
        }
        self.risks
            .entry(edge.clone())
            .or_default()
            .extend(risks.iter().map(|r| r.to_string()));
        self.edges.insert(edge);
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.nodes.contains_key(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.nodes.keys()
    }

    /// `metadata.url` of a node.
    pub fn advisory_url(&self, version: &Version) -> Option<&str> {
        self.nodes.get(version).and_then(|u| u.as_deref())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Risk names guarding `edge`, `None` when unconditional or absent.
    pub fn risks(&self, edge: &Edge) -> Option<&BTreeSet<String>> {
        self.risks.get(edge)
    }

    pub fn is_conditional(&self, edge: &Edge) -> bool {
        self.risks.contains_key(edge)
    }

    /// Outgoing edges of `from`.
    pub fn successors<'a>(&'a self, from: &'a Version) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.from == from)
    }

    /// Targets reachable in one unconditional hop from `from`.
    pub fn unconditional_successors<'a>(
        &'a self,
        from: &'a Version,
    ) -> impl Iterator<Item = &'a Version> + 'a {
        self.successors(from)
            .filter(|e| !self.is_conditional(e))
            .map(|e| &e.to)
    }

    /// Versions reachable from `root`, including `root` itself.
    pub fn downstream_of(&self, root: &Version) -> BTreeSet<Version> {
        let mut seen = BTreeSet::from([root.clone()]);
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(current) = queue.pop_front() {
            for edge in self.successors(&current) {
                if seen.insert(edge.to.clone()) {
                    queue.push_back(edge.to.clone());
                }
            }
        }
        seen
    }

    /// One line per edge, `a -> b` or `a -(risks: X, Y)-> b`, limited to
    /// edges leaving versions downstream of `root` when one is given.
    pub fn edge_lines(&self, root: Option<&Version>) -> Vec<String> {
        let reachable = root.map(|r| self.downstream_of(r));
        self.edges
            .iter()
            .filter(|e| reachable.as_ref().map_or(true, |r| r.contains(&e.from)))
            .map(|e| match self.risks(e) {
                Some(names) => {
                    let names: Vec<&str> = names.iter().map(String::as_str).collect();
                    format!("{} -(risks: {})-> {}", e.from, names.join(", "), e.to)
                }
                None => format!("{} -> {}", e.from, e.to),
            })
            .collect()
    }
}

/// Per-pass memo of update graphs keyed by `(channel, architecture)`.
///
/// Owned by one pass and dropped with it, so every pass sees fresh data.
/// Failed retrievals are not remembered.
pub struct GraphCache {
    service: Arc<dyn GraphService>,
    graphs: HashMap<(String, String), Arc<UpdateGraph>>,
}

impl GraphCache {
    pub fn new(service: Arc<dyn GraphService>) -> Self {
        Self {
            service,
            graphs: HashMap::new(),
        }
    }

    /// The graph for `(channel, architecture)`, retrieved on first use.
    pub async fn get_edges(&mut self, channel: &str, architecture: &str) -> Result<Arc<UpdateGraph>> {
        let key = (channel.to_string(), architecture.to_string());
        if let Some(graph) = self.graphs.get(&key) {
            return Ok(Arc::clone(graph));
        }
        let uri = self.service.source_uri(channel, architecture);
        debug!(uri = %uri, "update graph cache miss");
        METRICS.inc_graph_fetches();
        let document = self
            .service
            .fetch(channel, architecture)
            .await
            .map_err(PromoterError::GraphService)?;
        let graph = Arc::new(UpdateGraph::from_document(
            channel,
            architecture,
            &uri,
            &document,
        )?);
        self.graphs.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    pub fn source_uri(&self, channel: &str, architecture: &str) -> String {
        self.service.source_uri(channel, architecture)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}
