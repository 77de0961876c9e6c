//! Patch connectivity audit.
//!
//! Every release on a channel's newest line, other than the newest, should
//! have a way forward to a newer release of the same channel. Releases with
//! only risky ways forward, or none at all, are reported as advisories.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Channel;
use crate::semver::Version;
use crate::update_graph::{GraphCache, UpdateGraph};

/// Releases known to be stranded that should not be reported again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemptions {
    #[serde(default)]
    pub versions: BTreeSet<String>,
}

impl Exemptions {
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn is_exempt(&self, version: &Version) -> bool {
        self.versions.contains(&version.to_string())
    }
}

/// How an audited release can move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    Clean,
    /// Only conditional edges, by target and guarding risk names.
    Risky(BTreeMap<Version, BTreeSet<String>>),
    Stranded,
}

/// Audit result for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub channel: String,
    pub source_uri: String,
    /// Every audited release and its classification.
    pub audited: BTreeMap<Version, Connectivity>,
}

impl ConnectivityReport {
    /// Releases worth a warning. Stranded releases always are; risky ones
    /// are dropped when every risky target is itself audited, since the
    /// target's own entry already covers the path.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (version, connectivity) in &self.audited {
            match connectivity {
                Connectivity::Clean => {}
                Connectivity::Stranded => warnings.push(format!(
                    "{}: {version} has no update to a newer {} release in {}.",
                    self.channel, self.channel, self.source_uri
                )),
                Connectivity::Risky(targets) => {
                    if targets.keys().all(|t| self.audited.contains_key(t)) {
                        continue;
                    }
                    let listed: Vec<String> = targets
                        .iter()
                        .map(|(to, risks)| {
                            let names: Vec<&str> = risks.iter().map(String::as_str).collect();
                            format!("{to} ({})", names.join(", "))
                        })
                        .collect();
                    warnings.push(format!(
                        "{}: {version} only updates to newer {} releases through risks: {}.",
                        self.channel,
                        self.channel,
                        listed.join("; ")
                    ));
                }
            }
        }
        warnings
    }
}

/// Classify releases of `channel` on its newest line against `graph`.
pub fn classify(channel: &Channel, graph: &UpdateGraph, exemptions: &Exemptions) -> ConnectivityReport {
    let mut report = ConnectivityReport {
        channel: channel.name.clone(),
        source_uri: graph.source_uri.clone(),
        audited: BTreeMap::new(),
    };
    let Some(largest) = channel.largest() else {
        return report;
    };
    let line = largest.release_line();

    for version in &channel.versions {
        if version == largest
            || version.release_line() != line
            || version.is_prerelease()
            || exemptions.is_exempt(version)
        {
            continue;
        }
        let mut clean = false;
        let mut risky: BTreeMap<Version, BTreeSet<String>> = BTreeMap::new();
        for edge in graph.successors(version) {
            if !channel.versions.contains(&edge.to) || edge.to.precedence(version).is_le() {
                continue;
            }
            match graph.risks(edge) {
                None => clean = true,
                Some(names) => {
                    risky.entry(edge.to.clone()).or_default().extend(names.iter().cloned());
                }
            }
        }
        let connectivity = if clean {
            Connectivity::Clean
        } else if risky.is_empty() {
            Connectivity::Stranded
        } else {
            Connectivity::Risky(risky)
        };
        report.audited.insert(version.clone(), connectivity);
    }
    report
}

/// Audit `channel` against the bootstrap-phase graph of its newest line.
pub async fn audit_connectivity(
    channel: &Channel,
    bootstrap_phase: &str,
    architecture: &str,
    exemptions: &Exemptions,
    cache: &mut GraphCache,
) -> Result<ConnectivityReport> {
    let Some(largest) = channel.largest() else {
        return Ok(ConnectivityReport {
            channel: channel.name.clone(),
            ..ConnectivityReport::default()
        });
    };
    let upstream = format!("{bootstrap_phase}-{}", largest.release_line());
    let graph = cache.get_edges(&upstream, architecture).await?;
    Ok(classify(channel, &graph, exemptions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_store::{ChannelDocument, Sourced};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn channel(name: &str, versions: &[&str]) -> Channel {
        let doc = ChannelDocument::new(name).with_versions(versions.iter().copied());
        Channel::from_document(&Sourced::new(format!("channels/{name}.yaml"), doc)).unwrap()
    }

    fn graph() -> UpdateGraph {
        UpdateGraph::new("candidate-4.9", "amd64", "memory://candidate-4.9")
    }

    #[test]
    fn test_risky_edge_into_clean_release_is_suppressed() {
        let stable = channel("stable-4.9", &["4.9.1", "4.9.2", "4.9.3"]);
        let mut g = graph();
        g.add_conditional_edge(v("4.9.1"), v("4.9.2"), &["Foo"]);
        g.add_edge(v("4.9.2"), v("4.9.3"));
        let report = classify(&stable, &g, &Exemptions::default());
        assert!(matches!(report.audited[&v("4.9.1")], Connectivity::Risky(_)));
        assert_eq!(report.audited[&v("4.9.2")], Connectivity::Clean);
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_stranded_release_is_reported() {
        let stable = channel("stable-4.9", &["4.9.1", "4.9.2", "4.9.3"]);
        let mut g = graph();
        g.add_edge(v("4.9.2"), v("4.9.3"));
        let warnings = classify(&stable, &g, &Exemptions::default()).warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("4.9.1 has no update"));
    }

    #[test]
    fn test_risky_edge_into_largest_is_reported() {
        let stable = channel("stable-4.9", &["4.9.1", "4.9.2"]);
        let mut g = graph();
        g.add_conditional_edge(v("4.9.1"), v("4.9.2"), &["Foo", "Bar"]);
        let warnings = classify(&stable, &g, &Exemptions::default()).warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("4.9.2 (Bar, Foo)"));
    }

    #[test]
    fn test_edges_outside_channel_or_backwards_ignored() {
        let stable = channel("stable-4.9", &["4.9.1", "4.9.3"]);
        let mut g = graph();
        g.add_edge(v("4.9.1"), v("4.9.2"));
        g.add_edge(v("4.9.3"), v("4.9.1"));
        let report = classify(&stable, &g, &Exemptions::default());
        assert_eq!(report.audited[&v("4.9.1")], Connectivity::Stranded);
    }

    #[test]
    fn test_prereleases_older_lines_and_exemptions_skipped() {
        let stable = channel("fast-4.9", &["4.8.9", "4.9.0-rc.1", "4.9.1", "4.9.2", "4.9.3"]);
        let exemptions = Exemptions::from_yaml("versions:\n- 4.9.1\n").unwrap();
        let report = classify(&stable, &graph(), &exemptions);
        let audited: Vec<_> = report.audited.keys().map(ToString::to_string).collect();
        assert_eq!(audited, vec!["4.9.2"]);
    }

    #[test]
    fn test_empty_channel_audits_nothing() {
        let report = classify(&channel("stable-4.9", &[]), &graph(), &Exemptions::default());
        assert!(report.audited.is_empty());
    }
}
