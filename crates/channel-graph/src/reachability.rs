//! Update-out reachability.
//!
//! A version promoted into a channel of a newer line must be able to update
//! to that line using only releases the channel already carries.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::error::Result;
use crate::gate::{Concern, ConcernKind};
use crate::model::Channel;
use crate::semver::{ReleaseLine, Version};
use crate::update_graph::{GraphCache, UpdateGraph};

/// BFS from `start` over the unconditional edges of `graphs`, visiting only
/// `allowed` versions. True once a visited version is on `target`.
pub fn reaches_line(
    start: &Version,
    target: ReleaseLine,
    graphs: &[&UpdateGraph],
    allowed: &BTreeSet<Version>,
) -> bool {
    let mut seen = BTreeSet::from([start.clone()]);
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(current) = queue.pop_front() {
        if current.release_line() == target {
            return true;
        }
        for graph in graphs {
            for next in graph.unconditional_successors(&current) {
                if allowed.contains(next) && seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
    }
    false
}

/// Check that `version` has an unconditional path in `graph` to `target`,
/// without restricting the intermediate releases.
///
/// The error lists what is reachable instead.
pub fn path_to_line(
    version: &Version,
    target: ReleaseLine,
    graph: &UpdateGraph,
) -> std::result::Result<(), String> {
    if version.release_line() == target {
        return Ok(());
    }
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::from([version.clone()]);
    while let Some(current) = queue.pop_front() {
        for next in graph.unconditional_successors(&current) {
            if reached.insert(next.clone()) {
                queue.push_back(next.clone());
            }
        }
    }
    if reached.iter().any(|r| r.release_line() == target) {
        return Ok(());
    }
    let err = format!("No unconditional paths from {version} to {target}");
    if reached.is_empty() {
        return Err(err);
    }
    let listed: Vec<String> = reached.iter().map(ToString::to_string).collect();
    Err(format!("{err}.  Reachable targets are: {}", listed.join(", ")))
}

/// Advisory concern when `version` cannot reach `channel`'s line.
///
/// Skipped for version-agnostic channels, for versions already on the
/// channel's line, and for channels in the bootstrap phase.
pub async fn check_reachability(
    version: &Version,
    channel: &Channel,
    bootstrap_phase: &str,
    architecture: &str,
    cache: &mut GraphCache,
) -> Result<Option<Concern>> {
    let Some(target) = channel.release_line else {
        return Ok(None);
    };
    if version.release_line() == target || channel.phase == bootstrap_phase {
        return Ok(None);
    }
    let lines = version.release_line().through(target);
    if lines.is_empty() {
        return Ok(None);
    }

    let mut graphs = Vec::with_capacity(lines.len());
    for line in &lines {
        let upstream = format!("{bootstrap_phase}-{line}");
        graphs.push(cache.get_edges(&upstream, architecture).await?);
    }

    let mut allowed = channel.versions.clone();
    allowed.insert(version.clone());
    let views: Vec<&UpdateGraph> = graphs.iter().map(Arc::as_ref).collect();
    if reaches_line(version, target, &views, &allowed) {
        return Ok(None);
    }

    let sources: Vec<&str> = graphs.iter().map(|g| g.source_uri.as_str()).collect();
    Ok(Some(Concern::advisory(
        ConcernKind::Reachability,
        format!(
            "{version} cannot update to {target} through releases in {} according to {}.",
            channel.name,
            sources.join(", ")
        ),
    )))
}
