//! Version attribution from `git blame`.
//!
//! Each line of the form `- <version>` in a channel file is attributed to the
//! first-parent commit that introduced it. See the porcelain format section
//! of git-blame(1).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::StorageError;
use crate::git::run_git;
use crate::storage_traits::{Attribution, StorageResult, VersionHistory};

/// `VersionHistory` backed by the git repository holding the data directory.
#[derive(Debug, Clone)]
pub struct GitBlameHistory {
    repo_dir: PathBuf,
}

impl GitBlameHistory {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

#[async_trait]
impl VersionHistory for GitBlameHistory {
    async fn first_appearances(
        &self,
        source: &str,
    ) -> StorageResult<HashMap<String, Attribution>> {
        let output = run_git(
            &self.repo_dir,
            &["blame", "--first-parent", "--porcelain", "--", source],
            None,
        )
        .await?;
        let promotions = parse_blame_porcelain(source, &output)?;
        debug!(source, versions = promotions.len(), "attributed versions");
        Ok(promotions)
    }
}

#[derive(Debug, Default, Clone)]
struct CommitHeaders {
    committer_time: Option<DateTime<Utc>>,
    summary: Option<String>,
}

fn is_commit_line(line: &str) -> Option<&str> {
    let hash = line.split(' ').next()?;
    if hash.len() == 40 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Some(hash)
    } else {
        None
    }
}

/// Parse `git blame --porcelain` output into version attributions.
///
/// Only content lines starting with `- ` are kept. Commit headers appear once
/// per commit and apply to every later line blamed on that commit.
pub fn parse_blame_porcelain(
    source: &str,
    output: &str,
) -> StorageResult<HashMap<String, Attribution>> {
    let mut commits: HashMap<String, CommitHeaders> = HashMap::new();
    let mut lines: Vec<(String, String)> = Vec::new();
    let mut current: Option<String> = None;

    for (index, line) in output.lines().enumerate() {
        if let Some(hash) = is_commit_line(line) {
            commits.entry(hash.to_string()).or_default();
            current = Some(hash.to_string());
            continue;
        }

        let unrecognized = || StorageError::Parse {
            path: source.to_string(),
            message: format!("unrecognized blame output (blame line {}): {line}", index + 1),
        };

        let commit = current.as_ref().ok_or_else(unrecognized)?;

        if let Some(content) = line.strip_prefix('\t') {
            lines.push((content.to_string(), commit.clone()));
            continue;
        }

        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        if key.is_empty() {
            return Err(unrecognized());
        }
        let headers = commits.entry(commit.clone()).or_default();
        match key {
            "committer-time" => {
                let seconds: i64 = value.trim().parse().map_err(|_| unrecognized())?;
                headers.committer_time = Utc.timestamp_opt(seconds, 0).single();
            }
            "summary" => headers.summary = Some(value.to_string()),
            _ => {}
        }
    }

    let mut promotions = HashMap::new();
    for (content, hash) in lines {
        let Some(version) = content.strip_prefix("- ") else {
            continue;
        };
        let headers = commits.get(&hash).cloned().unwrap_or_default();
        let committer_time = headers.committer_time.ok_or_else(|| StorageError::Parse {
            path: source.to_string(),
            message: format!("commit {hash} has no committer-time header"),
        })?;
        promotions.insert(
            version.trim().to_string(),
            Attribution {
                hash,
                committer_time,
                summary: headers.summary.unwrap_or_default(),
            },
        );
    }
    Ok(promotions)
}
