//! Git-backed channel writer.
//!
//! A promotion is prepared on its own branch cut from `<remote>/<branch>`:
//! the version is appended to the channel file, the list is re-sorted, and
//! the change is committed and pushed. The working tree is returned to the
//! previous checkout afterwards, whether or not the promotion succeeded.

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_yaml::Value;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::git::run_git;
use crate::storage_traits::{ChannelWriter, PromotionRequest, StorageResult};

/// Width commit bodies are wrapped to.
pub const COMMIT_BODY_WIDTH: usize = 76;

/// Upstream location promotions branch from and push to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub remote: String,
    pub branch: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "master".to_string(),
        }
    }
}

impl UpstreamConfig {
    fn location(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

/// `ChannelWriter` that commits to a local clone and pushes to a remote.
#[derive(Debug, Clone)]
pub struct GitChannelWriter {
    repo_dir: PathBuf,
    upstream: UpstreamConfig,
}

impl GitChannelWriter {
    pub fn new(repo_dir: impl Into<PathBuf>, upstream: UpstreamConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            upstream,
        }
    }

    async fn git(&self, args: &[&str]) -> StorageResult<String> {
        run_git(&self.repo_dir, args, None).await
    }

    async fn commit_and_push(&self, request: &PromotionRequest) -> StorageResult<()> {
        let path = self.repo_dir.join(&request.source);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StorageError::io(&request.source, e))?;
        let updated = append_version(&raw, request, &self.upstream.location())?;
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| StorageError::io(&request.source, e))?;

        let message = format!(
            "{}\n\n{}\n",
            request.subject,
            wrap(&request.body, COMMIT_BODY_WIDTH)
        );
        run_git(
            &self.repo_dir,
            &["commit", "--file", "-", "--", &request.source],
            Some(&message),
        )
        .await?;
        self.git(&["push", "-u", &self.upstream.remote, &request.branch])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelWriter for GitChannelWriter {
    async fn append_version(&self, request: &PromotionRequest) -> StorageResult<()> {
        self.git(&["fetch", &self.upstream.remote]).await?;
        let base = self.upstream.location();
        self.git(&["checkout", "-b", &request.branch, &base]).await?;

        let result = self.commit_and_push(request).await;

        if let Err(e) = self.git(&["checkout", "--force", "-"]).await {
            warn!(error = %e, "failed to return to previous checkout");
        }
        match &result {
            Ok(()) => info!(
                version = %request.version,
                channel = %request.channel,
                branch = %request.branch,
                "pushed promotion branch"
            ),
            Err(_) => {
                if let Err(e) = self.git(&["branch", "-D", &request.branch]).await {
                    warn!(branch = %request.branch, error = %e, "failed to delete promotion branch");
                }
            }
        }
        result
    }
}

/// Append `request.version` to the `versions` list of a channel document.
///
/// Other keys keep their order. Fails with `PromotionConflict` when the
/// version is already listed.
pub fn append_version(
    raw: &str,
    request: &PromotionRequest,
    location: &str,
) -> StorageResult<String> {
    let parse_error = |message: String| StorageError::Parse {
        path: request.source.clone(),
        message,
    };
    let mut document: Value = serde_yaml::from_str(raw).map_err(|e| parse_error(e.to_string()))?;
    let mapping = document
        .as_mapping_mut()
        .ok_or_else(|| parse_error("channel document is not a mapping".to_string()))?;

    let mut versions: Vec<String> = match mapping.get("versions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(parse_error(format!("non-string version entry {other:?}"))),
            })
            .collect::<StorageResult<_>>()?,
        Some(_) => return Err(parse_error("versions is not a list".to_string())),
    };

    if versions.iter().any(|v| v == &request.version) {
        return Err(StorageError::PromotionConflict {
            version: request.version.clone(),
            channel: request.channel.clone(),
            location: location.to_string(),
        });
    }
    versions.push(request.version.clone());
    versions.sort_by(|a, b| compare_version_keys(a, b));
    versions.dedup();

    mapping.insert(
        Value::String("versions".to_string()),
        Value::Sequence(versions.into_iter().map(Value::String).collect()),
    );
    serde_yaml::to_string(&document).map_err(|e| parse_error(e.to_string()))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart<'a> {
    Number(u64),
    Text(&'a str),
}

fn version_key(version: &str) -> Vec<KeyPart<'_>> {
    version
        .split(['.', '+', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse() {
            Ok(n) => KeyPart::Number(n),
            Err(_) => KeyPart::Text(part),
        })
        .collect()
}

/// File ordering for version lists: numeric identifiers compare numerically,
/// everything else as text, with numbers ahead of text.
pub fn compare_version_keys(a: &str, b: &str) -> Ordering {
    version_key(a).cmp(&version_key(b))
}

/// Greedy word wrap used for commit bodies.
pub fn wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}
