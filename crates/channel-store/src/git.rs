//! Thin async wrapper around the `git` command line.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Run `git <args>` in `repo_dir` and return its stdout.
///
/// When `input` is given it is written to the child's stdin. A non-zero exit
/// status becomes `StorageError::Git` carrying the trimmed stderr.
pub(crate) async fn run_git(
    repo_dir: &Path,
    args: &[&str],
    input: Option<&str>,
) -> StorageResult<String> {
    debug!(?args, dir = %repo_dir.display(), "running git");
    let mut child = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StorageError::Git(format!("failed to run git: {e}")))?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| StorageError::Git(format!("failed to write git stdin: {e}")))?;
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| StorageError::Git(format!("failed to wait for git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StorageError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_git_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_git(dir.path(), &["rev-parse", "HEAD"], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Git(_)));
        assert!(err.to_string().contains("rev-parse"));
    }

    #[tokio::test]
    async fn test_run_git_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        test_support::init_repo(dir.path());
        let out = run_git(dir.path(), &["rev-parse", "--is-inside-work-tree"], None)
            .await
            .unwrap();
        assert_eq!(out.trim(), "true");
    }
}
