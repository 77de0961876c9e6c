//! Filesystem-backed channel store.
//!
//! Layout under the data directory:
//!
//! ```text
//! channels/*.yaml            public channel definitions
//! internal-channels/*.yaml   internal channel definitions
//! blocked-edges/*.yaml       risk declarations (no other files allowed)
//! ```
//!
//! Subdirectories are walked recursively. Missing directories are treated as
//! empty. Paths handed back as `Sourced::source` are relative to the data
//! directory and use `/` separators, so they match what git reports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use walkdir::WalkDir;

use crate::documents::{BlockedEdgeDocument, ChannelDocument, Sourced};
use crate::error::StorageError;
use crate::storage_traits::{ChannelSource, StorageResult};

/// Directories holding channel definitions, in load order.
pub const CHANNEL_DIRECTORIES: [&str; 2] = ["channels", "internal-channels"];

/// Directory holding blocked-edge declarations.
pub const BLOCKED_EDGES_DIRECTORY: &str = "blocked-edges";

const YAML_EXTENSION: &str = "yaml";

/// Reads channel documents from a checked-out data directory.
#[derive(Debug, Clone)]
pub struct FsChannelStore {
    root: PathBuf,
}

impl FsChannelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a store-relative source.
    pub fn resolve(&self, source: &str) -> PathBuf {
        self.root.join(source)
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Load every `.yaml` file under `directory`.
    ///
    /// With `strict` set, any other file is an error rather than being skipped.
    fn load_directory<T: DeserializeOwned>(
        &self,
        directory: &str,
        strict: bool,
    ) -> StorageResult<Vec<Sourced<T>>> {
        let dir = self.root.join(directory);
        let mut documents = Vec::new();
        for path in walk(&dir)? {
            let source = self.relative(&path);
            if path.extension().and_then(|e| e.to_str()) != Some(YAML_EXTENSION) {
                if strict {
                    return Err(StorageError::UnexpectedFile {
                        path: source,
                        allowed: format!(".{YAML_EXTENSION}"),
                    });
                }
                debug!(path = %source, "skipping non-YAML file");
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| StorageError::io(&source, e))?;
            let document = serde_yaml::from_str(&raw).map_err(|e| StorageError::Parse {
                path: source.clone(),
                message: e.to_string(),
            })?;
            documents.push(Sourced::new(source, document));
        }
        debug!(directory, count = documents.len(), "loaded documents");
        Ok(documents)
    }
}

#[async_trait]
impl ChannelSource for FsChannelStore {
    async fn channels(&self) -> StorageResult<Vec<Sourced<ChannelDocument>>> {
        let mut all = Vec::new();
        for directory in CHANNEL_DIRECTORIES {
            all.extend(self.load_directory(directory, false)?);
        }
        Ok(all)
    }

    async fn blocked_edges(&self) -> StorageResult<Vec<Sourced<BlockedEdgeDocument>>> {
        self.load_directory(BLOCKED_EDGES_DIRECTORY, true)
    }
}

/// Every file under `dir`, siblings in file-name order.
fn walk(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .unwrap_or(dir)
                .display()
                .to_string();
            StorageError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_channels_reads_both_directories() {
        let dir = tempdir().unwrap();
        write(dir.path(), "channels/candidate-4.9.yaml", "name: candidate-4.9\nversions:\n- 4.9.1\n");
        write(dir.path(), "internal-channels/eus-4.9.yaml", "name: eus-4.9\nversions: []\n");
        write(dir.path(), "channels/README.md", "not yaml");

        let store = FsChannelStore::new(dir.path());
        let channels = store.channels().await.unwrap();
        let names: Vec<_> = channels.iter().map(|c| c.document.name.as_str()).collect();
        assert_eq!(names, vec!["candidate-4.9", "eus-4.9"]);
        assert_eq!(channels[0].source, "channels/candidate-4.9.yaml");
        assert_eq!(channels[1].source, "internal-channels/eus-4.9.yaml");
    }

    #[tokio::test]
    async fn test_missing_directories_are_empty() {
        let dir = tempdir().unwrap();
        let store = FsChannelStore::new(dir.path());
        assert!(store.channels().await.unwrap().is_empty());
        assert!(store.blocked_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_edges_rejects_foreign_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "blocked-edges/4.9.1-Foo.yaml", "to: 4.9.1\nfrom: .*\n");
        write(dir.path(), "blocked-edges/notes.txt", "oops");

        let store = FsChannelStore::new(dir.path());
        let err = store.blocked_edges().await.unwrap_err();
        assert!(matches!(err, StorageError::UnexpectedFile { .. }));
        assert!(err.to_string().contains("blocked-edges/notes.txt"));
    }

    #[tokio::test]
    async fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "channels/broken.yaml", "name: [unterminated\n");

        let store = FsChannelStore::new(dir.path());
        let err = store.channels().await.unwrap_err();
        match err {
            StorageError::Parse { path, .. } => assert_eq!(path, "channels/broken.yaml"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_walk_is_sorted_and_recursive() {
        let dir = tempdir().unwrap();
        write(dir.path(), "b.yaml", "");
        write(dir.path(), "a/z.yaml", "");
        write(dir.path(), "a/y.yaml", "");

        let files = walk(dir.path()).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a/y.yaml"),
                PathBuf::from("a/z.yaml"),
                PathBuf::from("b.yaml"),
            ]
        );
    }

    #[test]
    fn test_walk_orders_nested_siblings_by_name() {
        let dir = tempdir().unwrap();
        write(dir.path(), "c/deep/x.yaml", "");
        write(dir.path(), "c/a.yaml", "");
        write(dir.path(), "B.yaml", "");
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let files = walk(dir.path()).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("B.yaml"),
                PathBuf::from("c/a.yaml"),
                PathBuf::from("c/deep/x.yaml"),
            ]
        );
    }

    #[test]
    fn test_walk_of_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        assert!(walk(&dir.path().join("absent")).unwrap().is_empty());
    }
}
