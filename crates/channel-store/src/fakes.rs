//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryChannelStore`, `MemoryVersionHistory`, and
//! `MemoryChannelWriter` that satisfy the trait contracts without touching
//! the filesystem or git.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::documents::{BlockedEdgeDocument, ChannelDocument, Sourced};
use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryChannelStore
// ---------------------------------------------------------------------------

/// In-memory channel source.
///
/// Documents are kept in insertion order. `MemoryChannelWriter` can share the
/// same instance so that promotions become visible to the next pass.
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    channels: Mutex<Vec<Sourced<ChannelDocument>>>,
    blocked_edges: Mutex<Vec<Sourced<BlockedEdgeDocument>>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel stored at `channels/<name>.yaml`.
    pub fn with_channel(self, document: ChannelDocument) -> Self {
        let source = format!("channels/{}.yaml", document.name);
        self.channels
            .lock()
            .unwrap()
            .push(Sourced::new(source, document));
        self
    }

    pub fn with_blocked_edge(self, document: BlockedEdgeDocument) -> Self {
        let source = format!(
            "blocked-edges/{}-{}.yaml",
            document.to,
            document.name.as_deref().unwrap_or("unnamed")
        );
        self.blocked_edges
            .lock()
            .unwrap()
            .push(Sourced::new(source, document));
        self
    }

    /// Current version list of a channel, if defined.
    pub fn versions_of(&self, name: &str) -> Option<Vec<String>> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.document.name == name)
            .map(|c| c.document.versions.clone())
    }

    fn append(&self, request: &PromotionRequest) -> StorageResult<()> {
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .iter_mut()
            .find(|c| c.source == request.source)
            .ok_or_else(|| StorageError::NotFound(request.source.clone()))?;
        if channel.document.versions.contains(&request.version) {
            return Err(StorageError::PromotionConflict {
                version: request.version.clone(),
                channel: request.channel.clone(),
                location: "memory".to_string(),
            });
        }
        channel.document.versions.push(request.version.clone());
        Ok(())
    }
}

#[async_trait]
impl ChannelSource for MemoryChannelStore {
    async fn channels(&self) -> StorageResult<Vec<Sourced<ChannelDocument>>> {
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn blocked_edges(&self) -> StorageResult<Vec<Sourced<BlockedEdgeDocument>>> {
        Ok(self.blocked_edges.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionHistory
// ---------------------------------------------------------------------------

/// In-memory version history keyed by source then version.
#[derive(Debug, Default)]
pub struct MemoryVersionHistory {
    entries: Mutex<HashMap<String, HashMap<String, Attribution>>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryVersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: &str, version: &str, attribution: Attribution) {
        self.entries
            .lock()
            .unwrap()
            .entry(source.to_string())
            .or_default()
            .insert(version.to_string(), attribution);
    }

    /// Make every subsequent lookup fail with a git error carrying `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }
}

#[async_trait]
impl VersionHistory for MemoryVersionHistory {
    async fn first_appearances(
        &self,
        source: &str,
    ) -> StorageResult<HashMap<String, Attribution>> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(StorageError::Git(message));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryChannelWriter
// ---------------------------------------------------------------------------

/// Records every promotion request and applies it to a shared store when one
/// is attached.
#[derive(Debug, Default)]
pub struct MemoryChannelWriter {
    requests: Mutex<Vec<PromotionRequest>>,
    store: Option<std::sync::Arc<MemoryChannelStore>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryChannelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that appends into `store`, detecting conflicts against it.
    pub fn backed_by(store: std::sync::Arc<MemoryChannelStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail with a git error carrying `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    pub fn requests(&self) -> Vec<PromotionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelWriter for MemoryChannelWriter {
    async fn append_version(&self, request: &PromotionRequest) -> StorageResult<()> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(StorageError::Git(message));
        }
        if let Some(store) = &self.store {
            store.append(request)?;
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}
