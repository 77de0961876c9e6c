//! Storage trait definitions for the channel promoter
//!
//! These traits define the store abstractions the promotion engine talks to:
//! - `ChannelSource`: read channel and blocked-edge documents
//! - `VersionHistory`: attribute each version to the commit that added it
//! - `ChannelWriter`: persist a promotion into a channel
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::{BlockedEdgeDocument, ChannelDocument, Sourced};
use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ChannelSource
// ---------------------------------------------------------------------------

/// Read access to channel and blocked-edge definitions.
///
/// Each call returns the current contents of the store; callers that need a
/// consistent view for one pass read once and keep the result.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// All channel documents, one per source unit.
    async fn channels(&self) -> StorageResult<Vec<Sourced<ChannelDocument>>>;

    /// All blocked-edge documents.
    async fn blocked_edges(&self) -> StorageResult<Vec<Sourced<BlockedEdgeDocument>>>;
}

// ---------------------------------------------------------------------------
// VersionHistory
// ---------------------------------------------------------------------------

/// The commit that first added a version line to a source unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Full commit hash.
    pub hash: String,
    /// Committer timestamp.
    pub committer_time: DateTime<Utc>,
    /// Commit subject line.
    pub summary: String,
}

impl Attribution {
    /// First ten characters of the hash, as used in promotion messages.
    pub fn short_hash(&self) -> &str {
        &self.hash[..10.min(self.hash.len())]
    }
}

/// Version-control history of the store.
#[async_trait]
pub trait VersionHistory: Send + Sync {
    /// Map each version listed in `source` to the commit that introduced it.
    async fn first_appearances(&self, source: &str)
        -> StorageResult<HashMap<String, Attribution>>;
}

// ---------------------------------------------------------------------------
// ChannelWriter
// ---------------------------------------------------------------------------

/// Everything a writer needs to persist one promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    /// Target channel name.
    pub channel: String,
    /// Store location of the target channel.
    pub source: String,
    /// Version being appended.
    pub version: String,
    /// Branch the change is prepared on.
    pub branch: String,
    /// Commit subject.
    pub subject: String,
    /// Commit body.
    pub body: String,
}

/// Write access to channel definitions.
///
/// Guarantees:
/// - `append_version` fails with `StorageError::PromotionConflict` when the
///   version is already present; it never silently succeeds in that case.
#[async_trait]
pub trait ChannelWriter: Send + Sync {
    async fn append_version(&self, request: &PromotionRequest) -> StorageResult<()>;
}
