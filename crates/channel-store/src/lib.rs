//! Channel-Store: document store for the channel promoter
//!
//! This crate reads and writes the YAML documents that define release
//! channels and blocked update edges, and attributes channel versions to the
//! commits that introduced them.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: faithful document I/O. Versions are plain strings here; ordering
//! and validation live in `channel-graph`.
//!
//! ## Key Components
//!
//! - `FsChannelStore`: loads `channels/`, `internal-channels/`, `blocked-edges/`
//! - `GitBlameHistory`: version to first-parent commit attribution
//! - `GitChannelWriter`: branch, append, commit, push

mod documents;
mod error;
pub mod fakes;
pub mod fs_store;
mod git;
pub mod git_history;
pub mod git_writer;
pub mod storage_traits;

pub use documents::{BlockedEdgeDocument, ChannelDocument, FeederDocument, Sourced};
pub use error::StorageError;
pub use fs_store::FsChannelStore;
pub use git_history::GitBlameHistory;
pub use git_writer::{GitChannelWriter, UpstreamConfig};
pub use storage_traits::{
    Attribution, ChannelSource, ChannelWriter, PromotionRequest, StorageResult, VersionHistory,
};
