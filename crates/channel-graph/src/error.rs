//! Error types for channel-graph

use channel_remote::RemoteError;
use channel_store::StorageError;
use thiserror::Error;

/// Errors produced while loading, evaluating, or promoting channels.
#[derive(Error, Debug)]
pub enum PromoterError {
    /// A string does not follow the `major.minor.patch[-pre][+build]` grammar.
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    /// Two store documents declare the same channel name.
    #[error("multiple definitions for {name}: {first} and {second}")]
    DuplicateChannel {
        name: String,
        first: String,
        second: String,
    },

    /// A channel names a feeder that is not defined.
    #[error("channel {channel} feeds from {feeder}, which is not defined")]
    MissingFeeder { channel: String, feeder: String },

    /// Following feeders from a channel leads back to it.
    #[error("feeder cycle detected involving channels: {channels:?}")]
    FeederCycle { channels: Vec<String> },

    /// The feeder stanza of a channel cannot be used.
    #[error("invalid feeder for {channel}: {reason}")]
    InvalidFeeder { channel: String, reason: String },

    /// A blocked-edge document fails validation.
    #[error("invalid blocked edge {path}: {reason}")]
    InvalidBlockedEdge { path: String, reason: String },

    /// Release ordering between channels of one line is broken.
    #[error("channel order violation: {0}")]
    ChannelOrder(String),

    /// Update graph retrieval failed after the collaborator's retries.
    #[error("graph service error: {0}")]
    GraphService(#[source] RemoteError),

    /// Any other remote collaborator failure.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Store, history, or writer failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The feeder history has no record of a candidate version.
    #[error("no history for {version} in {path}")]
    MissingAttribution { version: String, path: String },

    /// The version is already present in the target channel.
    #[error("version {version} has already been promoted to {channel}")]
    PromotionConflict { version: String, channel: String },

    /// A risk declared for the previous version is not carried forward.
    #[error("{risk} declared for {previous} still affects {version}; {remedy}")]
    RiskContinuityViolation {
        risk: String,
        previous: String,
        version: String,
        remedy: String,
    },
}

/// Result type for channel-graph operations
pub type Result<T> = std::result::Result<T, PromoterError>;

impl PromoterError {
    /// Configuration errors make the channel graph unusable for a whole pass.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PromoterError::DuplicateChannel { .. }
                | PromoterError::MissingFeeder { .. }
                | PromoterError::FeederCycle { .. }
                | PromoterError::InvalidFeeder { .. }
                | PromoterError::InvalidBlockedEdge { .. }
        )
    }
}
