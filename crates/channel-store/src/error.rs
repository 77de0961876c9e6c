//! Error types for channel-store

use thiserror::Error;

/// Errors that can occur while reading or writing channel data
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error while touching a store file
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A store file could not be parsed
    #[error("failed to load YAML from {path}: {message}")]
    Parse { path: String, message: String },

    /// A file with an unexpected extension sits in a strict directory
    #[error("invalid filename: {path} (allowed extensions: {allowed})")]
    UnexpectedFile { path: String, allowed: String },

    /// A git command failed
    #[error("git error: {0}")]
    Git(String),

    /// The version is already present in the target channel
    #[error("version {version} has already been promoted to {channel} in {location}")]
    PromotionConflict {
        version: String,
        channel: String,
        location: String,
    },

    /// No history or document exists for the requested source
    #[error("not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
