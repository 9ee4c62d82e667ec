use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to create cache directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to replace cache file '{0}'")]
    Persist(PathBuf, #[source] tempfile::PersistError),

    // A corrupt whitelist is surfaced rather than silently recreated.
    #[error("Cache file '{0}' is not a valid whitelist")]
    Decode(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode whitelist for '{0}'")]
    Encode(String, #[source] serde_json::Error),

    #[error("Invalid cache target '{0}': must be non-empty without path separators")]
    InvalidTarget(String),

    #[error("Invalid size string '{0}'")]
    InvalidSize(String),

    #[error("Background cache task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
