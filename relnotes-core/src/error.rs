use std::path::PathBuf;
use thiserror::Error;

/// Failures persisting the translation cache. Read failures never surface:
/// an unreadable store is treated as empty.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write translation cache at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove translation cache at {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize translation cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation service error: {0}")]
    Service(String),

    #[error("translation service returned an empty response")]
    EmptyResponse,

    #[error("translation service returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    #[cfg(feature = "openai")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read changelog snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse changelog snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no valid languages requested")]
    NoLanguages,

    #[error("content source unavailable and no previous snapshot: {0}")]
    SourceUnavailable(#[source] SourceError),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}
