//! Error types for every stage of the feed pipeline.

use thiserror::Error;

use crate::js_engine::EngineError;

/// Errors produced while turning an unsigned API URL into a signed request.
#[derive(Debug, Error)]
pub enum SignError {
    /// The script engine failed to load the landing page, evaluate a script,
    /// or returned a value of the wrong type.
    #[error("signing engine failure: {0}")]
    EngineFailure(#[from] EngineError),
    /// The remote signing endpoint could not be reached.
    #[error("signing endpoint unreachable: {0}")]
    EndpointUnreachable(#[source] reqwest::Error),
    /// The remote signing endpoint answered, but not with a usable signature.
    #[error("signing endpoint rejected the request: {0}")]
    EndpointRejected(String),
    #[error("invalid url to sign: {0}")]
    InvalidUrl(String),
}

impl SignError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::EndpointRejected(reason.into())
    }
}

/// Errors produced while fetching and decoding one profile page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// Non-success HTTP status, non-zero platform status code, or no items.
    #[error("empty response: {0}")]
    EmptyResponse(String),
}

impl FetchError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyResponse(msg.into())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors produced by the settings store and the feed store built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors surfaced by a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a synchronization is already in progress")]
    AlreadyInProgress,
    #[error("signing failed for profile {profile}: {source}")]
    SignFailed {
        profile: String,
        #[source]
        source: SignError,
    },
    #[error("fetch failed for profile {profile}: {source}")]
    FetchFailed {
        profile: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to persist feed: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_already_in_progress(&self) -> bool {
        matches!(self, Self::AlreadyInProgress)
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
