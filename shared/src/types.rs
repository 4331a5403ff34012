//! Error taxonomy shared by every layer.
//!
//! Each variant maps to one user-visible error kind. Messages are meant to be
//! shown to callers as-is, so they never carry backtraces or raw payloads.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Backend or input failure while turning text into vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Inventory fetch or embedding failed while building a user index.
    #[error("index build failed for user {user_id}: {reason}")]
    IndexBuild { user_id: String, reason: String },

    /// Malformed retrieval request, such as `k == 0`.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The user has no servable index and building one failed.
    #[error("no index available for user {user_id}: {reason}")]
    IndexUnavailable { user_id: String, reason: String },

    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("generation failed: {0}")]
    Generation(String),

    /// Generator output did not match the shape the request variant expects.
    #[error("could not parse generator output: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inventory store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable, serializable discriminant used in structured error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Embedding,
    IndexBuild,
    Retrieval,
    IndexUnavailable,
    GenerationTimeout,
    Generation,
    Parse,
    InvalidInput,
    Store,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Embedding => "embedding",
            ErrorKind::IndexBuild => "index_build",
            ErrorKind::Retrieval => "retrieval",
            ErrorKind::IndexUnavailable => "index_unavailable",
            ErrorKind::GenerationTimeout => "generation_timeout",
            ErrorKind::Generation => "generation",
            ErrorKind::Parse => "parse",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Store => "store",
            ErrorKind::Config => "config",
        }
    }
}

impl Error {
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn index_build(user_id: &str, reason: impl std::fmt::Display) -> Self {
        Self::IndexBuild {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn index_unavailable(user_id: &str, reason: impl std::fmt::Display) -> Self {
        Self::IndexUnavailable {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Embedding(_) => ErrorKind::Embedding,
            Error::IndexBuild { .. } => ErrorKind::IndexBuild,
            Error::Retrieval(_) => ErrorKind::Retrieval,
            Error::IndexUnavailable { .. } => ErrorKind::IndexUnavailable,
            Error::GenerationTimeout(_) => ErrorKind::GenerationTimeout,
            Error::Generation(_) => ErrorKind::Generation,
            Error::Parse(_) => ErrorKind::Parse,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Store(_) => ErrorKind::Store,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the caller may reasonably retry the whole request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::GenerationTimeout(_) | Error::Generation(_) | Error::IndexUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
