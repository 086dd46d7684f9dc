//! Error taxonomy for the answering pipeline.
//!
//! Every fallible core operation returns one of these kinds so callers can
//! decide between fallback and propagation explicitly, instead of guessing
//! whether an empty result meant "no data" or "something broke".

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input (empty question, bad parameters).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chunker parameters that would produce a non-advancing window.
    #[error("invalid chunk config: chunk_size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidChunkConfig { chunk_size: usize, overlap: usize },

    /// Text could not be extracted from a stored file.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// The embedding provider failed or returned malformed vectors.
    #[error("embedding provider: {0}")]
    Embedding(String),

    /// The similarity-search step failed.
    #[error("retrieval: {0}")]
    Retrieval(String),

    /// The generation provider failed.
    #[error("generation provider: {0}")]
    Generation(String),

    /// Index or memory-log load/save failure.
    #[error("persistence: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}
