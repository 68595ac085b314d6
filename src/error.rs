//! Error taxonomy shared by every pipeline stage.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results produced by the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by ingestion, encoding, training and persistence.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The HN API request failed at the transport or HTTP-status level.
    #[error("remote fetch failed for {url}: {source}")]
    RemoteFetch {
        /// Requested URL.
        url: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The HN API answered with a body that is not the expected JSON.
    #[error("malformed remote payload from {url}: {source}")]
    RemoteDecode {
        /// Requested URL.
        url: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A classifier name is not present in the registry.
    #[error("unknown classifier kind: {0}")]
    UnknownClassifierKind(String),

    /// Persisted vocabulary or classifier bytes could not be parsed.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// A length-prefixed container field runs past the end of the buffer.
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow {
        /// Bytes the field declared.
        needed: u64,
        /// Bytes left in the buffer.
        remaining: u64,
    },

    /// A training option is missing or out of range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Reading or writing a flat file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a `CorruptPayload` error from anything displayable.
    pub fn corrupt(message: impl std::fmt::Display) -> Self {
        Self::CorruptPayload(message.to_string())
    }
}
