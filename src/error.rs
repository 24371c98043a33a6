//! Error types for the ingestion pipeline.
//!
//! Archive errors abort the source being processed. Decode and
//! malformed-source errors are per-file: the pipeline logs them and moves
//! on to the next work.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("could not decode {path} (tried {tried})")]
    Decode { path: PathBuf, tried: String },

    #[error("malformed source: {0}")]
    MalformedSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl PipelineError {
    /// Whether the batch should continue with the next file after this error.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode { .. } | PipelineError::MalformedSource(_)
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
