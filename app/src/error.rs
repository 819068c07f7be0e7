use thiserror::Error;
use track_index::LoadError;

use crate::collect::CollectError;

/// Errors that abort a whole run. Per-file problems never surface here; they
/// are recorded in the [`RunSummary`](crate::summary::RunSummary) instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error("failed to load GPX track: {0}")]
    Track(#[from] LoadError),
    #[error("no files found to process")]
    NoFiles,
    #[error("no {kind} files to process")]
    NoUsableFiles { kind: String },
    #[error("no candidate series found")]
    NoCandidates,
    #[error("run cancelled")]
    Cancelled,
}
