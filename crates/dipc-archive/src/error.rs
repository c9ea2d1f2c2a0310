//! Error taxonomy for archive validation and extraction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a valid zip archive: {0}")]
    InvalidArchive(String),

    #[error("archive contains {found} entries, exceeding the limit of {limit}")]
    TooManyFiles { found: usize, limit: usize },

    #[error("archive rejected as a zip bomb: {reason}")]
    ZipBomb { reason: String },

    #[error("archive contains no extractable entries")]
    EmptyArchive,

    #[error("i/o error during archive processing: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether retrying extraction of the same archive could plausibly
    /// succeed. All current variants describe the archive itself, so
    /// none are retryable.
    pub fn retryable(&self) -> bool {
        false
    }
}
