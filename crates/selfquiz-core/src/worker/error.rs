use thiserror::Error;

use crate::quiz::ValidationError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File size exceeds {}MB limit.", whole_megabytes(.limit))]
    SizeLimitExceeded { limit: u64 },

    #[error("{0}")]
    Read(#[from] std::io::Error),

    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl IngestError {
    pub fn is_size_limit(&self) -> bool {
        matches!(self, IngestError::SizeLimitExceeded { .. })
    }
}

/// Size limits are reported in whole megabytes, rounded down.
fn whole_megabytes(bytes: &u64) -> u64 {
    bytes / 1024 / 1024
}

/// The host stopped listening for worker output.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Host response channel closed")]
pub struct ChannelClosed;
