use thiserror::Error;

use crate::network::FetchError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Precache failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },
}
