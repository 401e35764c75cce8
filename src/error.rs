use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single HTTP GET issued by a [`ContentFetcher`](crate::fetcher::ContentFetcher).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("response from {url} is not valid UTF-8")]
    Decode { url: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Everything that can abort an asset pass or a snapshot cycle.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("cannot create directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("cannot name asset {reference}: {reason}")]
    Naming { reference: String, reason: String },

    #[error("cannot write {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;
