#![forbid(unsafe_code)]

//! Error taxonomy shared by every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BsmhError>;

#[derive(Debug, Error)]
pub enum BsmhError {
    /// Transport failure, non-success status or a body we could not decode.
    #[error("request to {url} failed: {reason}")]
    Remote { url: String, reason: String },

    #[error("map {hash} no longer exists on the catalog")]
    NotFound { hash: String },

    #[error("catalog entry for {hash} has no {field}")]
    MissingField { hash: String, field: &'static str },

    #[error("{0}")]
    Config(String),

    #[error("could not unpack {}: {source}", .archive.display())]
    Unpack {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read playlist {}: {source}", .path.display())]
    Playlist {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl BsmhError {
    pub(crate) fn remote(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Remote {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a failure scoped to a single playlist entry may be reported and
    /// skipped instead of aborting the batch.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Playlist { .. })
    }
}
