use std::path::PathBuf;
use thiserror::Error;

use crate::pkg::PkgError;
use crate::transform::TransformError;

/// Core error type for scriptbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Package(#[from] PkgError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Resolution cache at {path} is unreadable: {message}")]
    Cache { path: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
