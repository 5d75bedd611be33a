use std::io;
use thiserror::Error;

/// Errors surfaced by the worker host and the orchestrator.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker could not resolve the root package.
    #[error("{code}: {message}")]
    Failed { code: String, message: String },

    /// The worker hit an unrecoverable error and is gone.
    #[error("worker died: {0}")]
    Fatal(String),

    /// The host was torn down while the request was pending.
    #[error("worker host shut down")]
    Shutdown,

    /// A request was issued after the worker died or was shut down.
    #[error("worker is not running")]
    Dead,

    #[error("protocol error: {0}")]
    Protocol(#[from] io::Error),

    #[error(transparent)]
    Core(#[from] scriptbridge_core::Error),
}

impl WorkerError {
    /// The stable code of a [`WorkerError::Failed`].
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Failed { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<scriptbridge_core::TransformError> for WorkerError {
    fn from(e: scriptbridge_core::TransformError) -> Self {
        Self::Core(e.into())
    }
}
