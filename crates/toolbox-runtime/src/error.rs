//! Error types for container runtime operations.

use thiserror::Error;

/// Errors that can occur while talking to a container runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Runtime CLI not found in PATH.
    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    /// No running container matched the pod or container name.
    #[error("container for '{0}' not found")]
    ContainerNotFound(String),

    /// Runtime command exited with a failure status.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Inspect or list output was not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output had an unexpected shape.
    #[error("parse error: {0}")]
    ParseError(String),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
