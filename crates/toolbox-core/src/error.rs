//! Error taxonomy of the toolbox and its process exit codes.

use std::path::PathBuf;

use thiserror::Error;
use toolbox_runtime::RuntimeError;
use toolbox_tools::ToolError;

/// Errors that can occur while running a diagnostic operation.
#[derive(Debug, Error)]
pub enum ToolboxError {
    /// No running container for the pod.
    #[error("container for '{0}' not found")]
    ContainerNotFound(String),

    /// Container init PID or Java PID could not be determined.
    #[error("pid not found: {0}")]
    PidNotFound(String),

    /// Container root filesystem could not be located.
    #[error("root path of container {0} not found")]
    RootPathNotFound(String),

    /// A diagnostic tool did not leave the expected output file behind.
    #[error("expected output file {} is missing", .0.display())]
    OutputMissing(PathBuf),

    /// Invalid environment configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Required host binary not in PATH.
    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    /// An external command failed.
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// Bad user input.
    #[error("{0}")]
    InvalidArgument(String),

    /// Neither crictl nor docker could be set up.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Container runtime error.
    #[error(transparent)]
    Runtime(RuntimeError),

    /// Tool download/install error.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for toolbox operations.
pub type Result<T> = std::result::Result<T, ToolboxError>;

impl ToolboxError {
    /// Process exit code for this error.
    ///
    /// 1 container missing (and anything unclassified), 2 PID missing,
    /// 3 root path missing, 4 output file missing.
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolboxError::ContainerNotFound(_) => 1,
            ToolboxError::PidNotFound(_) => 2,
            ToolboxError::RootPathNotFound(_) => 3,
            ToolboxError::OutputMissing(_) => 4,
            _ => 1,
        }
    }
}

impl From<RuntimeError> for ToolboxError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::ContainerNotFound(pod) => ToolboxError::ContainerNotFound(pod),
            RuntimeError::BinaryNotFound(bin) => ToolboxError::BinaryNotFound(bin),
            other => ToolboxError::Runtime(other),
        }
    }
}

impl From<reqwest::Error> for ToolboxError {
    fn from(e: reqwest::Error) -> Self {
        ToolboxError::Http(e.to_string())
    }
}
