//! Error types for the tool cache.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching or installing a tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// No release exists for this CPU architecture.
    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    /// HTTP request failed.
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("failed to download {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Archive extraction failed.
    #[error("failed to extract {archive}: {reason}")]
    Extract { archive: PathBuf, reason: String },

    /// Entry point missing after install.
    #[error("{tool} entry point {path} missing after install")]
    MissingEntryPoint { tool: String, path: PathBuf },

    /// Failed to create or write a file in the cache.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tool cache operations.
pub type Result<T> = std::result::Result<T, ToolError>;
