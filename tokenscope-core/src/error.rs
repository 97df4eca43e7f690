//! Error types for tokenscope-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tokenscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The log root (e.g. `~/.claude/projects`) does not exist.
    ///
    /// This is the only fatal input condition; everything below the root
    /// degrades to skip-and-continue.
    #[error("log root not found: {0}")]
    MissingRoot(PathBuf),

    /// Scan pipeline error
    #[error("scan error: {0}")]
    Scan(String),

    /// Scan was cancelled via the external cancellation flag
    #[error("scan cancelled")]
    Cancelled,
}

/// Result type alias for tokenscope-core
pub type Result<T> = std::result::Result<T, Error>;
