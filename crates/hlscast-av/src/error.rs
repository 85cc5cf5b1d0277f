//! Error types for hlscast-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing an encoder run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source media is missing or unreadable.
    #[error("invalid source {}: {reason}", .path.display())]
    InvalidSource { path: PathBuf, reason: String },

    /// The subtitle file requested for burn-in is missing or unreadable.
    #[error("invalid subtitle file {}: {reason}", .path.display())]
    InvalidSubtitle { path: PathBuf, reason: String },

    /// Every ranked encoder backend has been excluded.
    #[error("no encoder backend available (excluded: {})", format_excluded(.excluded))]
    NoEncoderAvailable { excluded: Vec<String> },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An unrecognised encoder backend name.
    #[error("unknown encoder backend: {0}")]
    UnknownBackend(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workspace error.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_excluded(excluded: &[String]) -> String {
    if excluded.is_empty() {
        "none".to_string()
    } else {
        excluded.join(", ")
    }
}

impl Error {
    /// Create an invalid source error.
    pub fn invalid_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid subtitle error.
    pub fn invalid_subtitle(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSubtitle {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }
}
