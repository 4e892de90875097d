//! Error types for the share pipeline

use thiserror::Error;

use crate::extract::RequiredField;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while observing, extracting, rendering or exporting
#[derive(Error, Debug)]
pub enum Error {
    /// A selector string could not be parsed
    #[error("Invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    /// The node is not (or no longer) part of the document
    #[error("Node {0} is detached or unknown")]
    Detached(u64),

    /// A readiness probe never succeeded within its attempt budget
    #[error("Not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    /// A wait was cancelled by its owner
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// One or more required post fields were missing after extraction
    #[error("Post extraction incomplete, missing: {}", format_missing(.missing))]
    ExtractionIncomplete { missing: Vec<RequiredField> },

    /// Failed to render or rasterize the card
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    ImageError(String),

    /// Clipboard write rejected
    #[error("Clipboard write failed: {0}")]
    ClipboardError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A share action attempted an illegal state change
    #[error("Invalid share state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn format_missing(missing: &[RequiredField]) -> String {
    missing
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
