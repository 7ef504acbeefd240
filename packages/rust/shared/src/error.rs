//! Error types for kbmirror.
//!
//! Library crates use [`MirrorError`] via `thiserror`.
//! The cli app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all kbmirror operations.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Configuration loading or validation error, including placeholder
    /// credentials and an unfetchable root knowledge base.
    #[error("config error: {message}")]
    Config { message: String },

    /// The API rejected our token (HTTP 401).
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The token lacks permission for an endpoint (HTTP 403).
    #[error("permission denied on {path}")]
    Forbidden { path: String },

    /// Any other non-success HTTP status.
    #[error("HTTP {status} on {path}")]
    Http { status: u16, path: String },

    /// Network/transport error while talking to the API.
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not deserialize into the expected shape.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML or TOML serialization error.
    #[error("serialize error: {0}")]
    Serialize(String),

    /// Malformed category tree: a parent cycle or implausible nesting depth.
    #[error("malformed hierarchy: {message}")]
    Hierarchy { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a hierarchy error from any displayable message.
    pub fn hierarchy(msg: impl Into<String>) -> Self {
        Self::Hierarchy {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run.
    ///
    /// Fatal errors are broken credentials/config and permission denials:
    /// everything the operator has to fix before a rerun can succeed. All
    /// other errors are recoverable; walkers log them and skip the affected
    /// item. Call sites that want softer handling for a specific endpoint
    /// (tags, attachments) match the variant before consulting this gate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Auth(_) | Self::Forbidden { .. }
        )
    }
}
