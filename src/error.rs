//! Error types for connect-dl
//!
//! This module provides the error taxonomy for the acquisition pipeline:
//! - One [`Error`] enum carrying per-stage context (URL, HTTP status, archive path, encoder)
//! - A flat, serializable [`ErrorKind`] reported to callers in every [`JobResult`](crate::JobResult)
//! - Machine-readable error codes for logging and programmatic handling

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for connect-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for connect-dl
///
/// Each pipeline stage fails with its own variant so the orchestrator can
/// report exactly which step of a job went wrong.
#[derive(Debug, Error)]
pub enum Error {
    /// The input URL does not contain a recognizable session identifier
    #[error("invalid recording URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as supplied by the caller
        url: String,
        /// Why resolution failed
        reason: String,
    },

    /// Network-level failure while fetching a page or asset
    #[error("fetch failed for {url}: {reason}")]
    Fetch {
        /// The URL being fetched
        url: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
        /// Human-readable cause
        reason: String,
    },

    /// HTTP client error (timeouts, resets, TLS); classified by [`IsRetryable`](crate::retry::IsRetryable)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a login or error page instead of the expected payload
    #[error("authentication required for {url} (HTTP {status})")]
    AuthRequired {
        /// The URL that returned the error page
        url: String,
        /// Status code the server declared (often 200)
        status: u16,
    },

    /// The archive is readable but lacks a required stream, or has too many
    #[error("incomplete asset {archive}: {reason}")]
    IncompleteAsset {
        /// Archive that was inspected
        archive: PathBuf,
        /// What is missing or ambiguous
        reason: String,
    },

    /// The archive or one of its media entries cannot be parsed
    #[error("corrupt asset {path}: {reason}")]
    CorruptAsset {
        /// The archive or extracted entry that failed to parse
        path: PathBuf,
        /// Parser diagnostics
        reason: String,
    },

    /// The encoder process failed, timed out, or produced an unusable output
    #[error("mux failed with {encoder} encoder: {reason}")]
    MuxFailure {
        /// Name of the strategy that was running (e.g. "nvenc", "software")
        encoder: String,
        /// Exit status / stderr tail / timeout description
        reason: String,
    },

    /// The job was cancelled before it could complete
    #[error("job cancelled")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Insufficient disk space for the archive and its extracted streams
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// External tool could not be located or started (ffmpeg, ffprobe)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flat classification of an [`Error`], reported to callers per job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input URL (local, non-retryable)
    InvalidUrl,
    /// Transient network fault that survived the retry budget, or a non-auth HTTP failure
    Fetch,
    /// Error page where a payload was expected; needs new credentials
    AuthRequired,
    /// Archive is missing a required stream
    IncompleteAsset,
    /// Archive or media entry is structurally invalid
    CorruptAsset,
    /// Encoder invocation failed after the software fallback
    MuxFailure,
    /// Job was cancelled
    Cancelled,
    /// Invalid configuration
    Config,
    /// Not enough disk space
    InsufficientSpace,
    /// ffmpeg/ffprobe missing or not startable
    ExternalTool,
    /// Local filesystem failure
    Io,
}

impl ErrorKind {
    /// Machine-readable code (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::Fetch => "fetch",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::IncompleteAsset => "incomplete_asset",
            ErrorKind::CorruptAsset => "corrupt_asset",
            ErrorKind::MuxFailure => "mux_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::InsufficientSpace => "insufficient_space",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for the per-job result
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Error::Fetch { .. } | Error::Network(_) => ErrorKind::Fetch,
            Error::AuthRequired { .. } => ErrorKind::AuthRequired,
            Error::IncompleteAsset { .. } => ErrorKind::IncompleteAsset,
            Error::CorruptAsset { .. } => ErrorKind::CorruptAsset,
            Error::MuxFailure { .. } => ErrorKind::MuxFailure,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config { .. } => ErrorKind::Config,
            Error::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            Error::ExternalTool(_) => ErrorKind::ExternalTool,
            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// True when the server reported the requested resource as absent (404/410)
    ///
    /// The orchestrator uses this to move on to the next manifest candidate.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Fetch {
                status: Some(404 | 410),
                ..
            }
        )
    }
}
