//! Error types for Viewtrace Core

use crate::types::ViewHandle;
use thiserror::Error;

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Analytics error types
///
/// Nothing here is fatal to the host process; the worst-case failure mode is
/// a missed analytics report.
#[derive(Error, Debug)]
pub enum Error {
    // Dispatch errors
    #[error("handle {handle} did not resolve to a live player view")]
    StaleHandle { handle: ViewHandle },

    #[error("command channel closed")]
    ChannelClosed,

    #[error("timed out waiting for the player to respond")]
    ResponseTimeout,

    // Session errors
    #[error("analytics session not initialized")]
    NotInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Sink errors
    #[error("analytics sink rejected the report: {0}")]
    Sink(String),

    #[error("beacon transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns true if the caller misused the API rather than hitting a
    /// runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Returns the error code for logging and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::StaleHandle { .. } => "STALE_HANDLE",
            Error::ChannelClosed => "CHANNEL_CLOSED",
            Error::ResponseTimeout => "RESPONSE_TIMEOUT",
            Error::NotInitialized => "NOT_INITIALIZED",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::Sink(_) => "SINK",
            Error::Transport(_) => "TRANSPORT",
        }
    }
}
