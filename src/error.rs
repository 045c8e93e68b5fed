//! Error types for the buddy assistant.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`BuddyError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication with the hosted model failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the hosted model failed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response was interrupted or malformed.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Speech recognition engine refused or failed an operation.
    pub const RECOGNITION_FAILED: &str = "RECOGNITION_FAILED";

    /// Attachment could not be read or is not an accepted type.
    pub const ATTACHMENT_INVALID: &str = "ATTACHMENT_INVALID";

    /// Filesystem I/O failed.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum BuddyError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Authentication failed.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Request to the hosted model failed.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Streaming response encountered an error.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    Stream(String),

    /// Speech recognition error.
    #[error("[{}] {}", error_codes::RECOGNITION_FAILED, .0)]
    Recognition(String),

    /// Attachment error.
    #[error("[{}] {}", error_codes::ATTACHMENT_INVALID, .0)]
    Attachment(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl BuddyError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Stream(_) => error_codes::STREAM_FAILED,
            Self::Recognition(_) => error_codes::RECOGNITION_FAILED,
            Self::Attachment(_) => error_codes::ATTACHMENT_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Auth(m)
            | Self::Request(m)
            | Self::Stream(m)
            | Self::Recognition(m)
            | Self::Attachment(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BuddyError>;
