//! Error taxonomy for Compost.

use thiserror::Error;

/// Errors produced while detecting an environment or reconciling comments.
#[derive(Error, Debug)]
pub enum CompostError {
    /// The detector does not apply to the current environment.
    ///
    /// The detector chain treats this as "try the next detector"; every other
    /// variant aborts the chain.
    #[error("{0}")]
    DetectionSkipped(String),

    /// The detector applies but the environment is misconfigured.
    #[error("detection failed: {0}")]
    Detection(String),

    /// No registered detector recognised the environment.
    #[error("could not detect environment")]
    EnvironmentNotDetected,

    /// No platform handler is registered for the pair.
    #[error("{platform} ({target_type}) is not supported")]
    Unsupported {
        platform: String,
        target_type: String,
    },

    /// The platform lacks the requested capability.
    #[error("{operation} is not implemented for {platform}")]
    NotImplemented { platform: String, operation: String },

    /// The platform API answered with a failure status.
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response.
    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    /// A comment from another platform was handed to a backend.
    #[error("expected a {expected} comment")]
    CommentMismatch { expected: &'static str },

    /// Invalid user input, raised before any network activity.
    #[error("{0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompostError {
    /// True for the soft "does not apply" detection signal.
    pub fn is_detection_skipped(&self) -> bool {
        matches!(self, CompostError::DetectionSkipped(_))
    }

    /// True when the platform lacks the requested capability.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, CompostError::NotImplemented { .. })
    }
}

/// Result type for Compost operations.
pub type Result<T> = std::result::Result<T, CompostError>;
