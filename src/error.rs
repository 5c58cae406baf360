//! Error types for the swing analyzer library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera acquisition failures reported by a [`crate::source::CameraProvider`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user or the platform refused camera access
    #[error("camera permission denied")]
    PermissionDenied,

    /// No capture device matched the requested facing mode
    #[error("no camera found")]
    NotFound,

    /// The device exists but another process holds it
    #[error("camera already in use")]
    InUse,

    /// Any other device failure
    #[error("camera failure: {0}")]
    Other(String),
}

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Camera device or permission failure
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    /// Video could not be decoded or has an unsupported format
    #[error("Decode error: {0}")]
    Decode(String),

    /// A bounded wait (metadata load) expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The operation was superseded by a newer one
    #[error("Operation cancelled")]
    Cancelled,

    /// Pose model loading or inference failed
    #[error("Model error: {0}")]
    Model(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of a pose track failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pose track content violates the schema
    #[error("Pose track error: {0}")]
    PoseTrack(String),

    /// Pose track store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The owning component was disposed
    #[error("Component has been disposed")]
    Disposed,
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class surfaced through state streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureCategory {
    Device,
    Decode,
    Timeout,
    Model,
    Storage,
    Unknown,
}

/// Failure payload carried by [`crate::source::SourceState::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub category: FailureCategory,
    /// Short user-facing status line, never raw error text
    pub message: String,
}

impl Error {
    /// True when the error only signals that a newer operation superseded this one
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Failure class used by state streams
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Camera(_) => FailureCategory::Device,
            Self::Decode(_) => FailureCategory::Decode,
            Self::Timeout(_) => FailureCategory::Timeout,
            Self::Model(_) => FailureCategory::Model,
            Self::Io(_) | Self::Json(_) | Self::PoseTrack(_) | Self::Storage(_) => FailureCategory::Storage,
            Self::Cancelled
            | Self::InvalidInput(_)
            | Self::InvalidState(_)
            | Self::ConfigError(_)
            | Self::Disposed => FailureCategory::Unknown,
        }
    }

    /// Short human-readable status string for end users
    pub fn user_message(&self) -> String {
        match self {
            Self::Camera(CameraError::PermissionDenied) => "Camera access was denied".to_string(),
            Self::Camera(CameraError::NotFound) => "No camera was found".to_string(),
            Self::Camera(CameraError::InUse) => "Camera is being used by another app".to_string(),
            Self::Camera(CameraError::Other(_)) => "Could not start the camera".to_string(),
            Self::Decode(_) => "This video format is not supported".to_string(),
            Self::Timeout(_) => "Timed out while loading the video".to_string(),
            Self::Model(_) => "Pose detection failed".to_string(),
            Self::Io(_) | Self::Storage(_) => "Could not read or save pose data".to_string(),
            Self::Json(_) | Self::PoseTrack(_) => "Pose data file is invalid".to_string(),
            Self::Cancelled => "Cancelled".to_string(),
            Self::InvalidInput(_) => "Invalid input".to_string(),
            Self::InvalidState(_) => "That action is not available right now".to_string(),
            Self::ConfigError(_) => "Invalid configuration".to_string(),
            Self::Disposed => "Session has ended".to_string(),
        }
    }

    /// Build the state-stream payload for this error
    pub fn failure(&self) -> SourceFailure {
        SourceFailure {
            category: self.category(),
            message: self.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_errors_map_to_device_category() {
        let err = Error::from(CameraError::PermissionDenied);
        assert_eq!(err.category(), FailureCategory::Device);
        assert_eq!(err.user_message(), "Camera access was denied");
    }

    #[test]
    fn test_timeout_message_differs_from_decode() {
        let timeout = Error::Timeout("metadata".into()).user_message();
        let decode = Error::Decode("bad codec".into()).user_message();
        assert_ne!(timeout, decode);
    }

    #[test]
    fn test_user_message_hides_raw_text() {
        let err = Error::Model("CUDA_ERROR_OUT_OF_MEMORY at 0x7f".into());
        let failure = err.failure();
        assert_eq!(failure.category, FailureCategory::Model);
        assert!(!failure.message.contains("CUDA"));
    }

    #[test]
    fn test_cancelled_is_flagged() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Disposed.is_cancelled());
    }
}
