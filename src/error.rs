//! Central error types for ReelCap.
//!
//! This module provides typed errors for better error handling across the codebase.

use thiserror::Error;

/// Main error type for ReelCap operations.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Screen blit failed (device lost, region invalid). Fatal for the session:
    /// silently skipping a frame would desynchronize timestamps.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Video encoder sink failed
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Frame rescale/reformat failed
    #[error("Rescale error: {0}")]
    Rescale(String),

    /// Encoder settings rejected (odd dimensions, zero fps, ...)
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// FFmpeg binary not found on this machine
    #[error("FFmpeg not found. Please ensure FFmpeg is installed or bundled.")]
    FfmpegNotFound,

    /// Filesystem operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Session metadata serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session lifecycle misuse (started twice, finished before start)
    #[error("Session error: {0}")]
    Session(String),

    /// A pipeline thread panicked
    #[error("Pipeline thread panicked: {0}")]
    ThreadPanic(String),
}

impl From<String> for RecorderError {
    fn from(msg: String) -> Self {
        RecorderError::Session(msg)
    }
}

impl From<&str> for RecorderError {
    fn from(msg: &str) -> Self {
        RecorderError::Session(msg.to_string())
    }
}

/// Type alias for Results using RecorderError.
pub type RecorderResult<T> = Result<T, RecorderError>;
