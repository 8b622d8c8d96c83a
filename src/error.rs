//! Error handling for Repitch
//!
//! Every engine or session failure is reported through [`EngineError`].
//! None of them is process-fatal: the transport always falls back to Idle
//! before an error reaches the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Repitch operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for Repitch operations
#[derive(Error, Debug)]
pub enum EngineError {
    // Engine Errors
    #[error("Audio engine could not start: {reason}")]
    EngineStart {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Graph configuration rejected: {reason}")]
    EngineConfig { reason: String },

    #[error("Offline render failed: {reason}")]
    Render {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Session Errors
    #[error("Malformed session notification: {reason}")]
    SessionInterruption { reason: String },

    // Transport Errors
    #[error("Cannot {operation} while {mode}")]
    InvalidTransition {
        operation: &'static str,
        mode: String,
    },

    // Source Errors
    #[error("Audio source unavailable: {path}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Control Errors
    #[error("Control loop is not running")]
    Disconnected,

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for an [`EngineError::EngineStart`] without an underlying cause
    pub fn engine_start(reason: impl Into<String>) -> Self {
        EngineError::EngineStart {
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for an [`EngineError::EngineConfig`]
    pub fn engine_config(reason: impl Into<String>) -> Self {
        EngineError::EngineConfig {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`EngineError::Render`] without an underlying cause
    pub fn render(reason: impl Into<String>) -> Self {
        EngineError::Render {
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::EngineStart { .. } => "ENGINE_START",
            EngineError::EngineConfig { .. } => "ENGINE_CONFIG",
            EngineError::Render { .. } => "RENDER",
            EngineError::SessionInterruption { .. } => "SESSION_INTERRUPTION",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            EngineError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            EngineError::Disconnected => "DISCONNECTED",
            EngineError::InvalidConfig { .. } => "INVALID_CONFIG",
            EngineError::Wav(_) => "WAV_ERROR",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Json(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the failed operation can simply be attempted again
    ///
    /// The transport is back in Idle after every one of these, so a retry
    /// starts from a consistent state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::EngineStart { .. }
                | EngineError::EngineConfig { .. }
                | EngineError::Render { .. }
                | EngineError::SessionInterruption { .. }
                | EngineError::InvalidTransition { .. }
        )
    }
}
