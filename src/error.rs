//! Error types and exit codes for smrp-session

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to decode frame: {message}")]
    Decode { message: String },

    #[error("Frame has no \"type\" tag")]
    MissingTag,

    #[error("Invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("Invalid endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("IO error at {path}: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("Unknown candidate: {id}")]
    UnknownCandidate { id: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Request {request_id} failed: {message}")]
    RequestFailed { request_id: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl SessionError {
    /// Convert error to an exit code for the CLI:
    /// - 1: IO / configuration error
    /// - 2: Invalid endpoint or settings
    /// - 3: Protocol decode failure
    /// - 4: Candidate lookup failure
    /// - 5: Transport / connection error
    /// - 6: The server reported a request failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::IoError { .. } | Self::ConfigError { .. } | Self::Output(_) => {
                ExitCode::from(1)
            }
            Self::InvalidEndpoint { .. } | Self::InvalidSettings { .. } => ExitCode::from(2),
            Self::Decode { .. } | Self::MissingTag | Self::InvalidEvent { .. } | Self::Json(_) => {
                ExitCode::from(3)
            }
            Self::UnknownCandidate { .. } => ExitCode::from(4),
            Self::Transport { .. } | Self::NotConnected => ExitCode::from(5),
            Self::RequestFailed { .. } => ExitCode::from(6),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
