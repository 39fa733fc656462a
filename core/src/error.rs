//! Structured error types for reality-parser
//!
//! Setup failures are returned synchronously from `process`; failures that
//! happen once the engine is running only ever reach the caller through the
//! progress sink.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineError;

/// Primary error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    // =========================================================================
    // Setup Errors (returned from `process`)
    // =========================================================================
    /// The platform cannot run the reconstruction engine
    #[error("reconstruction is not supported on this platform")]
    UnsupportedPlatform,

    /// A pre-existing file at the destination could not be removed
    #[error("cannot replace destination {path}: {source}")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine rejected the input directory or configuration
    #[error("error creating session: {0}")]
    SessionCreationFailed(#[source] EngineError),

    /// The engine rejected the process command
    #[error("process command was rejected: {0}")]
    ProcessingStartFailed(#[source] EngineError),

    /// Another session is still running on this orchestrator
    #[error("a reconstruction session is already active")]
    SessionAlreadyActive,

    // =========================================================================
    // Runtime Errors (delivered through the progress sink)
    // =========================================================================
    /// The engine reported an error for the submitted request
    #[error("request had an error: {message}")]
    ProcessingFailed { message: String },

    /// The event stream itself failed
    #[error("event stream failed: {message}")]
    StreamTransportFailed { message: String },
}

impl SessionError {
    /// Check if the error aborts `process` before any event is consumed
    pub fn is_setup_error(&self) -> bool {
        match self {
            Self::UnsupportedPlatform
            | Self::DestinationUnwritable { .. }
            | Self::SessionCreationFailed(_)
            | Self::ProcessingStartFailed(_)
            | Self::SessionAlreadyActive => true,

            Self::ProcessingFailed { .. } | Self::StreamTransportFailed { .. } => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedPlatform => {
                "This computer cannot run object capture. \
                 The reconstruction engine is not available."
                    .to_string()
            }
            Self::DestinationUnwritable { path, .. } => {
                format!("Cannot replace the existing file at {}.", path.display())
            }
            Self::SessionAlreadyActive => {
                "A reconstruction is already running. Stop it before starting another.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type alias using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;
