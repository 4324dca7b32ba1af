//! Error taxonomy for a capture session.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop (or degrade) a capture session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Invalid session configuration; raised before any frame is rendered
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable GPU adapter or device on this machine
    #[error("GPU unavailable: {0}")]
    AdapterUnavailable(String),

    /// Shader or pipeline failed to build; carries the backend diagnostic text
    #[error("Backend setup failed: {0}")]
    BackendSetup(String),

    /// Dispatch, draw or readback failed mid-session
    #[error("Backend failure: {0}")]
    Backend(String),

    /// Filesystem failure while exporting frames
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Still-image encoder rejected a frame
    #[error("Failed to encode frame {index}: {message}")]
    Encode { index: u32, message: String },

    /// External video muxer failed
    #[error("Video mux failed: {0}")]
    Mux(String),
}

impl SessionError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the machine has no GPU to offer; the only case `auto` may fall back on.
    pub fn is_adapter_unavailable(&self) -> bool {
        matches!(self, Self::AdapterUnavailable(_))
    }
}

/// Result alias used across the library.
pub type SessionResult<T> = Result<T, SessionError>;
