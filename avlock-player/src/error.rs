//! Error types for avlock-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for avlock-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input stream could not be opened
    #[error("Open failed: {0}")]
    Open(String),

    /// Demuxer construction or read errors
    #[error("Demux error: {0}")]
    Demux(String),

    /// Seek rejected or failed in the demuxer
    #[error("Seek error: {0}")]
    Seek(String),

    /// Edit decision list could not be parsed
    #[error("EDL error: {0}")]
    Edl(String),

    /// Elementary stream could not be opened in its pipeline
    #[error("Stream error: {0}")]
    Stream(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Control thread is gone (session ended or panicked)
    #[error("Control channel closed: {0}")]
    ChannelClosed(String),

    /// Synchronization request was not acknowledged in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<avlock_common::Error> for Error {
    fn from(err: avlock_common::Error) -> Self {
        match err {
            avlock_common::Error::Io(e) => Error::Io(e),
            avlock_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// Convenience Result type using avlock-player Error
pub type Result<T> = std::result::Result<T, Error>;
