//! Errors raised by the shared avlock helpers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure in config resolution or in another shared helper
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a config or scenario file failed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML or a value outside its allowed range
    #[error("Bad configuration: {0}")]
    Config(String),

    /// Caller passed a value the helper cannot interpret
    #[error("Rejected value: {0}")]
    InvalidInput(String),

    #[error("Unexpected failure: {0}")]
    Internal(String),
}
