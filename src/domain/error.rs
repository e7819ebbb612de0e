//! Domain error types

use thiserror::Error;

/// Errors that can occur while configuring or running a channel
#[derive(Error, Debug)]
pub enum DemodError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Control error: {0}")]
    Control(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias for demodulator operations
pub type DemodResult<T> = Result<T, DemodError>;
