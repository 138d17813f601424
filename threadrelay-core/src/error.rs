//! Error types for threadrelay-core

use thiserror::Error;

/// Main error type for the threadrelay-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not registered with the pipeline
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Terminal multiplexer adapter error (window missing, command failed)
    #[error("multiplexer error: {0}")]
    Multiplexer(String),

    /// Logging setup error
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type alias for threadrelay-core
pub type Result<T> = std::result::Result<T, Error>;
