// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// This enum represents all possible error conditions that can occur
/// during mining operations, including network, I/O, protocol, and
/// configuration errors.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Login refused by the pool server; carries the server code and a
    /// message that can be shown to the user
    #[error("Login refused by pool (code {code}): {message}")]
    LoginRefused {
        /// Server-assigned refusal code
        code: i32,
        /// User-meaningful explanation from the pool server
        message: String,
    },

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// TLS handshake or certificate errors
    #[error("TLS error: {0}")]
    TlsError(#[from] native_tls::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Hash engine initialization or reseed errors
    #[error("Engine error: {0}")]
    EngineError(String),
}

/// Converts hex decoding errors into MinerError
///
/// Used when invalid hex data is encountered in job blobs, targets,
/// or seed hashes delivered by the pool.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts async task join errors into MinerError
impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::ChannelError(format!("Async task failed: {}", e))
    }
}
