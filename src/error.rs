//! Error types for Handflux

use thiserror::Error;

/// Errors that can occur while deriving or streaming hand parameters
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to parse tracking frame: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate parameter name: {0}")]
    DuplicateParameter(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not authenticated with VTube Studio")]
    NotAuthenticated,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Token persistence error: {0}")]
    TokenStore(String),
}
