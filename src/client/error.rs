// ABOUTME: SP client error types covering transport, codec and protocol-level refusals
// ABOUTME: Converts automatically from connection, I/O and builder errors

use crate::connection::ConnectionError;
use crate::datatypes::{ConnectStatus, SubmitBuildError};
use std::io;
use thiserror::Error;

/// Error type for SP client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Framing or transport failure on the underlying connection
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Socket setup failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Gateway answered Connect with a non-zero status
    #[error("Login refused: {0}")]
    LoginRefused(ConnectStatus),

    /// Submit could not be built from the given content
    #[error("Invalid submit: {0}")]
    Build(#[from] SubmitBuildError),

    /// Unexpected frame received (wrong response type for request)
    #[error("Unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame { expected: String, actual: String },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Operation timeout")]
    Timeout,
}

/// Result type alias for SP client operations
pub type ClientResult<T> = Result<T, ClientError>;
