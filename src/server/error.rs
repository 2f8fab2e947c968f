use crate::config::ConfigError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No session for peer {0}")]
    UnknownSession(SocketAddr),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
