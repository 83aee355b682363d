use crate::transport::TransportError;
use crate::upload::UploadError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Upload(#[from] UploadError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("terminal runtime error: {0}")]
    Runtime(String),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("gave up reconnecting to {0}")]
    Disconnected(String),
}
