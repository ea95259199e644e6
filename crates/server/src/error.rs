//! Error types for the server binary.

use cekura_openapi_tools::OpenApiToolsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid options (bad URL, missing files, bad header name)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The listener could not be set up
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
