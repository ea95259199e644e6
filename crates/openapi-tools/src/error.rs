//! Error types for `cekura-openapi-tools`.

use thiserror::Error;

/// Main error type for the OpenAPI -> MCP projection and dispatch.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Configuration errors (invalid options, missing whitelist).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime errors (tool call failed, invalid arguments).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// `OpenAPI` errors (spec parsing, `$ref` resolution).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Whitelist error: failed to read '{path}': {source}")]
    WhitelistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Whitelist error: failed to parse '{path}': {source}")]
    WhitelistParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Malformed whitelist key (expected `METHOD /path`).
    #[error("Whitelist error: {0}")]
    Whitelist(String),

    #[error("Navigation error: failed to read '{path}': {source}")]
    NavigationRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Navigation error: failed to parse '{path}': {source}")]
    NavigationParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Parameter collision errors.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),

    /// The caller never presented an API key.
    #[error(
        "Authentication Error: No API key found. Please provide your API key via the {header} header."
    )]
    MissingApiKey { header: String },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors.
    #[error("Request error: {0}")]
    Request(String),
}

/// Result type alias for `cekura-openapi-tools` operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
