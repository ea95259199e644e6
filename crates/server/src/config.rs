//! Validated runtime configuration.

use crate::cli::StartArgs;
use crate::error::{Result, ServerError};
use cekura_openapi_tools::projector::ProjectionOptions;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Name of the built-in tool that lists the registered tools.
pub const LIST_TOOLS_TOOL: &str = "list_available_tools";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    pub openapi_spec: PathBuf,
    pub whitelist: PathBuf,
    pub api_key_header: String,
    pub request_timeout: Option<Duration>,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub projection: ProjectionOptions,
}

impl ServerConfig {
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] when an option is invalid.
    pub fn from_args(args: &StartArgs) -> Result<Self> {
        let base_url = validate_base_url(&args.base_url)?;

        if !args.openapi_spec.is_file() {
            return Err(ServerError::Config(format!(
                "OpenAPI spec not found at '{}'",
                args.openapi_spec.display()
            )));
        }

        let api_key_header = args.api_key_header.trim();
        if api_key_header.is_empty()
            || axum::http::HeaderName::from_bytes(api_key_header.as_bytes()).is_err()
        {
            return Err(ServerError::Config(format!(
                "invalid API key header name '{}'",
                args.api_key_header
            )));
        }

        let service_name = args.service_name.trim();
        if service_name.is_empty() {
            return Err(ServerError::Config("service name must not be empty".into()));
        }

        Ok(Self {
            base_url,
            openapi_spec: args.openapi_spec.clone(),
            whitelist: args.whitelist.clone(),
            api_key_header: api_key_header.to_string(),
            request_timeout: (args.request_timeout_secs > 0)
                .then(|| Duration::from_secs(args.request_timeout_secs)),
            service_name: service_name.to_string(),
            host: args.host.clone(),
            port: args.port,
            projection: ProjectionOptions {
                filter_tags: clean_list(&args.filter_tags),
                exclude_operations: clean_list(&args.exclude_operations),
                max_tools: args.max_tools.filter(|n| *n > 0),
                allow_unfiltered: args.allow_unfiltered,
                reserved_names: vec![LIST_TOOLS_TOOL.to_string()],
            },
        })
    }
}

fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| ServerError::Config(format!("invalid base URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ServerError::Config(format!(
            "base URL must be an absolute http(s) URL, got '{raw}'"
        )));
    }
    Ok(trimmed.to_string())
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
