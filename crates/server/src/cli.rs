//! Command-line interface. Every option can also come from the environment.

use cekura_openapi_tools::extractor::{DEFAULT_GROUP, DEFAULT_PAGE_PREFIX};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cekura-mcp-server")]
#[command(about = "Expose the documented Cekura REST API as MCP tools over streamable HTTP")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Log filter directive (`RUST_LOG` takes precedence when set)
    #[arg(long, global = true, env = "CEKURA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "CEKURA_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `start` command
    #[command(flatten)]
    pub start: StartArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve MCP over streamable HTTP (default)
    #[command(alias = "serve")]
    Start(StartArgs),

    /// Regenerate the whitelist from the documentation tree
    ExtractWhitelist(ExtractArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Upstream API base URL
    #[arg(long, env = "CEKURA_BASE_URL", default_value = "https://api.cekura.ai")]
    pub base_url: String,

    /// OpenAPI document (JSON or YAML)
    #[arg(long, env = "CEKURA_OPENAPI_SPEC_PATH", default_value = "openapi.json")]
    pub openapi_spec: PathBuf,

    /// Whitelist of documented operations
    #[arg(long, env = "CEKURA_WHITELIST_PATH", default_value = "documented_apis.json")]
    pub whitelist: PathBuf,

    /// Only expose operations carrying one of these tags
    #[arg(long, env = "CEKURA_FILTER_TAGS", value_delimiter = ',')]
    pub filter_tags: Vec<String>,

    /// Hide operations by operationId, tool name, or `METHOD /path`
    #[arg(long, env = "CEKURA_EXCLUDE_OPERATIONS", value_delimiter = ',')]
    pub exclude_operations: Vec<String>,

    /// Cap on the number of exposed tools (0 = no cap)
    #[arg(long, env = "CEKURA_MAX_TOOLS")]
    pub max_tools: Option<usize>,

    /// Expose every operation when the whitelist is missing or empty
    #[arg(long, env = "CEKURA_ALLOW_UNFILTERED")]
    pub allow_unfiltered: bool,

    /// Request header carrying the caller's API key
    #[arg(long, env = "CEKURA_API_KEY_HEADER", default_value = "X-CEKURA-API-KEY")]
    pub api_key_header: String,

    /// Upstream request timeout in seconds (0 disables)
    #[arg(long, env = "CEKURA_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Name reported by the health endpoints and MCP server info
    #[arg(long, env = "CEKURA_SERVICE_NAME", default_value = "cekura-mcp-server")]
    pub service_name: String,

    #[arg(long, env = "CEKURA_MCP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "CEKURA_MCP_PORT", default_value_t = 8001)]
    pub port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Documentation root containing the page sources
    #[arg(long, env = "CEKURA_DOCS_ROOT")]
    pub docs_root: PathBuf,

    /// Navigation file (defaults to `docs.json`, then `mint.json`, under the docs root)
    #[arg(long)]
    pub navigation: Option<PathBuf>,

    /// Whitelist file to write
    #[arg(long, env = "CEKURA_WHITELIST_PATH", default_value = "documented_apis.json")]
    pub output: PathBuf,

    /// Navigation group to collect pages from
    #[arg(long, default_value = DEFAULT_GROUP, conflicts_with = "all_groups")]
    pub group: String,

    /// Collect pages from every navigation group
    #[arg(long)]
    pub all_groups: bool,

    /// Only pages under this prefix are scanned
    #[arg(long, default_value = DEFAULT_PAGE_PREFIX)]
    pub page_prefix: String,

    /// Exit non-zero if the output file is stale; write nothing
    #[arg(long)]
    pub check: bool,
}
