//! Cekura MCP server.
//!
//! Serves the documented subset of the Cekura REST API as MCP tools over streamable HTTP, and
//! regenerates that subset from the documentation sources (`extract-whitelist`).

mod cli;
mod config;
mod error;
mod extract;
mod handler;
mod health;
mod logging;
mod server;
mod session;
mod session_manager;
mod table;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Command};
use config::ServerConfig;
use extract::ExtractOutcome;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; configuration may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.log_format) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Some(Command::ExtractWhitelist(args)) => {
            let outcome = extract::run(&args).context("whitelist extraction failed")?;
            Ok(match outcome {
                ExtractOutcome::Stale => ExitCode::FAILURE,
                ExtractOutcome::Written { entries } | ExtractOutcome::UpToDate { entries } => {
                    tracing::debug!(entries, "extract-whitelist finished");
                    ExitCode::SUCCESS
                }
            })
        }
        Some(Command::Start(args)) => start(&args).await,
        None => start(&cli.start).await,
    }
}

async fn start(args: &cli::StartArgs) -> anyhow::Result<ExitCode> {
    let config = ServerConfig::from_args(args).context("invalid configuration")?;
    tracing::info!(
        base_url = %config.base_url,
        openapi_spec = %config.openapi_spec.display(),
        whitelist = %config.whitelist.display(),
        api_key_header = %config.api_key_header,
        "starting cekura-mcp-server"
    );
    server::run(config).await.context("server failed")?;
    Ok(ExitCode::SUCCESS)
}
