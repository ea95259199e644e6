//! HTTP shell: MCP streamable HTTP on `/mcp`, health on `/health` and `/healthz`.

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handler::ProxySession;
use crate::health;
use crate::session_manager::ProxySessionManager;
use crate::table::ToolTable;
use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Open connections get this long to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the application router around a prepared tool table.
pub fn router(table: Arc<ToolTable>, shutdown: &CancellationToken) -> Router {
    let mcp_table = Arc::clone(&table);
    let mcp = StreamableHttpService::new(
        move || Ok(ProxySession::new(Arc::clone(&mcp_table))),
        Arc::new(ProxySessionManager::new()),
        StreamableHttpServerConfig {
            cancellation_token: shutdown.child_token(),
            ..Default::default()
        },
    );

    // Method and path only: headers carry API keys.
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        })
        .on_request(())
        .on_response(|response: &Response, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                "http request completed"
            );
        });

    Router::new()
        .nest_service("/mcp", mcp)
        .layer(trace_layer)
        .merge(health::router(table))
}

/// Build the tool table, bind, and serve until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the tool table cannot be built or the listener cannot be bound.
pub async fn run(config: ServerConfig) -> Result<()> {
    let table = Arc::new(ToolTable::build(&config)?);
    if table.is_empty() {
        tracing::warn!("no tools registered; only the built-in listing tool is available");
    }

    let shutdown = CancellationToken::new();
    let app = router(Arc::clone(&table), &shutdown);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Startup(format!("failed to bind {addr}: {e}")))?;
    let local = listener.local_addr()?;
    tracing::info!(
        addr = %local,
        service = %table.service_name(),
        tools = table.len(),
        "listening"
    );

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .into_future();

    tokio::select! {
        result = serve => result?,
        () = drain_deadline(shutdown) => {
            tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "connections still open after shutdown grace period; exiting"
            );
        }
    }

    tracing::info!("server shutdown completed");
    Ok(())
}

async fn drain_deadline(shutdown: CancellationToken) {
    shutdown.cancelled().await;
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

/// Resolves once SIGINT or SIGTERM arrives, then cancels `shutdown` so open MCP streams end.
async fn shutdown_signal(shutdown: CancellationToken) {
    let signal = next_signal().await;
    tracing::info!(signal, "stop requested; draining connections");
    shutdown.cancel();
}

#[cfg(unix)]
async fn next_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::warn!(error = %e, "SIGINT handler unavailable");
                std::future::pending().await
            }
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending().await
            }
        }
    };

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}

#[cfg(not(unix))]
async fn next_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    "ctrl-c"
}
