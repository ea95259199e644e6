#![allow(dead_code)]

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use futures::StreamExt as _;
use parking_lot::Mutex;
use serde_json::json;
use std::io::BufRead as _;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

pub const API_KEY_HEADER: &str = "X-CEKURA-API-KEY";

pub const SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Cekura", "version": "1.0" },
  "paths": {
    "/test_framework/v1/agents/": {
      "get": {
        "operationId": "agents_list",
        "summary": "List agents",
        "tags": ["agents"],
        "parameters": [
          { "name": "page", "in": "query", "schema": { "type": "integer" } }
        ],
        "responses": { "200": { "description": "ok" } }
      }
    },
    "/test_framework/v1/agents/{id}/": {
      "get": {
        "operationId": "agents_retrieve",
        "summary": "Get an agent",
        "tags": ["agents"],
        "parameters": [
          { "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }
        ],
        "responses": { "200": { "description": "ok" } }
      },
      "delete": {
        "operationId": "agents_destroy",
        "tags": ["agents"],
        "parameters": [
          { "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }
        ],
        "responses": { "204": { "description": "gone" } }
      }
    },
    "/test_framework/v1/internal/debug/": {
      "get": {
        "operationId": "internal_debug",
        "responses": { "200": { "description": "ok" } }
      }
    }
  }
}"#;

pub const WHITELIST: &str = r#"{
  "GET /test_framework/v1/agents": { "doc_ref": "api-reference/agents/list" },
  "GET /test_framework/v1/agents/{id}": { "doc_ref": "api-reference/agents/get" }
}
"#;

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// A running server plus everything it wrote to stderr so far.
pub struct RunningServer {
    pub child: KillOnDrop,
    pub base_url: String,
    stderr: Arc<Mutex<String>>,
}

impl RunningServer {
    pub fn stderr(&self) -> String {
        self.stderr.lock().clone()
    }
}

pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// Write the OpenAPI document and (optionally) the whitelist into `dir`.
pub fn write_inputs(dir: &Path, whitelist: Option<&str>) -> anyhow::Result<(PathBuf, PathBuf)> {
    let spec = dir.join("openapi.json");
    std::fs::write(&spec, SPEC).context("write spec")?;
    let wl = dir.join("documented_apis.json");
    if let Some(content) = whitelist {
        std::fs::write(&wl, content).context("write whitelist")?;
    }
    Ok((spec, wl))
}

pub fn server_command(dir: &Path, upstream: &str, port: u16) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cekura-mcp-server"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env("CEKURA_OPENAPI_SPEC_PATH", dir.join("openapi.json"))
        .env("CEKURA_WHITELIST_PATH", dir.join("documented_apis.json"))
        .env("CEKURA_BASE_URL", upstream)
        .env("CEKURA_MCP_HOST", "127.0.0.1")
        .env("CEKURA_MCP_PORT", port.to_string())
        .env("CEKURA_LOG_LEVEL", "info")
        .env("CEKURA_LOG_FORMAT", "text");
    cmd
}

/// Spawn the server and wait until `/health` answers.
pub async fn spawn_server(dir: &Path, upstream: &str) -> anyhow::Result<RunningServer> {
    let port = pick_unused_port()?;
    let mut child = server_command(dir, upstream, port)
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn cekura-mcp-server")?;

    let stderr = Arc::new(Mutex::new(String::new()));
    if let Some(pipe) = child.stderr.take() {
        let sink = Arc::clone(&stderr);
        std::thread::spawn(move || {
            for line in std::io::BufReader::new(pipe).lines().map_while(Result::ok) {
                let mut out = sink.lock();
                out.push_str(&line);
                out.push('\n');
            }
        });
    }

    let server = RunningServer {
        child: KillOnDrop(child),
        base_url: format!("http://127.0.0.1:{port}"),
        stderr,
    };
    wait_http_ok(&format!("{}/health", server.base_url), Duration::from_secs(20))
        .await
        .with_context(|| format!("server stderr:\n{}", server.stderr()))?;
    Ok(server)
}

/// What the mock upstream saw.
#[derive(Debug, Default)]
pub struct Seen {
    pub hits: usize,
    pub last_path: Option<String>,
    pub last_query: Option<String>,
    pub last_api_key: Option<String>,
}

pub struct MockUpstream {
    pub base_url: String,
    pub seen: Arc<Mutex<Seen>>,
}

async fn echo(State(seen): State<Arc<Mutex<Seen>>>, headers: HeaderMap, req: Request) -> String {
    let mut seen = seen.lock();
    seen.hits += 1;
    seen.last_path = Some(req.uri().path().to_string());
    seen.last_query = req.uri().query().map(str::to_string);
    seen.last_api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    json!({ "id": 7, "name": "support-bot" }).to_string()
}

/// Axum upstream on an ephemeral port answering every request with a fixed JSON object.
pub async fn spawn_upstream() -> anyhow::Result<MockUpstream> {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .fallback(echo)
        .with_state(Arc::clone(&seen));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind mock upstream")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(MockUpstream {
        base_url: format!("http://{addr}"),
        seen,
    })
}

/// Minimal MCP client for the streamable HTTP endpoint (`/mcp`).
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    api_key: Option<String>,
}

impl McpStreamableHttpSession {
    pub async fn connect(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let api_key = api_key.map(str::to_string);

        let init_resp = post_mcp(
            &client,
            &base_url,
            None,
            api_key.as_deref(),
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "cekura-mcp-server-integration-tests", "version": "0" }
                }
            }),
        )
        .await?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        let initialized_resp = post_mcp(
            &client,
            &base_url,
            Some(&session_id),
            api_key.as_deref(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            base_url,
            session_id,
            api_key,
        })
    }

    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = post_mcp(
            &self.client,
            &self.base_url,
            Some(&self.session_id),
            self.api_key.as_deref(),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
        )
        .await?;

        tokio::time::timeout(
            Duration::from_secs(10),
            read_first_event_stream_json_message(resp),
        )
        .await
        .context("timeout waiting for event-stream response")?
    }

    pub async fn call_tool(
        &self,
        id: u64,
        name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        self.request(
            id,
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }
}

/// `result.content[0].text` of a tool call response.
pub fn tool_call_text(msg: &serde_json::Value) -> anyhow::Result<String> {
    msg.pointer("/result/content/0/text")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("tools/call missing result.content[0].text: {msg}"))
}

pub fn tool_call_is_error(msg: &serde_json::Value) -> bool {
    msg.pointer("/result/isError") == Some(&json!(true))
}

async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    session_id: Option<&str>,
    api_key: Option<&str>,
    body: serde_json::Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(format!("{}/mcp", base_url.trim_end_matches('/')))
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }
    if let Some(key) = api_key {
        req = req.header(API_KEY_HEADER, key);
    }

    req.send()
        .await
        .context("POST /mcp")?
        .error_for_status()
        .context("POST /mcp status")
}

async fn read_first_event_stream_json_message(
    resp: reqwest::Response,
) -> anyhow::Result<serde_json::Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            let data = data_lines.join("\n");
            data_lines.clear();
            if data.trim().is_empty() {
                // Priming events carry no payload.
                continue;
            }
            return serde_json::from_str(&data).context("parse event-stream data as JSON");
        }

        if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.trim().to_string());
        }
    }

    anyhow::bail!("event-stream ended without a JSON message")
}
