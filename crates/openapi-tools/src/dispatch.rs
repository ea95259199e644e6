//! Dispatch shim: one tool invocation -> one upstream HTTP request.
//!
//! No retries and no response rewriting: the upstream status and body are handed back as-is.

use crate::error::{OpenApiToolsError, Result};
use crate::projector::ToolDescriptor;
use crate::spec::{Operation, OperationParameter, ParamLocation};
use base64::Engine as _;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// A caller-supplied API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trimmed key, or `None` when blank.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// What came back from the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Value,
}

impl UpstreamResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Map into an MCP tool result. Non-2xx responses become `isError` results carrying the
    /// upstream status and body.
    #[must_use]
    pub fn into_tool_result(self, tool: &ToolDescriptor) -> CallToolResult {
        if !self.is_success() {
            let code = self.status.as_u16();
            let reason = self.status.canonical_reason().unwrap_or("Unknown");
            return CallToolResult::error(vec![Content::text(format!(
                "API returned {code} {reason}: {}",
                body_text(&self.body)
            ))]);
        }

        // Emit `structured_content` only when the tool advertises an output schema.
        if tool.output_schema.is_some() {
            let structured = json!({ "body": self.body });
            let text =
                serde_json::to_string(&structured).unwrap_or_else(|_| structured.to_string());
            CallToolResult {
                content: vec![Content::text(text)],
                structured_content: Some(structured),
                is_error: Some(false),
                meta: None,
            }
        } else {
            CallToolResult::success(vec![Content::text(body_text(&self.body))])
        }
    }
}

/// Text bodies verbatim, anything else as compact JSON.
fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    base_url: Url,
    api_key_header: HeaderName,
    timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct RequestParts {
    segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body_fields: Map<String, Value>,
    body_payload: Option<Value>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns an error if the base URL or header name is invalid, or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, api_key_header: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| OpenApiToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(client, base_url, api_key_header, timeout)
    }

    /// # Errors
    ///
    /// Returns an error if the base URL or header name is invalid.
    pub fn with_client(
        client: Client,
        base_url: &str,
        api_key_header: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            OpenApiToolsError::Config(format!("invalid base URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(OpenApiToolsError::Config(format!(
                "base URL must be an absolute http(s) URL, got '{base_url}'"
            )));
        }
        let api_key_header = HeaderName::from_bytes(api_key_header.as_bytes()).map_err(|e| {
            OpenApiToolsError::Config(format!("invalid API key header '{api_key_header}': {e}"))
        })?;
        Ok(Self {
            client,
            base_url,
            api_key_header,
            timeout,
        })
    }

    #[must_use]
    pub fn api_key_header(&self) -> &HeaderName {
        &self.api_key_header
    }

    /// Issue the single upstream request bound to `tool`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::MissingApiKey`] before any network activity when no key is
    /// present, a runtime error for invalid arguments, or a request error on transport failure.
    /// Non-2xx responses are not errors; they are returned in [`UpstreamResponse`].
    pub async fn dispatch(
        &self,
        tool: &ToolDescriptor,
        arguments: &JsonObject,
        api_key: Option<&ApiKey>,
    ) -> Result<UpstreamResponse> {
        let Some(api_key) = api_key else {
            return Err(OpenApiToolsError::MissingApiKey {
                header: self.api_key_header.to_string(),
            });
        };
        let mut key_value = HeaderValue::from_str(api_key.expose()).map_err(|_| {
            OpenApiToolsError::Runtime("API key contains characters not allowed in a header".into())
        })?;
        key_value.set_sensitive(true);

        let op = &tool.operation;
        let parts = build_request_parts(op, arguments)?;
        let url = self.build_url(&parts.segments, &parts.query)?;

        tracing::debug!(
            tool = %tool.name,
            method = %op.method,
            url = %redact_url(&url),
            "dispatching upstream request"
        );

        let mut request = self
            .client
            .request(op.method.clone(), url)
            .header(self.api_key_header.clone(), key_value);
        for (name, value) in parts.headers {
            // The session key always wins over a declared parameter of the same name.
            if name == self.api_key_header {
                tracing::debug!(
                    tool = %tool.name,
                    header = %name,
                    "ignoring argument for the API key header"
                );
                continue;
            }
            request = request.header(name, value);
        }
        if let Some(payload) = &parts.body_payload {
            request = request.json(payload);
        } else if !parts.body_fields.is_empty() {
            request = request.json(&parts.body_fields);
        }
        if let Some(t) = self.timeout {
            request = request.timeout(t);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;

        tracing::info!(
            tool = %tool.name,
            status = status.as_u16(),
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "upstream call completed"
        );

        let body = match bytes_to_text_or_base64_json(&bytes, content_type.as_deref()) {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        };
        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    fn build_url(&self, segments: &[String], query: &[(String, String)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                OpenApiToolsError::Runtime("base URL cannot carry a path".to_string())
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

fn build_request_parts(op: &Operation, arguments: &JsonObject) -> Result<RequestParts> {
    let mut parts = RequestParts::default();
    let mut path_values: HashMap<String, String> = HashMap::new();
    let mut declared: HashSet<&str> = HashSet::new();

    for param in &op.parameters {
        declared.insert(param.name.as_str());
        let value = arguments
            .get(&param.name)
            .cloned()
            .or_else(|| param.schema.get("default").cloned());

        let value = match value {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(OpenApiToolsError::Runtime(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                continue;
            }
            Some(v) => v,
        };

        match param.location {
            ParamLocation::Path => {
                path_values.insert(param.name.clone(), value_to_string(&value));
            }
            ParamLocation::Query => push_query(&mut parts.query, &param.name, &value),
            ParamLocation::Header => {
                let name = HeaderName::from_bytes(param.name.as_bytes()).map_err(|e| {
                    OpenApiToolsError::Runtime(format!("Invalid header name '{}': {e}", param.name))
                })?;
                let value = HeaderValue::from_str(&value_to_string(&value)).map_err(|e| {
                    OpenApiToolsError::Runtime(format!(
                        "Invalid value for header '{}': {e}",
                        param.name
                    ))
                })?;
                parts.headers.push((name, value));
            }
            ParamLocation::BodyField => {
                parts
                    .body_fields
                    .insert(param.name.clone(), coerce_structured(param, value));
            }
            ParamLocation::Body => parts.body_payload = Some(coerce_structured(param, value)),
        }
    }

    // Undeclared arguments: fill matching path placeholders, otherwise send them in the body when
    // the operation takes one, else in the query string.
    let placeholders = path_placeholders(&op.path);
    for (name, value) in arguments {
        if declared.contains(name.as_str()) || value.is_null() {
            continue;
        }
        if placeholders.contains(name) {
            path_values.insert(name.clone(), value_to_string(value));
        } else if op.accepts_body && parts.body_payload.is_none() {
            parts.body_fields.insert(name.clone(), value.clone());
        } else {
            push_query(&mut parts.query, name, value);
        }
    }

    parts.segments = op
        .path
        .trim_start_matches('/')
        .split('/')
        .map(|segment| fill_segment(segment, &path_values))
        .collect::<Result<Vec<_>>>()?;

    Ok(parts)
}

fn path_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    names
}

fn fill_segment(segment: &str, values: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = values.get(name).ok_or_else(|| {
            OpenApiToolsError::Runtime(format!("Missing required parameter: {name}"))
        })?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn push_query(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items.iter().filter(|v| !v.is_null()) {
                query.push((name.to_string(), value_to_string(item)));
            }
        }
        other => query.push((name.to_string(), value_to_string(other))),
    }
}

/// LLM clients often send nested objects as JSON strings; accept those for structured params.
fn coerce_structured(param: &OperationParameter, value: Value) -> Value {
    if !param.expects_structured_value() {
        return value;
    }
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => Value::String(s),
        },
        other => other,
    }
}

/// Convert a JSON value to a string for URL/header parameters.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

fn bytes_to_text_or_base64_json(bytes: &[u8], content_type: Option<&str>) -> Value {
    if let Ok(s) = std::str::from_utf8(bytes) {
        Value::String(s.to_string())
    } else {
        let mime_type = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_string());
        json!({
            "encoding": "base64",
            "mimeType": mime_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }
}

/// Drop credentials, query and fragment from a URL before it reaches logs or error text.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
