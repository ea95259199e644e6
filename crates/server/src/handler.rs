//! MCP handler: one instance per streamable HTTP session.

use crate::config::LIST_TOOLS_TOOL;
use crate::session::SessionApiKey;
use crate::table::ToolTable;
use cekura_openapi_tools::OpenApiToolsError;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::json;
use std::sync::Arc;

pub struct ProxySession {
    table: Arc<ToolTable>,
    api_key: SessionApiKey,
}

impl ProxySession {
    #[must_use]
    pub fn new(table: Arc<ToolTable>) -> Self {
        Self {
            table,
            api_key: SessionApiKey::new(),
        }
    }

    fn list_tools_tool() -> Tool {
        let mut schema = JsonObject::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), json!({}));
        let mut tool = Tool::new(
            LIST_TOOLS_TOOL,
            "List the Cekura API operations exposed by this server.",
            Arc::new(schema),
        );
        tool.annotations = Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
        });
        tool
    }

    fn list_available_tools(&self) -> CallToolResult {
        let tools: Vec<_> = self
            .table
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "method": t.operation.key.method(),
                    "path": t.operation.path,
                })
            })
            .collect();
        let listing = json!({ "count": tools.len(), "tools": tools });
        CallToolResult::success(vec![Content::text(listing.to_string())])
    }

    async fn call_upstream(
        &self,
        name: &str,
        arguments: &JsonObject,
        context: &RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(tool) = self.table.get(name) else {
            return Err(ErrorData::invalid_params(
                format!("Unknown tool: {name}"),
                None,
            ));
        };

        let dispatcher = self.table.dispatcher();
        let headers = context
            .extensions
            .get::<axum::http::request::Parts>()
            .map(|parts| &parts.headers);
        let api_key = self.api_key.resolve(dispatcher.api_key_header(), headers);

        match dispatcher.dispatch(tool, arguments, api_key.as_ref()).await {
            Ok(response) => {
                if !response.is_success() {
                    tracing::warn!(
                        tool = %name,
                        status = response.status.as_u16(),
                        "upstream returned an error status"
                    );
                }
                Ok(response.into_tool_result(tool))
            }
            Err(e @ OpenApiToolsError::MissingApiKey { .. }) => {
                tracing::warn!(tool = %name, "tool call rejected: no API key");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}

impl ServerHandler for ProxySession {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.table.service_name().to_string(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Tools map one-to-one onto documented Cekura REST API operations. \
                 Send your API key in the request header configured for this server."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let mut tools = self.table.mcp_tools();
        tools.push(Self::list_tools_tool());
        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let name: &str = &request.name;
        if name == LIST_TOOLS_TOOL {
            return Ok(self.list_available_tools());
        }
        let arguments = request.arguments.unwrap_or_default();
        self.call_upstream(name, &arguments, &context).await
    }
}
