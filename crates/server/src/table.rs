//! The tool table: projected tools plus the dispatcher, built once at startup.

use crate::config::ServerConfig;
use crate::error::Result;
use cekura_openapi_tools::dispatch::Dispatcher;
use cekura_openapi_tools::projector::{self, ToolDescriptor};
use cekura_openapi_tools::spec::load_spec;
use cekura_openapi_tools::whitelist::Whitelist;
use rmcp::model::Tool;
use std::collections::HashMap;

pub struct ToolTable {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
    dispatcher: Dispatcher,
    service_name: String,
}

impl ToolTable {
    /// Load the spec and whitelist, project, and prepare the dispatcher.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable spec, a malformed whitelist, a missing whitelist without the
    /// unfiltered fallback, or an invalid base URL / header.
    pub fn build(config: &ServerConfig) -> Result<Self> {
        let spec = load_spec(&config.openapi_spec)?;
        let whitelist = Whitelist::load_optional(&config.whitelist)?;
        if whitelist.is_none() {
            tracing::warn!(path = %config.whitelist.display(), "whitelist file not found");
        }

        let projection = projector::project(&spec, whitelist.as_ref(), &config.projection)?;
        let stats = &projection.stats;
        tracing::info!(
            spec = %spec.title,
            spec_version = %spec.version,
            operations = stats.spec_operations,
            whitelist_entries = ?stats.whitelist_entries,
            whitelisted = stats.whitelisted,
            after_tags = stats.after_tags,
            after_exclusions = stats.after_exclusions,
            exposed = stats.exposed,
            "tool projection complete"
        );

        let dispatcher = Dispatcher::new(
            &config.base_url,
            &config.api_key_header,
            config.request_timeout,
        )?;

        Ok(Self::new(
            projection.tools,
            dispatcher,
            config.service_name.clone(),
        ))
    }

    #[must_use]
    pub fn new(tools: Vec<ToolDescriptor>, dispatcher: Dispatcher, service_name: String) -> Self {
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            tools,
            by_name,
            dispatcher,
            service_name,
        }
    }

    /// Number of projected tools (built-ins excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    #[must_use]
    pub fn mcp_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_mcp_tool).collect()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::path::Path;

    pub(crate) const SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Cekura", "version": "1" },
  "paths": {
    "/test_framework/v1/agents/": {
      "get": {
        "operationId": "agents_list",
        "summary": "List agents",
        "tags": ["agents"],
        "responses": { "200": { "description": "ok" } }
      },
      "post": {
        "operationId": "agents_create",
        "tags": ["agents"],
        "responses": { "201": { "description": "created" } }
      }
    },
    "/test_framework/v1/internal/": {
      "get": {
        "operationId": "internal_dump",
        "responses": { "200": { "description": "ok" } }
      }
    }
  }
}"#;

    pub(crate) const WHITELIST: &str =
        r#"{"GET /test_framework/v1/agents": {}, "POST /test_framework/v1/agents/": {}}"#;

    pub(crate) fn config(dir: &Path, whitelist: Option<&str>, extra: &[&str]) -> ServerConfig {
        let spec = dir.join("openapi.json");
        std::fs::write(&spec, SPEC).unwrap();
        let wl = dir.join("documented_apis.json");
        if let Some(content) = whitelist {
            std::fs::write(&wl, content).unwrap();
        }
        let mut argv = vec![
            "cekura-mcp-server".to_string(),
            "--openapi-spec".into(),
            spec.display().to_string(),
            "--whitelist".into(),
            wl.display().to_string(),
            "--base-url".into(),
            "http://127.0.0.1:9".into(),
        ];
        argv.extend(extra.iter().map(|s| (*s).to_string()));
        let cli = Cli::try_parse_from(argv).unwrap();
        ServerConfig::from_args(&cli.start).unwrap()
    }

    #[test]
    fn builds_only_whitelisted_tools() {
        let dir = tempfile::tempdir().unwrap();
        let table = ToolTable::build(&config(dir.path(), Some(WHITELIST), &[])).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("agents_list").is_some());
        assert!(table.get("agents_create").is_some());
        assert!(table.get("internal_dump").is_none());
        assert_eq!(table.mcp_tools().len(), 2);
    }

    #[test]
    fn missing_whitelist_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ToolTable::build(&config(dir.path(), None, &[])).is_err());

        let table =
            ToolTable::build(&config(dir.path(), None, &["--allow-unfiltered"])).unwrap();
        assert_eq!(table.len(), 3);
    }
}
