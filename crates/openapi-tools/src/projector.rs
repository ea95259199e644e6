//! Tool projector: whitelist ∩ specification -> tool descriptors.
//!
//! Filters apply in a fixed order: whitelist, tag allow-list, exclusion list, count cap.

use crate::error::{OpenApiToolsError, Result};
use crate::naming;
use crate::spec::{ApiSpec, Operation, OperationKey};
use crate::whitelist::Whitelist;
use reqwest::Method;
use rmcp::model::{JsonObject, Tool, ToolAnnotations};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Descriptions longer than this are cut and end with `...`.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct ProjectionOptions {
    /// Keep operations carrying at least one of these tags. Empty = no tag filter.
    pub filter_tags: Vec<String>,
    /// Drop operations matching by `operationId`, tool name, or `METHOD /path`.
    pub exclude_operations: Vec<String>,
    /// Keep at most this many tools. `None` or `Some(0)` = no cap.
    pub max_tools: Option<usize>,
    /// Expose every operation when no whitelist is available.
    pub allow_unfiltered: bool,
    /// Names owned by built-in tools.
    pub reserved_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Arc<JsonObject>,
    pub output_schema: Option<Arc<JsonObject>>,
    pub annotations: ToolAnnotations,
    pub operation: Operation,
    pub doc_ref: Option<String>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::clone(&self.input_schema),
        );
        tool.output_schema.clone_from(&self.output_schema);
        tool.annotations = Some(self.annotations.clone());
        tool
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub spec_operations: usize,
    /// `None` when running unfiltered.
    pub whitelist_entries: Option<usize>,
    pub whitelisted: usize,
    pub after_tags: usize,
    pub after_exclusions: usize,
    pub exposed: usize,
    /// Whitelist entries with no matching operation in the OpenAPI document.
    pub unmatched: Vec<OperationKey>,
}

#[derive(Debug, Clone)]
pub struct Projection {
    pub tools: Vec<ToolDescriptor>,
    pub stats: ProjectionStats,
}

/// Project the OpenAPI operations through the whitelist and filters.
///
/// # Errors
///
/// Returns a configuration error when the whitelist is missing or empty and unfiltered
/// projection was not requested.
pub fn project(
    spec: &ApiSpec,
    whitelist: Option<&Whitelist>,
    options: &ProjectionOptions,
) -> Result<Projection> {
    let whitelist = match whitelist {
        Some(wl) if !wl.is_empty() => Some(wl),
        _ if options.allow_unfiltered => {
            tracing::warn!("no whitelist entries; exposing every operation in the spec");
            None
        }
        _ => {
            return Err(OpenApiToolsError::Config(
                "whitelist is missing or empty; refusing to expose the full API \
                 (enable unfiltered mode explicitly to override)"
                    .to_string(),
            ));
        }
    };

    let reserved: Vec<&str> = options.reserved_names.iter().map(String::as_str).collect();
    let names = naming::assign_names(&spec.operations, &reserved);
    let mut stats = ProjectionStats {
        spec_operations: spec.operations.len(),
        whitelist_entries: whitelist.map(Whitelist::len),
        ..ProjectionStats::default()
    };

    let candidates: Vec<(&Operation, &String)> = spec
        .operations
        .iter()
        .zip(&names)
        .filter(|(op, _)| whitelist.is_none_or(|wl| wl.contains(&op.key)))
        .collect();
    stats.whitelisted = candidates.len();

    if let Some(wl) = whitelist {
        let known: HashSet<&OperationKey> = spec.operations.iter().map(|op| &op.key).collect();
        stats.unmatched = wl.keys().filter(|k| !known.contains(k)).cloned().collect();
        for key in &stats.unmatched {
            tracing::warn!(entry = %key, "whitelist entry has no matching operation in the spec");
        }
    }

    let candidates: Vec<_> = candidates
        .into_iter()
        .filter(|(op, _)| passes_tag_filter(op, &options.filter_tags))
        .collect();
    stats.after_tags = candidates.len();

    let candidates: Vec<_> = candidates
        .into_iter()
        .filter(|(op, name)| !is_excluded(op, name, &options.exclude_operations))
        .collect();
    stats.after_exclusions = candidates.len();

    let cap = match options.max_tools {
        Some(0) | None => usize::MAX,
        Some(n) => n,
    };

    let tools: Vec<ToolDescriptor> = candidates
        .into_iter()
        .take(cap)
        .map(|(op, name)| {
            let doc_ref = whitelist
                .and_then(|wl| wl.get(&op.key))
                .and_then(|e| e.doc_ref.clone());
            describe(op, name.clone(), doc_ref)
        })
        .collect();
    stats.exposed = tools.len();

    Ok(Projection { tools, stats })
}

fn passes_tag_filter(op: &Operation, filter_tags: &[String]) -> bool {
    filter_tags.is_empty() || op.tags.iter().any(|t| filter_tags.contains(t))
}

fn is_excluded(op: &Operation, name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|entry| {
        let entry = entry.trim();
        op.operation_id.as_deref() == Some(entry)
            || entry == name
            || entry
                .parse::<OperationKey>()
                .is_ok_and(|key| key == op.key)
    })
}

fn describe(op: &Operation, name: String, doc_ref: Option<String>) -> ToolDescriptor {
    let output_schema = op.response_schema.as_ref().map(wrap_body_output_schema);
    ToolDescriptor {
        name,
        description: tool_description(op),
        input_schema: Arc::clone(&op.input_schema),
        output_schema,
        annotations: annotations_for_method(&op.method),
        operation: op.clone(),
        doc_ref,
    }
}

/// Summary, then description, then `METHOD /path`; limited to [`MAX_DESCRIPTION_CHARS`].
#[must_use]
pub fn tool_description(op: &Operation) -> String {
    let text = [op.summary.as_deref(), op.description.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map_or_else(|| op.key.to_string(), str::to_string);
    truncate_chars(&text, MAX_DESCRIPTION_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

/// MCP requires the root output schema to be an object, so the response body is nested.
fn wrap_body_output_schema(body_schema: &serde_json::Value) -> Arc<JsonObject> {
    let mut wrapped = JsonObject::new();
    wrapped.insert("type".into(), json!("object"));
    wrapped.insert("required".into(), json!(["body"]));
    wrapped.insert("properties".into(), json!({ "body": body_schema }));
    Arc::new(wrapped)
}

/// MCP tool annotations based on HTTP method semantics. `openWorldHint` is always set.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only, destructive, idempotent) =
        if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
            (Some(true), Some(false), Some(true))
        } else if method == Method::POST {
            (Some(false), Some(false), Some(false))
        } else if method == Method::PUT || method == Method::DELETE {
            (Some(false), Some(true), Some(true))
        } else if method == Method::PATCH {
            // PATCH may or may not be idempotent; do not guess.
            (Some(false), Some(true), None)
        } else {
            (None, None, None)
        };
    ToolAnnotations {
        title: None,
        read_only_hint: read_only,
        destructive_hint: destructive,
        idempotent_hint: idempotent,
        open_world_hint: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    const SPEC: &str = r"
openapi: 3.0.0
info: { title: Cekura, version: '1' }
paths:
  /v1/agents/:
    get:
      operationId: list-agents
      summary: List agents
      tags: [agents]
      responses:
        '200':
          description: ok
          content:
            application/json:
              schema: { type: array, items: { type: object } }
    post:
      operationId: create_agent
      description: Create an agent
      tags: [agents]
      responses: { '201': { description: created } }
  /v1/agents/{id}:
    delete:
      operationId: delete_agent
      tags: [agents, admin]
      parameters:
        - { name: id, in: path, required: true, schema: { type: string } }
      responses: { '204': { description: gone } }
  /v1/calls:
    get:
      operationId: list_calls
      responses: { '200': { description: ok } }
  /v1/external/hook:
    post:
      tags: [external]
      responses: { '200': { description: ok } }
";

    fn spec() -> ApiSpec {
        ApiSpec::from_str_with_location(SPEC, "test.yaml").unwrap()
    }

    fn whitelist(keys: &[&str]) -> Whitelist {
        let mut wl = Whitelist::new();
        for k in keys {
            wl.insert(k.parse().unwrap(), crate::whitelist::WhitelistEntry::default());
        }
        wl
    }

    fn names(p: &Projection) -> Vec<&str> {
        p.tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn exposes_exactly_the_whitelisted_operations() {
        let wl = whitelist(&["GET /v1/agents", "DELETE /v1/agents/{id}/", "GET /v1/missing"]);
        let p = project(&spec(), Some(&wl), &ProjectionOptions::default()).unwrap();
        assert_eq!(names(&p), vec!["list_agents", "delete_agent"]);
        assert_eq!(p.stats.whitelisted, 2);
        assert_eq!(p.stats.unmatched, vec![OperationKey::new("GET", "/v1/missing")]);
    }

    #[test]
    fn applies_filters_in_order() {
        let wl = whitelist(&[
            "GET /v1/agents",
            "POST /v1/agents",
            "DELETE /v1/agents/{id}",
            "GET /v1/calls",
        ]);
        let options = ProjectionOptions {
            filter_tags: vec!["agents".into()],
            exclude_operations: vec!["create_agent".into()],
            max_tools: Some(1),
            ..ProjectionOptions::default()
        };
        let p = project(&spec(), Some(&wl), &options).unwrap();
        assert_eq!(names(&p), vec!["list_agents"]);
        assert_eq!(p.stats.whitelisted, 4);
        assert_eq!(p.stats.after_tags, 3);
        assert_eq!(p.stats.after_exclusions, 2);
        assert_eq!(p.stats.exposed, 1);
    }

    #[test]
    fn exclusions_match_name_and_key() {
        let wl = whitelist(&["GET /v1/agents", "POST /v1/agents", "GET /v1/calls"]);
        let options = ProjectionOptions {
            exclude_operations: vec!["list_agents".into(), "GET /v1/calls/".into()],
            ..ProjectionOptions::default()
        };
        let p = project(&spec(), Some(&wl), &options).unwrap();
        assert_eq!(names(&p), vec!["create_agent"]);
    }

    #[test]
    fn missing_whitelist_fails_closed() {
        let err = project(&spec(), None, &ProjectionOptions::default()).unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Config(_)));
        let err = project(&spec(), Some(&Whitelist::new()), &ProjectionOptions::default())
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Config(_)));
    }

    #[test]
    fn unfiltered_mode_exposes_everything() {
        let options = ProjectionOptions {
            allow_unfiltered: true,
            ..ProjectionOptions::default()
        };
        let p = project(&spec(), None, &options).unwrap();
        assert_eq!(p.tools.len(), 5);
        assert_eq!(p.stats.whitelist_entries, None);
        assert_eq!(p.tools[4].name, "post_v1_external_hook");
    }

    #[test]
    fn descriptors_carry_description_schema_and_annotations() {
        let wl = whitelist(&["GET /v1/agents", "POST /v1/agents", "GET /v1/calls"]);
        let p = project(&spec(), Some(&wl), &ProjectionOptions::default()).unwrap();

        let list = &p.tools[0];
        assert_eq!(list.description, "List agents");
        assert_eq!(list.annotations.read_only_hint, Some(true));
        let out = list.output_schema.as_ref().unwrap();
        assert_eq!(out["properties"]["body"]["type"], "array");

        let create = &p.tools[1];
        assert_eq!(create.description, "Create an agent");
        assert_eq!(create.annotations.idempotent_hint, Some(false));
        assert!(create.output_schema.is_none());

        assert_eq!(p.tools[2].description, "GET /v1/calls");

        let tool = list.to_mcp_tool();
        assert_eq!(tool.name, "list_agents");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let mut op = spec().operations[0].clone();
        op.summary = Some("é".repeat(250));
        let d = tool_description(&op);
        assert_eq!(d.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(d.ends_with("..."));
    }

    #[test]
    fn annotations_follow_method_semantics() {
        let patch = annotations_for_method(&Method::PATCH);
        assert_eq!(patch.destructive_hint, Some(true));
        assert_eq!(patch.idempotent_hint, None);
        let delete = annotations_for_method(&Method::DELETE);
        assert_eq!(delete.idempotent_hint, Some(true));
        let custom: Method = "PROPFIND".parse().unwrap();
        let a = annotations_for_method(&custom);
        assert_eq!(a.read_only_hint, None);
        assert_eq!(a.open_world_hint, Some(true));
    }

    #[test]
    fn removing_a_whitelist_entry_removes_only_that_tool() {
        let full = whitelist(&["GET /v1/agents", "POST /v1/agents", "DELETE /v1/agents/{id}"]);
        let mut reduced = full.clone();
        reduced.remove(&OperationKey::new("POST", "/v1/agents"));

        let s = spec();
        let a = project(&s, Some(&full), &ProjectionOptions::default()).unwrap();
        let b = project(&s, Some(&reduced), &ProjectionOptions::default()).unwrap();

        assert_eq!(a.tools.len(), b.tools.len() + 1);
        for tool in &b.tools {
            let same = a.tools.iter().find(|t| t.name == tool.name).unwrap();
            assert_eq!(same.input_schema, tool.input_schema);
            assert_eq!(same.description, tool.description);
        }
        assert!(b.tools.iter().all(|t| t.name != "create_agent"));
    }

    #[test]
    fn large_spec_with_small_whitelist_exposes_only_whitelisted_tools() {
        let mut yaml = String::from("openapi: 3.0.0\ninfo: { title: big, version: '1' }\npaths:\n");
        for i in 0..311 {
            let _ = write!(
                yaml,
                "  /v1/resource{i}/{{id}}:\n    get:\n      operationId: get-resource-{i}\n      \
                 parameters:\n        - {{ name: id, in: path, required: true, schema: {{ type: string }} }}\n      \
                 responses: {{ '200': {{ description: ok }} }}\n    \
                 delete:\n      responses: {{ '204': {{ description: ok }} }}\n"
            );
        }
        let spec = ApiSpec::from_str_with_location(&yaml, "big.yaml").unwrap();
        assert_eq!(spec.operations.len(), 622);

        let mut wl = Whitelist::new();
        for i in (0..622).step_by(8).take(75) {
            wl.insert(spec.operations[i].key.clone(), Default::default());
        }
        assert_eq!(wl.len(), 75);

        let p = project(&spec, Some(&wl), &ProjectionOptions::default()).unwrap();
        assert!(p.tools.len() <= 75);
        assert_eq!(p.tools.len(), 75);
        assert!(p.tools.iter().all(|t| wl.contains(&t.operation.key)));
        let unique: HashSet<&str> = p.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(unique.len(), p.tools.len());
    }
}
