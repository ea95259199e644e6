//! Tool naming: deterministic, collision-free names derived from operations.

use crate::spec::Operation;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Maximum tool name length accepted by common MCP clients.
pub const MAX_TOOL_NAME_LEN: usize = 64;

const HASH_SUFFIX_LEN: usize = 8;

/// Sanitize an `operationId`: `-` becomes `_`, anything outside `[A-Za-z0-9_]` is dropped.
#[must_use]
pub fn sanitize_operation_id(operation_id: &str) -> Option<String> {
    let name: String = operation_id
        .chars()
        .filter_map(|c| match c {
            '-' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect();
    let trimmed = name.trim_matches('_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `/v1/agents/{agent_id}/runs` -> `v1_agents_agent_id_runs`.
#[must_use]
pub fn path_slug(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Name for an operation without a usable `operationId`: `get_v1_agents_id`.
#[must_use]
pub fn canonical_name(method: &str, path: &str) -> String {
    let slug = path_slug(path);
    let method = method.to_ascii_lowercase();
    if slug.is_empty() {
        method
    } else {
        format!("{method}_{slug}")
    }
}

/// Names longer than the limit keep a prefix plus a short hash of the full name.
#[must_use]
pub fn limit_length(name: &str) -> String {
    if name.len() <= MAX_TOOL_NAME_LEN {
        return name.to_string();
    }
    let prefix_len = MAX_TOOL_NAME_LEN - HASH_SUFFIX_LEN - 1;
    let prefix: String = name.chars().take(prefix_len).collect();
    format!("{}_{}", prefix.trim_end_matches('_'), short_hash(name))
}

fn short_hash(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..HASH_SUFFIX_LEN].to_string()
}

/// Base name before collision handling.
#[must_use]
pub fn base_name(operation: &Operation) -> String {
    let raw = operation
        .operation_id
        .as_deref()
        .and_then(sanitize_operation_id)
        .unwrap_or_else(|| canonical_name(operation.key.method(), operation.key.path()));
    limit_length(&raw)
}

/// Hands out unique tool names in a fixed order.
#[derive(Debug, Default)]
pub struct ToolNamer {
    taken: HashSet<String>,
}

impl ToolNamer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names that must never be handed out (built-in tools).
    #[must_use]
    pub fn with_reserved<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taken: reserved.into_iter().map(Into::into).collect(),
        }
    }

    pub fn assign(&mut self, operation: &Operation) -> String {
        let base = base_name(operation);
        if self.taken.insert(base.clone()) {
            return base;
        }

        let candidates = [
            limit_length(&format!("{base}_{}", path_slug(operation.key.path()))),
            limit_length(&format!("{base}_{}", short_hash(&operation.key.to_string()))),
        ];
        for candidate in candidates {
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }

        let mut counter = 2;
        loop {
            let candidate = limit_length(&format!("{base}_{counter}"));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Assign names to every operation in order.
///
/// Names are computed over the full operation list, so a tool's name does not depend on which
/// other operations end up exposed.
#[must_use]
pub fn assign_names(operations: &[Operation], reserved: &[&str]) -> Vec<String> {
    let mut namer = ToolNamer::with_reserved(reserved.iter().copied());
    operations.iter().map(|op| namer.assign(op)).collect()
}
