//! Whitelist extractor: scans documentation navigation + page front matter and produces the
//! whitelist of documented API operations.
//!
//! A page is an API reference page when its YAML front matter carries an `openapi:` line:
//!
//! ```text
//! ---
//! title: "List agents"
//! openapi: "GET /test_framework/v1/aiagents/"
//! ---
//! ```
//!
//! The `openapi.json GET /path` form (spec file first) is accepted too.

use crate::error::{OpenApiToolsError, Result};
use crate::spec::{OperationKey, is_known_method};
use crate::whitelist::{Whitelist, WhitelistEntry};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_GROUP: &str = "API Reference";
pub const DEFAULT_PAGE_PREFIX: &str = "api-reference/";

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    /// Navigation file (`mint.json` / `docs.json`).
    pub navigation: PathBuf,
    /// Directory page identifiers are relative to.
    pub docs_root: PathBuf,
    /// Only collect pages below the navigation group (or tab) with this name.
    pub group: Option<String>,
    pub page_prefix: String,
}

impl ExtractorOptions {
    #[must_use]
    pub fn new(navigation: PathBuf, docs_root: PathBuf) -> Self {
        Self {
            navigation,
            docs_root,
            group: Some(DEFAULT_GROUP.to_string()),
            page_prefix: DEFAULT_PAGE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractWarning {
    MissingPage { page: String, path: PathBuf },
    Unreadable { page: String, path: PathBuf, error: String },
    NoReference { page: String },
    Duplicate { page: String, key: OperationKey, first: String },
}

impl fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractWarning::MissingPage { page, path } => {
                write!(f, "page '{page}' not found at {}", path.display())
            }
            ExtractWarning::Unreadable { page, path, error } => {
                write!(f, "page '{page}' at {} could not be read: {error}", path.display())
            }
            ExtractWarning::NoReference { page } => {
                write!(f, "page '{page}' has no openapi reference in its front matter")
            }
            ExtractWarning::Duplicate { page, key, first } => {
                write!(f, "page '{page}' references {key}, already documented by '{first}'")
            }
        }
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub whitelist: Whitelist,
    pub pages_scanned: usize,
    pub warnings: Vec<ExtractWarning>,
}

pub struct Extractor {
    options: ExtractorOptions,
    reference_re: Regex,
}

impl Extractor {
    /// # Errors
    ///
    /// Returns an error if the front-matter pattern fails to compile.
    pub fn new(options: ExtractorOptions) -> Result<Self> {
        let reference_re = Regex::new(
            r#"(?m)^\s*openapi\s*:\s*["']?\s*(?:\S+\.(?:json|ya?ml)\s+)?([A-Za-z]+)\s+([^"'\s]+)\s*["']?\s*$"#,
        )
        .map_err(|e| OpenApiToolsError::Config(format!("invalid reference pattern: {e}")))?;
        Ok(Self {
            options,
            reference_re,
        })
    }

    /// Walk the navigation file and collect every documented operation.
    ///
    /// Missing, unreadable and reference-less pages are reported as warnings and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigation file is missing or malformed, or if the configured
    /// group does not exist.
    pub fn run(&self) -> Result<Extraction> {
        let nav_path = &self.options.navigation;
        let content =
            std::fs::read_to_string(nav_path).map_err(|e| OpenApiToolsError::NavigationRead {
                path: nav_path.display().to_string(),
                source: e,
            })?;
        let navigation: Value =
            serde_json::from_str(&content).map_err(|e| OpenApiToolsError::NavigationParse {
                path: nav_path.display().to_string(),
                source: e,
            })?;

        let pages = collect_pages(
            &navigation,
            self.options.group.as_deref(),
            &self.options.page_prefix,
        )?;

        let mut whitelist = Whitelist::new();
        let mut first_page: HashMap<OperationKey, String> = HashMap::new();
        let mut warnings = Vec::new();

        for page in &pages {
            let Some(path) = self.page_path(page) else {
                warnings.push(ExtractWarning::MissingPage {
                    page: page.clone(),
                    path: self.options.docs_root.join(format!("{page}.mdx")),
                });
                continue;
            };
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warnings.push(ExtractWarning::Unreadable {
                        page: page.clone(),
                        path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let Some(key) = self.parse_reference(&content) else {
                warnings.push(ExtractWarning::NoReference { page: page.clone() });
                continue;
            };

            let entry = WhitelistEntry {
                doc_ref: Some(page.clone()),
            };
            if whitelist.insert(key.clone(), entry) {
                first_page.insert(key, page.clone());
            } else {
                let first = first_page.get(&key).cloned().unwrap_or_default();
                warnings.push(ExtractWarning::Duplicate {
                    page: page.clone(),
                    key,
                    first,
                });
            }
        }

        for w in &warnings {
            tracing::warn!(warning = %w, "skipping documentation page");
        }
        tracing::info!(
            pages = pages.len(),
            operations = whitelist.len(),
            warnings = warnings.len(),
            "documentation scan finished"
        );

        Ok(Extraction {
            whitelist,
            pages_scanned: pages.len(),
            warnings,
        })
    }

    fn page_path(&self, page: &str) -> Option<PathBuf> {
        let page = page.trim_start_matches('/');
        ["mdx", "md"]
            .iter()
            .map(|ext| self.options.docs_root.join(format!("{page}.{ext}")))
            .find(|p| p.is_file())
    }

    /// The operation referenced by a page's front matter, if any.
    #[must_use]
    pub fn parse_reference(&self, content: &str) -> Option<OperationKey> {
        let front_matter = front_matter(content)?;
        self.reference_re.captures_iter(front_matter).find_map(|caps| {
            let method = caps.get(1)?.as_str();
            let path = caps.get(2)?.as_str();
            (is_known_method(method) && path.starts_with('/'))
                .then(|| OperationKey::new(method, path))
        })
    }
}

fn front_matter(content: &str) -> Option<&str> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

/// Page identifiers in navigation order, de-duplicated, filtered by group and prefix.
///
/// # Errors
///
/// Returns an error if `group` is set and no group or tab with that name exists.
pub fn collect_pages(navigation: &Value, group: Option<&str>, prefix: &str) -> Result<Vec<String>> {
    let mut walker = NavWalker {
        group,
        prefix,
        group_found: group.is_none(),
        seen: HashSet::new(),
        pages: Vec::new(),
    };
    walker.walk(navigation, group.is_none());
    if !walker.group_found {
        return Err(OpenApiToolsError::Config(format!(
            "navigation group '{}' not found",
            group.unwrap_or_default()
        )));
    }
    Ok(walker.pages)
}

struct NavWalker<'a> {
    group: Option<&'a str>,
    prefix: &'a str,
    group_found: bool,
    seen: HashSet<String>,
    pages: Vec<String>,
}

impl NavWalker<'_> {
    fn walk(&mut self, value: &Value, selected: bool) {
        match value {
            Value::String(page) => {
                if selected && page.starts_with(self.prefix) && self.seen.insert(page.clone()) {
                    self.pages.push(page.clone());
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, selected);
                }
            }
            Value::Object(map) => {
                let name = ["group", "tab"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str));
                let matches = matches!((self.group, name), (Some(g), Some(n)) if g == n);
                if matches {
                    self.group_found = true;
                }
                let selected = selected || matches;
                // Pages only ever appear inside arrays; plain string fields are labels.
                // Key order is document order (`preserve_order`).
                for v in map.values().filter(|v| v.is_array() || v.is_object()) {
                    self.walk(v, selected);
                }
            }
            _ => {}
        }
    }
}

/// Convenience for callers that only need options -> extraction.
///
/// # Errors
///
/// See [`Extractor::run`].
pub fn extract(options: ExtractorOptions) -> Result<Extraction> {
    Extractor::new(options)?.run()
}

#[must_use]
pub fn default_navigation(docs_root: &Path) -> PathBuf {
    let docs_json = docs_root.join("docs.json");
    if docs_json.is_file() {
        docs_json
    } else {
        docs_root.join("mint.json")
    }
}
