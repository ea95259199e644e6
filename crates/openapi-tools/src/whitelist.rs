//! Whitelist file model: the set of operations allowed to become tools.
//!
//! On-disk layout is a JSON object keyed by `"METHOD /path"`:
//!
//! ```json
//! { "GET /v1/agents": { "doc_ref": "api-reference/agents/list" } }
//! ```
//!
//! The older `{"total": n, "endpoints": [{"method", "path", "file"}]}` layout is still accepted.

use crate::error::{OpenApiToolsError, Result};
use crate::spec::OperationKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: BTreeMap<OperationKey, WhitelistEntry>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WhitelistDiff {
    pub added: Vec<OperationKey>,
    pub removed: Vec<OperationKey>,
}

impl WhitelistDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WhitelistFile {
    Legacy { endpoints: Vec<LegacyEndpoint> },
    Keyed(BTreeMap<String, WhitelistEntry>),
}

#[derive(Deserialize)]
struct LegacyEndpoint {
    method: String,
    path: String,
    #[serde(default)]
    file: Option<String>,
}

impl Whitelist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns `false` (and keeps the existing entry) if the key is present.
    pub fn insert(&mut self, key: OperationKey, entry: WhitelistEntry) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    #[must_use]
    pub fn contains(&self, key: &OperationKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &OperationKey) -> Option<&WhitelistEntry> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &OperationKey) -> Option<WhitelistEntry> {
        self.entries.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &OperationKey> {
        self.entries.keys()
    }

    /// Parse whitelist JSON (either layout).
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a key is not `METHOD /path`.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: WhitelistFile = serde_json::from_str(content)?;
        Self::from_file(file)
    }

    fn from_file(file: WhitelistFile) -> Result<Self> {
        let mut whitelist = Self::new();
        match file {
            WhitelistFile::Keyed(map) => {
                for (raw, entry) in map {
                    let key: OperationKey = raw.parse()?;
                    if !whitelist.insert(key, entry) {
                        tracing::warn!(entry = %raw, "duplicate whitelist entry after normalization");
                    }
                }
            }
            WhitelistFile::Legacy { endpoints } => {
                for ep in endpoints {
                    let key: OperationKey = format!("{} {}", ep.method, ep.path).parse()?;
                    whitelist.insert(key, WhitelistEntry { doc_ref: ep.file });
                }
            }
        }
        Ok(whitelist)
    }

    /// Load a whitelist file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OpenApiToolsError::WhitelistRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let file: WhitelistFile =
            serde_json::from_str(&content).map_err(|e| OpenApiToolsError::WhitelistParse {
                path: path.display().to_string(),
                source: e,
            })?;
        let whitelist = Self::from_file(file)?;
        tracing::info!(
            path = %path.display(),
            entries = whitelist.len(),
            "whitelist loaded"
        );
        Ok(whitelist)
    }

    /// Load a whitelist file, treating a missing file as "no whitelist".
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Serialized form: keys sorted, pretty-printed, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        let map: BTreeMap<String, &WhitelistEntry> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let mut out = serde_json::to_string_pretty(&map)?;
        out.push('\n');
        Ok(out)
    }

    /// Overwrite `path` with this whitelist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Keys this whitelist adds to / drops from `previous`.
    #[must_use]
    pub fn diff(&self, previous: &Whitelist) -> WhitelistDiff {
        WhitelistDiff {
            added: self
                .keys()
                .filter(|k| !previous.contains(k))
                .cloned()
                .collect(),
            removed: previous
                .keys()
                .filter(|k| !self.contains(k))
                .cloned()
                .collect(),
        }
    }
}
