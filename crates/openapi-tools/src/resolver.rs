//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them.
//! This resolver supports local refs (`#/...`) and file refs relative to the document that
//! contains the `$ref` (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`).
//!
//! Callers pass the current document id (`DocId`) when resolving so nested references in split
//! specs resolve against the right base.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, Parameter, PathItem, ReferenceOr, RequestBody, Response, Schema};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    File(PathBuf),
    /// A document parsed from memory. Relative file refs resolve against the working directory.
    Inline,
}

impl DocId {
    #[must_use]
    pub fn file(path: &Path) -> Self {
        DocId::File(canonicalize_best_effort(path.to_path_buf()))
    }

    fn display(&self) -> String {
        match self {
            DocId::File(p) => p.display().to_string(),
            DocId::Inline => "<inline>".to_string(),
        }
    }
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

#[derive(Debug)]
pub struct OpenApiResolver {
    root_doc: DocId,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl OpenApiResolver {
    /// Create a new resolver for a root `OpenAPI` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the root spec cannot be converted into JSON for caching.
    pub fn new(root_doc: DocId, spec: &OpenAPI) -> Result<Self> {
        let root_value =
            serde_json::to_value(spec).map_err(|e| OpenApiToolsError::OpenApi(e.to_string()))?;
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root_value));
        Ok(Self {
            root_doc,
            docs: RwLock::new(docs),
        })
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// Resolve a `$ref` for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or is cyclic.
    pub fn resolve_parameter(
        &self,
        current_doc: &DocId,
        param: &ReferenceOr<Parameter>,
    ) -> Result<(DocId, Parameter)> {
        self.resolve_reference_or(current_doc, param)
    }

    /// Resolve a `$ref` for a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or is cyclic.
    pub fn resolve_request_body(
        &self,
        current_doc: &DocId,
        body: &ReferenceOr<RequestBody>,
    ) -> Result<(DocId, RequestBody)> {
        self.resolve_reference_or(current_doc, body)
    }

    /// Resolve a `$ref` for a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or is cyclic.
    pub fn resolve_schema(
        &self,
        current_doc: &DocId,
        schema: &ReferenceOr<Schema>,
    ) -> Result<(DocId, Schema)> {
        self.resolve_reference_or(current_doc, schema)
    }

    /// Resolve a `$ref` for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or is cyclic.
    pub fn resolve_response(
        &self,
        current_doc: &DocId,
        response: &ReferenceOr<Response>,
    ) -> Result<(DocId, Response)> {
        self.resolve_reference_or(current_doc, response)
    }

    /// Resolve a `$ref` for a path item.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved or is cyclic.
    pub fn resolve_path_item(
        &self,
        current_doc: &DocId,
        item: &ReferenceOr<PathItem>,
    ) -> Result<(DocId, PathItem)> {
        self.resolve_reference_or(current_doc, item)
    }

    /// Canonical identity of a `$ref`, used by callers to detect recursive schemas.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed.
    pub fn ref_key(&self, current_doc: &DocId, reference: &str) -> Result<String> {
        Self::canonical_ref_key(current_doc, reference)
    }

    fn resolve_reference_or<T>(&self, current_doc: &DocId, r: &ReferenceOr<T>) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference } => {
                    let key = Self::canonical_ref_key(&doc, &reference)?;
                    if !seen.insert(key) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let (target_doc, value) = self.resolve_ref_value(&doc, &reference)?;
                    let next: ReferenceOr<T> = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Failed to deserialize referenced value '{}' (doc {}) as expected type: {}",
                            reference,
                            target_doc.display(),
                            e
                        ))
                    })?;

                    doc = target_doc;
                    cur = next;
                }
            }
        }
    }

    fn resolve_ref_value(&self, current_doc: &DocId, reference: &str) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let doc_value = self.load_doc(&target_doc)?;

        let selected = if let Some(ptr) = pointer {
            doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::OpenApi(format!(
                    "Unresolved $ref '{}' (doc {}, missing pointer '{}')",
                    reference,
                    target_doc.display(),
                    ptr
                ))
            })?
        } else {
            (*doc_value).clone()
        };

        Ok((target_doc, selected))
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(frag.to_string()),
            Some(_) => {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
                )));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Remote $ref documents are not supported: {doc_part}"
            )));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Bad $ref file URL '{doc_part}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::OpenApi(format!("Bad $ref file URL (not a path): {doc_part}"))
            })?;
            return Ok(DocId::File(canonicalize_best_effort(path)));
        }

        let resolved = if Path::new(doc_part).is_absolute() {
            PathBuf::from(doc_part)
        } else {
            match current_doc {
                DocId::File(base) => base
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(doc_part),
                DocId::Inline => PathBuf::from(doc_part),
            }
        };
        Ok(DocId::File(canonicalize_best_effort(resolved)))
    }

    fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let mut key = match &target_doc {
            DocId::File(p) => format!("file:{}", p.display()),
            DocId::Inline => "inline:".to_string(),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(&ptr);
        }
        Ok(key)
    }

    fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let DocId::File(path) = doc else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Document {} is not loaded",
                doc.display()
            )));
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            OpenApiToolsError::OpenApi(format!(
                "Failed to read referenced file {}: {e}",
                path.display(),
            ))
        })?;

        let parsed: Value = serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content))
            .map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Failed to parse referenced document {}: {e}",
                    doc.display(),
                ))
            })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}
