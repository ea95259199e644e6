//! Specification loader: reads an `OpenAPI` 3.0 document into an ordered operation list.

use crate::error::{OpenApiToolsError, Result};
use crate::resolver::{DocId, OpenApiResolver};
use crate::schema::SchemaConverter;
use openapiv3::{
    MediaType, OpenAPI, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody, Response,
    StatusCode,
};
use reqwest::Method;
use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

const KNOWN_METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE",
];

/// Identity of an operation: upper-case method plus normalized path (`GET /v1/agents`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey {
    method: String,
    path: String,
}

impl OperationKey {
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: normalize_path(path),
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl FromStr for OperationKey {
    type Err = OpenApiToolsError;

    fn from_str(s: &str) -> Result<Self> {
        let (method, path) = s.trim().split_once(char::is_whitespace).ok_or_else(|| {
            OpenApiToolsError::Whitelist(format!("expected 'METHOD /path', got '{s}'"))
        })?;
        let method = method.to_ascii_uppercase();
        if !KNOWN_METHODS.contains(&method.as_str()) {
            return Err(OpenApiToolsError::Whitelist(format!(
                "unknown HTTP method '{method}' in '{s}'"
            )));
        }
        let path = path.trim();
        if path.is_empty() {
            return Err(OpenApiToolsError::Whitelist(format!(
                "missing path in '{s}'"
            )));
        }
        Ok(Self::new(&method, path))
    }
}

/// Leading `/` ensured, trailing `/` stripped (except for the root path).
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[must_use]
pub fn is_known_method(method: &str) -> bool {
    KNOWN_METHODS.contains(&method.to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    /// One property of a flattened JSON object body.
    BodyField,
    /// The entire request body, exposed as a single `body` argument.
    Body,
}

#[derive(Debug, Clone)]
pub struct OperationParameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
}

impl OperationParameter {
    /// Object/array typed parameters accept stringified JSON from callers.
    #[must_use]
    pub fn expects_structured_value(&self) -> bool {
        let ty = self.schema.get("type");
        let is = |name: &str| match ty {
            Some(Value::String(s)) => s == name,
            Some(Value::Array(items)) => items.iter().any(|v| v == name),
            _ => false,
        };
        is("object") || is("array")
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub key: OperationKey,
    pub method: Method,
    /// Path template exactly as declared, used for parameter substitution.
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<OperationParameter>,
    pub accepts_body: bool,
    pub input_schema: Arc<JsonObject>,
    pub response_schema: Option<Value>,
}

/// A parsed specification: metadata plus operations in document order.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    pub title: String,
    pub version: String,
    pub operations: Vec<Operation>,
}

impl ApiSpec {
    /// Parse a specification from a JSON or YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid `OpenAPI` 3.0 document.
    pub fn from_str_with_location(content: &str, location: &str) -> Result<Self> {
        // JSON is a valid subset of YAML, so serde_yaml alone is enough.
        let doc: OpenAPI =
            serde_yaml::from_str(content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
                location: location.to_string(),
                source: e,
            })?;
        Self::from_openapi(&doc, DocId::Inline)
    }

    /// Build the operation list from a parsed document.
    ///
    /// Operations that cannot be interpreted (unresolvable refs, cookie parameters, parameter
    /// collisions) are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be cached for `$ref` resolution.
    pub fn from_openapi(doc: &OpenAPI, root: DocId) -> Result<Self> {
        let resolver = OpenApiResolver::new(root, doc)?;
        let converter = SchemaConverter::new(&resolver);
        let mut operations = Vec::new();

        for (path, path_item) in &doc.paths.paths {
            let (path_doc, path_item) =
                match resolver.resolve_path_item(resolver.root_doc(), path_item) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "skipping path");
                        continue;
                    }
                };

            let methods = [
                (Method::GET, &path_item.get),
                (Method::POST, &path_item.post),
                (Method::PUT, &path_item.put),
                (Method::DELETE, &path_item.delete),
                (Method::PATCH, &path_item.patch),
            ];

            for (method, op) in methods {
                let Some(op) = op else {
                    continue;
                };
                let input = OperationInput {
                    doc: &path_doc,
                    path,
                    method: &method,
                    path_item_params: &path_item.parameters,
                    operation: op,
                };
                match build_operation(&resolver, &converter, input) {
                    Ok(operation) => operations.push(operation),
                    Err(e) => {
                        tracing::warn!(
                            operation = %OperationKey::new(method.as_str(), path),
                            error = %e,
                            "skipping operation"
                        );
                    }
                }
            }
        }

        Ok(Self {
            title: doc.info.title.clone(),
            version: doc.info.version.clone(),
            operations,
        })
    }
}

/// Read and parse a specification file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid `OpenAPI` 3.0 document.
pub fn load_spec(path: &Path) -> Result<ApiSpec> {
    tracing::info!(path = %path.display(), "loading OpenAPI spec");
    let content =
        std::fs::read_to_string(path).map_err(|e| OpenApiToolsError::OpenApiSpecReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
    let doc: OpenAPI =
        serde_yaml::from_str(&content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
            location: path.display().to_string(),
            source: e,
        })?;
    let spec = ApiSpec::from_openapi(&doc, DocId::file(path))?;
    tracing::info!(
        title = %spec.title,
        version = %spec.version,
        operations = spec.operations.len(),
        "OpenAPI spec loaded"
    );
    Ok(spec)
}

struct OperationInput<'a> {
    doc: &'a DocId,
    path: &'a str,
    method: &'a Method,
    path_item_params: &'a [ReferenceOr<Parameter>],
    operation: &'a openapiv3::Operation,
}

fn build_operation(
    resolver: &OpenApiResolver,
    converter: &SchemaConverter<'_>,
    input: OperationInput<'_>,
) -> Result<Operation> {
    let op = input.operation;
    let key = OperationKey::new(input.method.as_str(), input.path);

    let merged = merge_parameters(resolver, input.doc, input.path_item_params, &op.parameters)?;
    let mut parameters = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for (param_doc, param) in &merged {
        let parameter = extract_parameter(converter, param_doc, param)?;
        if !names.insert(parameter.name.clone()) {
            return Err(OpenApiToolsError::ParamCollision(format!(
                "Parameter '{}' appears multiple times in {key}",
                parameter.name
            )));
        }
        parameters.push(parameter);
    }

    let mut accepts_body = false;
    if let Some(body_ref) = &op.request_body {
        accepts_body = true;
        let (body_doc, body) = resolver.resolve_request_body(input.doc, body_ref)?;
        for bp in extract_body_params(resolver, converter, &body_doc, &body)? {
            if !names.insert(bp.name.clone()) {
                return Err(OpenApiToolsError::ParamCollision(format!(
                    "Body parameter '{}' collides with a path/query/header parameter in {key}",
                    bp.name
                )));
            }
            parameters.push(bp);
        }
    }

    let input_schema = Arc::new(build_input_schema(&parameters));
    let response_schema = derive_response_schema(resolver, converter, input.doc, op)?;

    Ok(Operation {
        key,
        method: input.method.clone(),
        path: input.path.to_string(),
        operation_id: op.operation_id.clone(),
        summary: op.summary.clone(),
        description: op.description.clone(),
        tags: op.tags.clone(),
        parameters,
        accepts_body,
        input_schema,
        response_schema,
    })
}

fn merge_parameters(
    resolver: &OpenApiResolver,
    current_doc: &DocId,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<(DocId, Parameter)>> {
    fn key_for(p: &Parameter) -> (&'static str, String) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.clone()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.clone()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.clone()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.clone()),
        }
    }

    let mut merged: Vec<(DocId, Parameter)> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    // Operation-level parameters override path-item parameters with the same location + name.
    for p in path_item_params.iter().chain(operation_params) {
        let (doc, rp) = resolver.resolve_parameter(current_doc, p)?;
        let k = key_for(&rp);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = (doc, rp);
        } else {
            index.insert(k, merged.len());
            merged.push((doc, rp));
        }
    }

    Ok(merged)
}

fn extract_parameter(
    converter: &SchemaConverter<'_>,
    current_doc: &DocId,
    param: &Parameter,
) -> Result<OperationParameter> {
    let (data, location, required) = match param {
        // Path params are always required.
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamLocation::Path, true),
        Parameter::Query { parameter_data, .. } => {
            (parameter_data, ParamLocation::Query, parameter_data.required)
        }
        Parameter::Header { parameter_data, .. } => {
            (parameter_data, ParamLocation::Header, parameter_data.required)
        }
        Parameter::Cookie { .. } => {
            return Err(OpenApiToolsError::OpenApi(
                "Cookie parameters not supported".to_string(),
            ));
        }
    };

    let mut schema = match &data.format {
        ParameterSchemaOrContent::Schema(s) => converter.convert_ref(current_doc, s),
        ParameterSchemaOrContent::Content(_) => json!({"type": "string"}),
    };
    if let Some(obj) = schema.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &data.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Ok(OperationParameter {
        name: data.name.clone(),
        location,
        required,
        schema,
    })
}

fn extract_body_params(
    resolver: &OpenApiResolver,
    converter: &SchemaConverter<'_>,
    current_doc: &DocId,
    body: &RequestBody,
) -> Result<Vec<OperationParameter>> {
    let Some(schema_ref) = json_media_type(&body.content).and_then(|mt| mt.schema.as_ref()) else {
        // Non-JSON bodies still accept a raw `body` argument.
        return Ok(vec![OperationParameter {
            name: "body".to_string(),
            location: ParamLocation::Body,
            required: body.required,
            schema: json!({}),
        }]);
    };

    let (schema_doc, schema) = resolver.resolve_schema(current_doc, schema_ref)?;

    // Flatten object properties. Otherwise, expose a single `body` argument.
    if let openapiv3::SchemaKind::Type(openapiv3::Type::Object(obj)) = &schema.schema_kind
        && !obj.properties.is_empty()
    {
        // An optional body never makes its properties required.
        let body_required = body.required;
        let mut params = Vec::new();
        for (prop_name, prop_schema) in &obj.properties {
            let schema = match prop_schema {
                ReferenceOr::Item(s) => converter.convert(&schema_doc, s),
                ReferenceOr::Reference { reference } => {
                    converter.convert_ref(&schema_doc, &ReferenceOr::ref_(reference))
                }
            };
            params.push(OperationParameter {
                name: prop_name.clone(),
                location: ParamLocation::BodyField,
                required: body_required && obj.required.contains(prop_name),
                schema,
            });
        }
        return Ok(params);
    }

    Ok(vec![OperationParameter {
        name: "body".to_string(),
        location: ParamLocation::Body,
        required: body.required,
        schema: converter.convert(&schema_doc, &schema),
    }])
}

fn json_media_type<'a>(
    content: impl IntoIterator<Item = (&'a String, &'a MediaType)>,
) -> Option<&'a MediaType> {
    let mut fallback = None;
    for (k, v) in content {
        let lower = k.to_ascii_lowercase();
        if lower == "application/json" {
            return Some(v);
        }
        if fallback.is_none() && lower.contains("json") {
            fallback = Some(v);
        }
    }
    fallback
}

fn derive_response_schema(
    resolver: &OpenApiResolver,
    converter: &SchemaConverter<'_>,
    current_doc: &DocId,
    operation: &openapiv3::Operation,
) -> Result<Option<Value>> {
    // Prefer explicit 2xx codes (200..=299), otherwise fall back to the 2XX range.
    let mut explicit_2xx: Vec<(u16, &ReferenceOr<Response>)> = Vec::new();
    let mut range_2xx: Option<&ReferenceOr<Response>> = None;

    for (code, resp) in &operation.responses.responses {
        match code {
            StatusCode::Code(n) if (200..300).contains(n) => explicit_2xx.push((*n, resp)),
            StatusCode::Range(2) => range_2xx = Some(resp),
            _ => {}
        }
    }
    explicit_2xx.sort_by_key(|(n, _)| *n);

    let resp_ref = if let Some((_, r)) = explicit_2xx.first() {
        *r
    } else if let Some(r) = range_2xx {
        r
    } else {
        return Ok(None);
    };

    let (resp_doc, resp) = resolver.resolve_response(current_doc, resp_ref)?;
    let Some(schema_ref) = json_media_type(&resp.content).and_then(|mt| mt.schema.as_ref()) else {
        return Ok(None);
    };
    let schema = converter.convert_ref(&resp_doc, schema_ref);
    Ok(schema.is_object().then_some(schema))
}

/// Build the tool input schema for an operation from its parameters.
fn build_input_schema(parameters: &[OperationParameter]) -> JsonObject {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required && param.schema.get("default").is_none() {
            required.push(param.name.clone());
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), json!(required));
    }
    schema
}
