//! `OpenAPI` schema -> JSON Schema conversion for tool input/output schemas.
//!
//! Refs are inlined so MCP clients get self-contained schemas. Recursive schemas are cut off at
//! the point of recursion (the recursive position becomes an unconstrained `{}`).

use crate::resolver::{DocId, OpenApiResolver};
use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
use serde_json::{Map, Value, json};

const DEFAULT_MAX_DEPTH: usize = 12;

pub struct SchemaConverter<'a> {
    resolver: &'a OpenApiResolver,
    max_depth: usize,
}

impl<'a> SchemaConverter<'a> {
    #[must_use]
    pub fn new(resolver: &'a OpenApiResolver) -> Self {
        Self {
            resolver,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn convert_ref(&self, doc: &DocId, schema: &ReferenceOr<Schema>) -> Value {
        let mut stack = Vec::new();
        self.convert_ref_inner(doc, schema, &mut stack)
    }

    #[must_use]
    pub fn convert(&self, doc: &DocId, schema: &Schema) -> Value {
        let mut stack = Vec::new();
        self.convert_inner(doc, schema, &mut stack)
    }

    fn convert_ref_inner(
        &self,
        doc: &DocId,
        schema: &ReferenceOr<Schema>,
        stack: &mut Vec<String>,
    ) -> Value {
        match schema {
            ReferenceOr::Item(s) => self.convert_inner(doc, s, stack),
            ReferenceOr::Reference { reference } => self.follow_ref(doc, reference, stack),
        }
    }

    fn convert_boxed(
        &self,
        doc: &DocId,
        schema: &ReferenceOr<Box<Schema>>,
        stack: &mut Vec<String>,
    ) -> Value {
        match schema {
            ReferenceOr::Item(s) => self.convert_inner(doc, s, stack),
            ReferenceOr::Reference { reference } => self.follow_ref(doc, reference, stack),
        }
    }

    fn follow_ref(&self, doc: &DocId, reference: &str, stack: &mut Vec<String>) -> Value {
        let key = match self.resolver.ref_key(doc, reference) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "unusable schema $ref");
                return json!({});
            }
        };
        if stack.contains(&key) || stack.len() >= self.max_depth {
            return json!({});
        }

        let resolved = self
            .resolver
            .resolve_schema(doc, &ReferenceOr::ref_(reference));
        match resolved {
            Ok((target_doc, schema)) => {
                stack.push(key);
                let out = self.convert_inner(&target_doc, &schema, stack);
                stack.pop();
                out
            }
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "unresolved schema $ref");
                json!({})
            }
        }
    }

    fn convert_inner(&self, doc: &DocId, schema: &Schema, stack: &mut Vec<String>) -> Value {
        let mut result = Map::new();
        let data = &schema.schema_data;

        if let Some(desc) = &data.description {
            result.insert("description".into(), json!(desc));
        } else if let Some(title) = &data.title {
            result.insert("description".into(), json!(title));
        }
        if let Some(default) = &data.default {
            result.insert("default".into(), default.clone());
        }

        let mut type_name: Option<&str> = None;
        match &schema.schema_kind {
            SchemaKind::Type(t) => match t {
                Type::String(s) => {
                    type_name = Some("string");
                    let values: Vec<&String> = s.enumeration.iter().flatten().collect();
                    if !values.is_empty() {
                        result.insert("enum".into(), json!(values));
                    }
                }
                Type::Number(n) => {
                    type_name = Some("number");
                    let values: Vec<f64> = n.enumeration.iter().flatten().copied().collect();
                    if !values.is_empty() {
                        result.insert("enum".into(), json!(values));
                    }
                }
                Type::Integer(i) => {
                    type_name = Some("integer");
                    let values: Vec<i64> = i.enumeration.iter().flatten().copied().collect();
                    if !values.is_empty() {
                        result.insert("enum".into(), json!(values));
                    }
                }
                Type::Boolean(_) => {
                    type_name = Some("boolean");
                }
                Type::Array(a) => {
                    type_name = Some("array");
                    if let Some(items) = &a.items {
                        result.insert("items".into(), self.convert_boxed(doc, items, stack));
                    }
                }
                Type::Object(o) => {
                    type_name = Some("object");
                    if !o.properties.is_empty() {
                        let mut properties = Map::new();
                        for (name, prop) in &o.properties {
                            properties.insert(name.clone(), self.convert_boxed(doc, prop, stack));
                        }
                        result.insert("properties".into(), Value::Object(properties));
                    }
                    if !o.required.is_empty() {
                        result.insert("required".into(), json!(o.required));
                    }
                }
            },
            SchemaKind::OneOf { one_of } => {
                result.insert("oneOf".into(), self.convert_list(doc, one_of, stack));
            }
            SchemaKind::AnyOf { any_of } => {
                result.insert("anyOf".into(), self.convert_list(doc, any_of, stack));
            }
            SchemaKind::AllOf { all_of } => {
                result.insert("allOf".into(), self.convert_list(doc, all_of, stack));
            }
            SchemaKind::Not { .. } | SchemaKind::Any(_) => {}
        }

        if let Some(t) = type_name {
            let ty = if data.nullable {
                json!([t, "null"])
            } else {
                json!(t)
            };
            result.insert("type".into(), ty);
        }

        Value::Object(result)
    }

    fn convert_list(
        &self,
        doc: &DocId,
        schemas: &[ReferenceOr<Schema>],
        stack: &mut Vec<String>,
    ) -> Value {
        Value::Array(
            schemas
                .iter()
                .map(|s| self.convert_ref_inner(doc, s, stack))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::OpenAPI;

    const SPEC: &str = r"
openapi: 3.0.0
info: { title: t, version: '1' }
paths: {}
components:
  schemas:
    Agent:
      type: object
      required: [name]
      properties:
        name: { type: string, description: Agent name }
        language: { type: string, enum: [en, de], nullable: true }
        tags:
          type: array
          items: { $ref: '#/components/schemas/Tag' }
        parent: { $ref: '#/components/schemas/Agent' }
    Tag:
      type: object
      properties:
        label: { type: string }
    Either:
      oneOf:
        - { $ref: '#/components/schemas/Tag' }
        - { type: integer }
";

    fn resolver() -> OpenApiResolver {
        let spec: OpenAPI = serde_yaml::from_str(SPEC).unwrap();
        OpenApiResolver::new(DocId::Inline, &spec).unwrap()
    }

    #[test]
    fn inlines_refs_and_cuts_recursion() {
        let resolver = resolver();
        let converter = SchemaConverter::new(&resolver);
        let out = converter.convert_ref(
            &DocId::Inline,
            &ReferenceOr::ref_("#/components/schemas/Agent"),
        );

        assert_eq!(out["type"], "object");
        assert_eq!(out["required"], json!(["name"]));
        assert_eq!(out["properties"]["name"]["description"], "Agent name");
        assert_eq!(out["properties"]["language"]["type"], json!(["string", "null"]));
        assert_eq!(out["properties"]["language"]["enum"], json!(["en", "de"]));
        assert_eq!(
            out["properties"]["tags"]["items"]["properties"]["label"]["type"],
            "string"
        );
        assert_eq!(out["properties"]["parent"], json!({}));
    }

    #[test]
    fn converts_composition_keywords() {
        let resolver = resolver();
        let converter = SchemaConverter::new(&resolver);
        let out = converter.convert_ref(
            &DocId::Inline,
            &ReferenceOr::ref_("#/components/schemas/Either"),
        );
        assert_eq!(out["oneOf"][0]["type"], "object");
        assert_eq!(out["oneOf"][1]["type"], "integer");
        assert!(out.get("type").is_none());
    }

    #[test]
    fn unresolved_ref_becomes_unconstrained() {
        let resolver = resolver();
        let converter = SchemaConverter::new(&resolver);
        let out = converter.convert_ref(
            &DocId::Inline,
            &ReferenceOr::ref_("#/components/schemas/Missing"),
        );
        assert_eq!(out, json!({}));
    }
}
