//! Operations of an `OpenAPI` document with their parameters and request
//! body loaded into [`SchemaNode`]s.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::mapping_config::MappingTable;
use crate::relations::ConstraintMapping;
use crate::schema::{SchemaError, SchemaNode, StringSchema};
use crate::schema_loader::{SchemaLoader, resolve_reference};
use crate::settings::GeneratorSettings;

const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Header,
    Path,
    Cookie,
}

impl ParameterLocation {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "path" => Some(ParameterLocation::Path),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Path template, e.g. `/employees/{employee_id}`.
    pub path: String,
    /// Lowercase HTTP method.
    pub method: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub body_schema: Option<SchemaNode>,
    pub has_body: bool,
    pub constraint_mapping: Option<Arc<ConstraintMapping>>,
}

impl Operation {
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }
}

/// Escape a path for use inside a JSON pointer.
fn pointer_escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn is_template_segment(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

/// All operations of a document, in document order.
#[derive(Debug, Clone, Default)]
pub struct OperationIndex {
    operations: Vec<Operation>,
}

impl OperationIndex {
    /// Load every operation under `paths`, embedding the mapping registered
    /// for it.
    ///
    /// # Errors
    /// `SchemaError` for malformed parameters, request bodies or schemas.
    pub fn from_document(
        document: &Value,
        mappings: &MappingTable,
        settings: &GeneratorSettings,
    ) -> Result<Self, SchemaError> {
        let mut loader = SchemaLoader::new(document, settings);
        let mut operations = Vec::new();

        let Some(paths) = document.get("paths").and_then(Value::as_object) else {
            tracing::warn!("Document has no paths");
            return Ok(Self { operations });
        };

        for (path, item) in paths {
            let item = resolve_reference(document, item)?;
            let Some(item) = item.as_object() else {
                continue;
            };
            let location = format!("#/paths/{}", pointer_escape(path));
            let shared = item.get("parameters");

            for method in HTTP_METHODS {
                let Some(raw) = item.get(*method) else {
                    continue;
                };
                let mapping = mappings.get(path, method);
                let operation = load_operation(
                    &mut loader,
                    document,
                    path,
                    method,
                    raw,
                    shared,
                    &format!("{location}/{method}"),
                    mapping,
                )?;
                operations.push(operation);
            }
        }

        tracing::info!(
            "Loaded {} operations ({} cached schema references, {} reuses)",
            operations.len(),
            loader.cache().len(),
            loader.cache().hits()
        );
        Ok(Self { operations })
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn get(&self, path: &str, method: &str) -> Option<&Operation> {
        let method = method.to_lowercase();
        self.operations
            .iter()
            .find(|op| op.path == path && op.method == method)
    }

    /// Template path that `concrete` is an instance of. Literal segments
    /// take precedence over template segments.
    #[must_use]
    pub fn match_path(&self, concrete: &str) -> Option<&str> {
        let wanted: Vec<&str> = concrete.trim_end_matches('/').split('/').collect();
        let mut best: Option<(&str, usize)> = None;
        let mut seen: Vec<&str> = Vec::new();

        for op in &self.operations {
            if seen.contains(&op.path.as_str()) {
                continue;
            }
            seen.push(&op.path);
            let template: Vec<&str> = op.path.trim_end_matches('/').split('/').collect();
            if template.len() != wanted.len() {
                continue;
            }
            let mut literal = 0;
            let matches = template.iter().zip(&wanted).all(|(t, w)| {
                if is_template_segment(t) {
                    !w.is_empty()
                } else if t == w {
                    literal += 1;
                    true
                } else {
                    false
                }
            });
            if matches && best.is_none_or(|(_, score)| literal > score) {
                best = Some((&op.path, literal));
            }
        }
        best.map(|(path, _)| path)
    }
}

#[allow(clippy::too_many_arguments)]
fn load_operation(
    loader: &mut SchemaLoader<'_>,
    document: &Value,
    path: &str,
    method: &str,
    raw: &Value,
    shared: Option<&Value>,
    location: &str,
    mapping: Option<Arc<ConstraintMapping>>,
) -> Result<Operation, SchemaError> {
    let mut parameters: Vec<Parameter> = Vec::new();
    let path_location = location.rsplit_once('/').map_or(location, |(prefix, _)| prefix);
    let lists = [(shared, path_location), (raw.get("parameters"), location)];
    for (list, list_location) in lists {
        let Some(list) = list.and_then(Value::as_array) else {
            continue;
        };
        for (i, entry) in list.iter().enumerate() {
            let parameter = load_parameter(
                loader,
                document,
                entry,
                &format!("{list_location}/parameters/{i}"),
            )?;
            if let Some(existing) = parameters
                .iter_mut()
                .find(|p| p.name == parameter.name && p.location == parameter.location)
            {
                *existing = parameter;
            } else {
                parameters.push(parameter);
            }
        }
    }

    let (body_schema, has_body) = match raw.get("requestBody") {
        Some(body) => {
            let body = resolve_reference(document, body)?;
            let schema = json_body_schema(body, path, method)
                .map(|schema| {
                    loader.load_with_mapping(
                        schema,
                        &format!("{location}/requestBody"),
                        mapping.clone(),
                    )
                })
                .transpose()?;
            (schema, true)
        }
        None => (None, false),
    };

    Ok(Operation {
        path: path.to_owned(),
        method: method.to_owned(),
        operation_id: raw.get("operationId").and_then(Value::as_str).map(str::to_owned),
        parameters,
        body_schema,
        has_body,
        constraint_mapping: mapping,
    })
}

fn load_parameter(
    loader: &mut SchemaLoader<'_>,
    document: &Value,
    entry: &Value,
    location: &str,
) -> Result<Parameter, SchemaError> {
    let entry = resolve_reference(document, entry)?;
    let field = |key: &str| entry.get(key).and_then(Value::as_str);
    let name = field("name").ok_or_else(|| SchemaError::InvalidKeyword {
        keyword: "name".to_owned(),
        location: location.to_owned(),
        reason: "parameter without a name".to_owned(),
    })?;
    let parameter_location = field("in").and_then(ParameterLocation::parse).ok_or_else(|| {
        SchemaError::InvalidKeyword {
            keyword: "in".to_owned(),
            location: location.to_owned(),
            reason: "expected query, header, path or cookie".to_owned(),
        }
    })?;

    let raw_schema = entry.get("schema").or_else(|| {
        entry
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.values().next())
            .and_then(|media| media.get("schema"))
    });
    let schema = match raw_schema {
        Some(raw) => loader.load(raw, &format!("{location}/schema"))?,
        None => SchemaNode::String(StringSchema::default()),
    };

    Ok(Parameter {
        name: name.to_owned(),
        location: parameter_location,
        required: parameter_location == ParameterLocation::Path
            || entry.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema,
    })
}

/// The schema of the JSON media type of a request body.
fn json_body_schema<'v>(body: &'v Value, path: &str, method: &str) -> Option<&'v Value> {
    let content: &Map<String, Value> = body.get("content").and_then(Value::as_object)?;
    let json_types: Vec<(&String, &Value)> = content
        .iter()
        .filter(|(media_type, _)| media_type.contains("json"))
        .collect();
    match json_types.as_slice() {
        [] => {
            if !content.is_empty() {
                tracing::warn!(
                    "No JSON media type in request body of {} {}, body generation disabled",
                    method,
                    path
                );
            }
            None
        }
        [(_, media), rest @ ..] => {
            if !rest.is_empty() {
                tracing::warn!(
                    "Multiple JSON media types for {} {}, using the first",
                    method,
                    path
                );
            }
            media.get("schema")
        }
    }
}
