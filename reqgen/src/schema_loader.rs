//! One-shot construction of [`SchemaNode`] trees from raw `OpenAPI` schema
//! JSON.
//!
//! A loader owns the [`RefCache`] for one run over one document. Local
//! `$ref`s are followed until the same reference is entered more than
//! `recursion_limit` times on the current path; past that point the
//! configured default value stands in for the schema.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::relations::ConstraintMapping;
use crate::schema::{
    AdditionalProperties, ArraySchema, BooleanSchema, ExclusiveBound, IntegerSchema, NullSchema,
    NumberSchema, ObjectSchema, SchemaError, SchemaMeta, SchemaNode, StringSchema, UnionSchema,
};
use crate::settings::GeneratorSettings;

const MAX_REFERENCE_HOPS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OasVersion {
    V30,
    V31,
}

impl OasVersion {
    /// The version a document declares; `None` for standalone schemas.
    #[must_use]
    pub fn detect(document: &Value) -> Option<Self> {
        let declared = document.get("openapi").and_then(Value::as_str)?;
        Some(if declared.starts_with("3.1") {
            OasVersion::V31
        } else {
            OasVersion::V30
        })
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            OasVersion::V30 => "3.0",
            OasVersion::V31 => "3.1",
        }
    }
}

/// Loaded schemas per `$ref`, for subtrees that never hit the recursion
/// limit and therefore load the same way wherever they are referenced.
#[derive(Debug, Default)]
pub struct RefCache {
    entries: HashMap<String, SchemaNode>,
    hits: usize,
}

impl RefCache {
    fn get(&mut self, reference: &str) -> Option<SchemaNode> {
        let node = self.entries.get(reference).cloned();
        if node.is_some() {
            self.hits += 1;
        }
        node
    }

    fn insert(&mut self, reference: &str, node: SchemaNode) {
        self.entries.insert(reference.to_owned(), node);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Follow a chain of local `$ref`s on a raw JSON object (parameters,
/// request bodies) to the referenced value.
///
/// # Errors
/// `SchemaError::UnresolvedReference` for non-local, missing or cyclic
/// references.
pub fn resolve_reference<'v>(
    document: &'v Value,
    raw: &'v Value,
) -> Result<&'v Value, SchemaError> {
    let mut current = raw;
    for _ in 0..MAX_REFERENCE_HOPS {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return Ok(current);
        };
        current = lookup(document, reference)?;
    }
    Err(SchemaError::UnresolvedReference(format!(
        "reference chain longer than {MAX_REFERENCE_HOPS} hops"
    )))
}

fn lookup<'v>(document: &'v Value, reference: &str) -> Result<&'v Value, SchemaError> {
    reference
        .strip_prefix('#')
        .and_then(|pointer| document.pointer(pointer))
        .ok_or_else(|| SchemaError::UnresolvedReference(reference.to_owned()))
}

pub struct SchemaLoader<'d> {
    document: &'d Value,
    version: Option<OasVersion>,
    recursion_limit: usize,
    recursion_default: Value,
    cache: RefCache,
    active: Vec<String>,
    truncated: bool,
}

impl<'d> SchemaLoader<'d> {
    #[must_use]
    pub fn new(document: &'d Value, settings: &GeneratorSettings) -> Self {
        Self {
            document,
            version: OasVersion::detect(document),
            recursion_limit: settings.recursion_limit,
            recursion_default: settings.recursion_default.clone(),
            cache: RefCache::default(),
            active: Vec::new(),
            truncated: false,
        }
    }

    #[must_use]
    pub fn version(&self) -> Option<OasVersion> {
        self.version
    }

    #[must_use]
    pub fn cache(&self) -> &RefCache {
        &self.cache
    }

    /// Load a schema found at `location` in the document.
    ///
    /// # Errors
    /// `SchemaError` for unresolvable references, invalid `allOf` members and
    /// malformed keywords.
    pub fn load(&mut self, raw: &Value, location: &str) -> Result<SchemaNode, SchemaError> {
        self.parse(raw, location)
    }

    /// Load a schema and embed `mapping` into its root.
    ///
    /// # Errors
    /// Same as [`SchemaLoader::load`].
    pub fn load_with_mapping(
        &mut self,
        raw: &Value,
        location: &str,
        mapping: Option<Arc<ConstraintMapping>>,
    ) -> Result<SchemaNode, SchemaError> {
        let node = self.parse(raw, location)?;
        Ok(match mapping {
            Some(mapping) => node.with_constraint_mapping(mapping),
            None => node,
        })
    }

    fn parse(&mut self, raw: &Value, location: &str) -> Result<SchemaNode, SchemaError> {
        let raw = match raw {
            Value::Bool(true) => return Ok(SchemaNode::String(StringSchema::default())),
            Value::Object(map) => map,
            _ => return Err(SchemaError::NotAnObject(location.to_owned())),
        };

        if let Some(reference) = raw.get("$ref").and_then(Value::as_str) {
            return self.parse_reference(reference);
        }

        let mut meta = SchemaMeta {
            read_only: raw.get("readOnly").and_then(Value::as_bool).unwrap_or(false),
            write_only: raw.get("writeOnly").and_then(Value::as_bool).unwrap_or(false),
            nullable: self.nullable_keyword(raw, location),
            constraint_mapping: None,
        };

        if ["allOf", "anyOf", "oneOf"].iter().any(|k| raw.contains_key(*k)) {
            return self.parse_union(raw, meta, location);
        }

        let mut types: Vec<String> = match raw.get("type") {
            Some(Value::String(t)) => vec![t.clone()],
            Some(Value::Array(ts)) => {
                if self.version == Some(OasVersion::V30) {
                    tracing::warn!("Type array at '{}' in an OpenAPI 3.0 document", location);
                }
                ts.iter().filter_map(Value::as_str).map(str::to_owned).collect()
            }
            Some(_) => {
                return Err(invalid_keyword("type", location, "expected a string or array"));
            }
            None => vec![infer_type(raw).to_owned()],
        };
        if types.len() > 1 && types.iter().any(|t| t == "null") {
            meta.nullable = true;
            types.retain(|t| t != "null");
        }
        if enum_allows_null(raw) && types.iter().all(|t| t != "null") {
            meta.nullable = true;
        }

        let node = match types.as_slice() {
            [single] => self.parse_typed(single, raw, meta.clone(), location)?,
            several => {
                let mut arms = Vec::with_capacity(several.len());
                for t in several {
                    arms.push(self.parse_typed(t, raw, SchemaMeta::default(), location)?);
                }
                let union_meta = SchemaMeta {
                    nullable: false,
                    ..meta.clone()
                };
                SchemaNode::Union(UnionSchema::new(union_meta, Vec::new(), arms, Vec::new())?)
            }
        };

        if meta.nullable && !matches!(node, SchemaNode::Null(_)) {
            return Ok(SchemaNode::Union(UnionSchema::nullable(node)));
        }
        Ok(node)
    }

    /// `nullable` is a 3.0 keyword; 3.1 documents express it with a type
    /// array.
    fn nullable_keyword(&self, raw: &Map<String, Value>, location: &str) -> bool {
        let nullable = raw.get("nullable").and_then(Value::as_bool).unwrap_or(false);
        if nullable && self.version == Some(OasVersion::V31) {
            tracing::warn!("Ignoring 'nullable' at '{}' in an OpenAPI 3.1 document", location);
            return false;
        }
        nullable
    }

    fn parse_reference(&mut self, reference: &str) -> Result<SchemaNode, SchemaError> {
        let depth = self.active.iter().filter(|r| *r == reference).count();
        if depth > self.recursion_limit {
            tracing::debug!(
                "Recursion limit reached at '{}', substituting {}",
                reference,
                self.recursion_default
            );
            self.truncated = true;
            return Ok(SchemaNode::from_const(&self.recursion_default));
        }
        if let Some(node) = self.cache.get(reference) {
            return Ok(node);
        }

        let target = lookup(self.document, reference)?;
        let outer_truncated = std::mem::replace(&mut self.truncated, false);
        self.active.push(reference.to_owned());
        let result = self.parse(target, reference);
        self.active.pop();

        let node = result?;
        if !self.truncated {
            self.cache.insert(reference, node.clone());
        }
        self.truncated |= outer_truncated;
        Ok(node)
    }

    fn parse_union(
        &mut self,
        raw: &Map<String, Value>,
        meta: SchemaMeta,
        location: &str,
    ) -> Result<SchemaNode, SchemaError> {
        let mut all_of = self.parse_members(raw, "allOf", location)?;
        let any_of = self.parse_members(raw, "anyOf", location)?;
        let one_of = self.parse_members(raw, "oneOf", location)?;

        // sibling object keywords take part in the merge
        if raw.contains_key("properties") || raw.contains_key("required") {
            let mut sibling = raw.clone();
            for key in ["allOf", "anyOf", "oneOf", "nullable", "readOnly", "writeOnly"] {
                sibling.remove(key);
            }
            sibling.insert("type".to_owned(), Value::String("object".to_owned()));
            let node = self.parse(&Value::Object(sibling), location)?;
            if all_of.is_empty() && (!any_of.is_empty() || !one_of.is_empty()) {
                tracing::debug!("Ignoring object keywords next to anyOf/oneOf at '{}'", location);
            } else {
                all_of.push(node);
            }
        }

        Ok(SchemaNode::Union(UnionSchema::new(meta, all_of, any_of, one_of)?))
    }

    fn parse_members(
        &mut self,
        raw: &Map<String, Value>,
        key: &str,
        location: &str,
    ) -> Result<Vec<SchemaNode>, SchemaError> {
        let Some(members) = raw.get(key) else {
            return Ok(Vec::new());
        };
        let members = members
            .as_array()
            .ok_or_else(|| invalid_keyword(key, location, "expected an array"))?;
        members
            .iter()
            .enumerate()
            .map(|(i, member)| self.parse(member, &format!("{location}/{key}/{i}")))
            .collect()
    }

    fn parse_typed(
        &mut self,
        type_name: &str,
        raw: &Map<String, Value>,
        meta: SchemaMeta,
        location: &str,
    ) -> Result<SchemaNode, SchemaError> {
        let meta = SchemaMeta {
            nullable: false,
            ..meta
        };
        match type_name {
            "null" => Ok(SchemaNode::Null(NullSchema { meta })),
            "boolean" => Ok(SchemaNode::Boolean(BooleanSchema {
                meta,
                const_value: raw.get("const").and_then(Value::as_bool),
            })),
            "string" => parse_string(raw, meta, location).map(SchemaNode::String),
            "integer" => {
                parse_integer(raw, meta, self.version, location).map(SchemaNode::Integer)
            }
            "number" => parse_number(raw, meta, self.version, location).map(SchemaNode::Number),
            "array" => self.parse_array(raw, meta, location).map(SchemaNode::Array),
            "object" => self.parse_object(raw, meta, location).map(SchemaNode::Object),
            other => Err(SchemaError::UnsupportedType(other.to_owned())),
        }
    }

    fn parse_array(
        &mut self,
        raw: &Map<String, Value>,
        meta: SchemaMeta,
        location: &str,
    ) -> Result<ArraySchema, SchemaError> {
        let items = match raw.get("items") {
            Some(items) => self.parse(items, &format!("{location}/items"))?,
            None => SchemaNode::String(StringSchema::default()),
        };
        Ok(ArraySchema {
            meta,
            min_items: usize_keyword(raw, "minItems", location)?,
            max_items: usize_keyword(raw, "maxItems", location)?,
            unique_items: raw.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false),
            const_value: raw.get("const").and_then(Value::as_array).cloned(),
            enum_values: typed_enum(raw, location, |v| v.as_array().cloned())?,
            ..ArraySchema::new(items)
        })
    }

    fn parse_object(
        &mut self,
        raw: &Map<String, Value>,
        meta: SchemaMeta,
        location: &str,
    ) -> Result<ObjectSchema, SchemaError> {
        let mut properties = Vec::new();
        if let Some(props) = raw.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| invalid_keyword("properties", location, "expected an object"))?;
            for (name, schema) in props {
                let node = self.parse(schema, &format!("{location}/properties/{name}"))?;
                properties.push((name.clone(), node));
            }
        }

        let required = match raw.get("required") {
            Some(Value::Array(names)) => {
                names.iter().filter_map(Value::as_str).map(str::to_owned).collect()
            }
            Some(_) => return Err(invalid_keyword("required", location, "expected an array")),
            None => Vec::new(),
        };

        let additional_properties = match raw.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allowed,
            Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
            Some(schema) => AdditionalProperties::Schema(Box::new(
                self.parse(schema, &format!("{location}/additionalProperties"))?,
            )),
        };

        Ok(ObjectSchema {
            meta,
            properties,
            required,
            additional_properties,
            min_properties: usize_keyword(raw, "minProperties", location)?,
            max_properties: usize_keyword(raw, "maxProperties", location)?,
            const_value: raw.get("const").and_then(Value::as_object).cloned(),
            enum_values: typed_enum(raw, location, |v| v.as_object().cloned())?,
        })
    }
}

// ---------------------------------------------------------------------------
// Keyword helpers
// ---------------------------------------------------------------------------

fn invalid_keyword(keyword: &str, location: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidKeyword {
        keyword: keyword.to_owned(),
        location: location.to_owned(),
        reason: reason.to_owned(),
    }
}

fn infer_type(raw: &Map<String, Value>) -> &'static str {
    let object_keys = [
        "properties",
        "required",
        "additionalProperties",
        "minProperties",
        "maxProperties",
    ];
    if object_keys.iter().any(|k| raw.contains_key(*k)) {
        return "object";
    }
    if raw.contains_key("items") || raw.contains_key("minItems") || raw.contains_key("maxItems") {
        return "array";
    }
    let sample = raw.get("const").or_else(|| {
        raw.get("enum")
            .and_then(Value::as_array)
            .and_then(|v| v.iter().find(|x| !x.is_null()))
    });
    match sample {
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "integer",
        Some(Value::Number(_)) => "number",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
        Some(Value::Null) => "null",
        Some(Value::String(_)) | None => "string",
    }
}

fn enum_allows_null(raw: &Map<String, Value>) -> bool {
    raw.get("enum")
        .and_then(Value::as_array)
        .is_some_and(|values| values.iter().any(Value::is_null))
}

fn usize_keyword(
    raw: &Map<String, Value>,
    key: &str,
    location: &str,
) -> Result<Option<usize>, SchemaError> {
    match raw.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid_keyword(key, location, "expected a non-negative integer")),
    }
}

/// `enum` values converted per schema type; `null` entries are dropped
/// because nullability is expressed as a union arm.
fn typed_enum<T>(
    raw: &Map<String, Value>,
    location: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Option<Vec<T>>, SchemaError> {
    let Some(values) = raw.get("enum") else {
        return Ok(None);
    };
    let values = values
        .as_array()
        .ok_or_else(|| invalid_keyword("enum", location, "expected an array"))?;
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| {
            convert(v).ok_or_else(|| {
                invalid_keyword("enum", location, "value does not match the schema type")
            })
        })
        .collect::<Result<Vec<T>, _>>()
        .map(Some)
}

fn integer_value(value: &Value, round_up: bool) -> Option<i64> {
    value.as_i64().or_else(|| {
        let f = value.as_f64()?;
        let rounded = if round_up { f.ceil() } else { f.floor() };
        #[allow(clippy::cast_possible_truncation)]
        let as_int = rounded as i64;
        rounded.is_finite().then_some(as_int)
    })
}

/// The raw exclusive bound under `key`, unless it is written in the form of
/// the other dialect than the one the document declares.
fn exclusive_keyword<'r>(
    raw: &'r Map<String, Value>,
    key: &str,
    version: Option<OasVersion>,
    location: &str,
) -> Option<&'r Value> {
    let value = raw.get(key)?;
    let Some(version) = version else {
        return Some(value);
    };
    let foreign = match version {
        OasVersion::V30 => value.is_number(),
        OasVersion::V31 => value.is_boolean(),
    };
    if foreign {
        tracing::warn!(
            "Ignoring '{}' at '{}': {} is not its OpenAPI {} form",
            key,
            location,
            value,
            version.label()
        );
        return None;
    }
    Some(value)
}

fn integer_exclusive(
    raw: &Map<String, Value>,
    key: &str,
    round_up: bool,
    version: Option<OasVersion>,
    location: &str,
) -> Result<Option<ExclusiveBound<i64>>, SchemaError> {
    match exclusive_keyword(raw, key, version, location) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(ExclusiveBound::Flag(*flag))),
        Some(value) => integer_value(value, round_up)
            .map(|t| Some(ExclusiveBound::Threshold(t)))
            .ok_or_else(|| invalid_keyword(key, location, "expected a boolean or a number")),
    }
}

fn number_exclusive(
    raw: &Map<String, Value>,
    key: &str,
    version: Option<OasVersion>,
    location: &str,
) -> Result<Option<ExclusiveBound<f64>>, SchemaError> {
    match exclusive_keyword(raw, key, version, location) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(ExclusiveBound::Flag(*flag))),
        Some(value) => value
            .as_f64()
            .map(|t| Some(ExclusiveBound::Threshold(t)))
            .ok_or_else(|| invalid_keyword(key, location, "expected a boolean or a number")),
    }
}

fn parse_string(
    raw: &Map<String, Value>,
    meta: SchemaMeta,
    location: &str,
) -> Result<StringSchema, SchemaError> {
    Ok(StringSchema {
        meta,
        format: raw.get("format").and_then(Value::as_str).map(str::to_owned),
        pattern: raw.get("pattern").and_then(Value::as_str).map(str::to_owned),
        min_length: usize_keyword(raw, "minLength", location)?,
        max_length: usize_keyword(raw, "maxLength", location)?,
        const_value: raw.get("const").and_then(Value::as_str).map(str::to_owned),
        enum_values: typed_enum(raw, location, |v| v.as_str().map(str::to_owned))?,
    })
}

fn parse_integer(
    raw: &Map<String, Value>,
    meta: SchemaMeta,
    version: Option<OasVersion>,
    location: &str,
) -> Result<IntegerSchema, SchemaError> {
    // fractional limits round toward the valid side
    Ok(IntegerSchema {
        meta,
        format: raw.get("format").and_then(Value::as_str).map(str::to_owned),
        minimum: raw.get("minimum").and_then(|v| integer_value(v, true)),
        maximum: raw.get("maximum").and_then(|v| integer_value(v, false)),
        exclusive_minimum: integer_exclusive(raw, "exclusiveMinimum", false, version, location)?,
        exclusive_maximum: integer_exclusive(raw, "exclusiveMaximum", true, version, location)?,
        multiple_of: raw.get("multipleOf").and_then(Value::as_f64),
        const_value: raw.get("const").and_then(Value::as_i64),
        enum_values: typed_enum(raw, location, Value::as_i64)?,
    })
}

fn parse_number(
    raw: &Map<String, Value>,
    meta: SchemaMeta,
    version: Option<OasVersion>,
    location: &str,
) -> Result<NumberSchema, SchemaError> {
    Ok(NumberSchema {
        meta,
        format: raw.get("format").and_then(Value::as_str).map(str::to_owned),
        minimum: raw.get("minimum").and_then(Value::as_f64),
        maximum: raw.get("maximum").and_then(Value::as_f64),
        exclusive_minimum: number_exclusive(raw, "exclusiveMinimum", version, location)?,
        exclusive_maximum: number_exclusive(raw, "exclusiveMaximum", version, location)?,
        multiple_of: raw.get("multipleOf").and_then(Value::as_f64),
        const_value: raw.get("const").and_then(Value::as_f64),
        enum_values: typed_enum(raw, location, Value::as_f64)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(document: &Value, raw: &Value) -> Result<SchemaNode, SchemaError> {
        SchemaLoader::new(document, &GeneratorSettings::default()).load(raw, "#")
    }

    #[test]
    fn test_version_detection() {
        assert_eq!(OasVersion::detect(&json!({"openapi": "3.1.0"})), Some(OasVersion::V31));
        assert_eq!(OasVersion::detect(&json!({"openapi": "3.0.3"})), Some(OasVersion::V30));
        assert_eq!(OasVersion::detect(&json!({"type": "string"})), None);
    }

    #[test]
    fn test_nullable_is_ignored_in_3_1() {
        let document = json!({"openapi": "3.1.0"});
        let node = load(&document, &json!({"type": "string", "nullable": true})).unwrap();
        assert!(matches!(node, SchemaNode::String(_)));

        let node = load(&document, &json!({"type": ["string", "null"]})).unwrap();
        let kinds: Vec<&str> = node.resolved_schemas().iter().map(SchemaNode::type_name).collect();
        assert_eq!(kinds, vec!["string", "null"]);
    }

    #[test]
    fn test_exclusive_bounds_follow_declared_version() {
        let v30 = json!({"openapi": "3.0.3"});
        let flag = json!({"type": "integer", "minimum": 1, "exclusiveMinimum": true});
        let threshold = json!({"type": "number", "minimum": 1.0, "exclusiveMinimum": 4.0});

        let SchemaNode::Integer(int) = load(&v30, &flag).unwrap() else {
            panic!("integer expected")
        };
        assert_eq!(int.exclusive_minimum, Some(ExclusiveBound::Flag(true)));
        let SchemaNode::Number(num) = load(&v30, &threshold).unwrap() else {
            panic!("number expected")
        };
        assert_eq!(num.exclusive_minimum, None);
        assert_eq!(num.minimum, Some(1.0));

        let v31 = json!({"openapi": "3.1.0"});
        let SchemaNode::Integer(int) = load(&v31, &flag).unwrap() else {
            panic!("integer expected")
        };
        assert_eq!(int.exclusive_minimum, None);
        assert_eq!(int.resolved_minimum(), 1);
        let SchemaNode::Number(num) = load(&v31, &threshold).unwrap() else {
            panic!("number expected")
        };
        assert_eq!(num.exclusive_minimum, Some(ExclusiveBound::Threshold(4.0)));
    }

    #[test]
    fn test_nullable_rewrite() {
        let node = load(&json!({}), &json!({"type": "string", "nullable": true})).unwrap();
        let kinds: Vec<&str> = node.resolved_schemas().iter().map(SchemaNode::type_name).collect();
        assert_eq!(kinds, vec!["string", "null"]);
        assert!(!node.resolved_schemas()[0].meta().nullable);
    }

    #[test]
    fn test_type_array_rewrite() {
        let node = load(&json!({}), &json!({"type": ["integer", "null"], "minimum": 3})).unwrap();
        let [SchemaNode::Integer(int), SchemaNode::Null(_)] = node.resolved_schemas() else {
            panic!("expected integer and null arms");
        };
        assert_eq!(int.minimum, Some(3));
    }

    #[test]
    fn test_enum_null_folds_into_nullability() {
        let node = load(&json!({}), &json!({"type": "string", "enum": ["a", null]})).unwrap();
        let [SchemaNode::String(s), SchemaNode::Null(_)] = node.resolved_schemas() else {
            panic!("expected string and null arms");
        };
        assert_eq!(s.enum_values, Some(vec!["a".to_owned()]));
    }

    #[test]
    fn test_type_inference() {
        let obj = load(&json!({}), &json!({"properties": {"a": {"type": "integer"}}})).unwrap();
        assert!(matches!(obj, SchemaNode::Object(_)));
        let arr = load(&json!({}), &json!({"items": {"type": "string"}})).unwrap();
        assert!(matches!(arr, SchemaNode::Array(_)));
        let int = load(&json!({}), &json!({"enum": [1, 2]})).unwrap();
        assert!(matches!(int, SchemaNode::Integer(_)));
    }

    #[test]
    fn test_exclusive_bounds_both_dialects() {
        let v30 = load(
            &json!({}),
            &json!({"type": "integer", "minimum": 1, "exclusiveMinimum": true}),
        )
        .unwrap();
        let SchemaNode::Integer(v30) = v30 else { panic!("integer expected") };
        assert_eq!(v30.resolved_minimum(), 2);

        let v31 = load(&json!({}), &json!({"type": "integer", "exclusiveMinimum": 1})).unwrap();
        let SchemaNode::Integer(v31) = v31 else { panic!("integer expected") };
        assert_eq!(v31.resolved_minimum(), 2);
    }

    #[test]
    fn test_ref_resolution_and_cache() {
        let document = json!({
            "components": {"schemas": {
                "Name": {"type": "string", "maxLength": 5}
            }}
        });
        let mut loader = SchemaLoader::new(&document, &GeneratorSettings::default());
        let raw = json!({"type": "object", "properties": {
            "first": {"$ref": "#/components/schemas/Name"},
            "last": {"$ref": "#/components/schemas/Name"}
        }});
        let node = loader.load(&raw, "#").unwrap();
        let SchemaNode::Object(obj) = node else { panic!("object expected") };
        assert!(matches!(
            obj.property("last"),
            Some(SchemaNode::String(s)) if s.max_length == Some(5)
        ));
        assert_eq!(loader.cache().len(), 1);
        assert_eq!(loader.cache().hits(), 1);
    }

    #[test]
    fn test_unresolved_ref() {
        let result = load(&json!({}), &json!({"$ref": "#/components/schemas/Missing"}));
        assert!(matches!(result, Err(SchemaError::UnresolvedReference(_))));
    }

    #[test]
    fn test_recursion_limit_substitutes_default() {
        let document = json!({
            "components": {"schemas": {
                "Node": {"type": "object", "properties": {
                    "child": {"$ref": "#/components/schemas/Node"}
                }}
            }}
        });
        let node = load(&document, &json!({"$ref": "#/components/schemas/Node"})).unwrap();
        // Node -> child Node (limit 1) -> child substituted
        let SchemaNode::Object(root) = node else { panic!("object expected") };
        let Some(SchemaNode::Object(child)) = root.property("child") else {
            panic!("child object expected")
        };
        let Some(SchemaNode::Object(leaf)) = child.property("child") else {
            panic!("leaf expected")
        };
        assert_eq!(leaf.const_value, Some(Map::new()));
    }

    #[test]
    fn test_all_of_with_sibling_properties() {
        let document = json!({
            "components": {"schemas": {
                "Base": {
                    "type": "object",
                    "properties": {"id": {"type": "integer"}},
                    "required": ["id"]
                }
            }}
        });
        let raw = json!({
            "allOf": [{"$ref": "#/components/schemas/Base"}],
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let node = load(&document, &raw).unwrap();
        let [SchemaNode::Object(merged)] = node.resolved_schemas() else {
            panic!("expected merged object");
        };
        assert_eq!(merged.required, vec!["id".to_owned(), "name".to_owned()]);
    }

    #[test]
    fn test_malformed_keyword() {
        let result = load(&json!({}), &json!({"type": "string", "maxLength": -1}));
        assert!(matches!(result, Err(SchemaError::InvalidKeyword { .. })));
        let result = load(&json!({}), &json!({"type": "tuple"}));
        assert!(matches!(result, Err(SchemaError::UnsupportedType(_))));
    }

    #[test]
    fn test_mapping_embedded_at_root() {
        let mapping = Arc::new(ConstraintMapping::default());
        let mut loader = SchemaLoader::new(&Value::Null, &GeneratorSettings::default());
        let node = loader
            .load_with_mapping(&json!({"type": "object", "nullable": true}), "#", Some(mapping))
            .unwrap();
        assert!(node.constraint_mapping().is_some());
        assert!(node.resolved_schemas()[0].constraint_mapping().is_some());
    }

    #[test]
    fn test_resolve_reference_chain() {
        let document = json!({"components": {"parameters": {
            "A": {"$ref": "#/components/parameters/B"},
            "B": {"name": "limit", "in": "query"}
        }}});
        let raw = json!({"$ref": "#/components/parameters/A"});
        let resolved = resolve_reference(&document, &raw).unwrap();
        assert_eq!(resolved["name"], json!("limit"));
    }
}
