//! Export of [`SchemaNode`]s as JSON Schema (draft 2020-12) and validation
//! of values against them.

use serde_json::{Map, Number, Value, json};

use crate::relations::RelationScope;
use crate::schema::{
    AdditionalProperties, ArraySchema, ExclusiveBound, IntegerSchema, NumberSchema, ObjectSchema,
    SchemaNode, StringSchema,
};

const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

fn typed(name: &str) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".to_owned(), Value::String(name.to_owned()));
    schema
}

fn insert_some(schema: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        schema.insert(key.to_owned(), value);
    }
}

fn float(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}

/// Writes `minimum`/`exclusiveMinimum` (or the maximum pair) in the
/// threshold form, whichever dialect the bound was declared in.
fn bounds<T>(
    schema: &mut Map<String, Value>,
    keys: (&str, &str),
    inclusive: Option<T>,
    exclusive: Option<ExclusiveBound<T>>,
    to_value: impl Fn(T) -> Option<Value>,
) {
    let (inclusive_key, exclusive_key) = keys;
    match exclusive {
        Some(ExclusiveBound::Threshold(limit)) => {
            insert_some(schema, exclusive_key, to_value(limit));
            insert_some(schema, inclusive_key, inclusive.and_then(&to_value));
        }
        Some(ExclusiveBound::Flag(true)) => {
            insert_some(schema, exclusive_key, inclusive.and_then(&to_value));
        }
        Some(ExclusiveBound::Flag(false)) | None => {
            insert_some(schema, inclusive_key, inclusive.and_then(&to_value));
        }
    }
}

fn string_schema(s: &StringSchema) -> Map<String, Value> {
    let mut schema = typed("string");
    insert_some(&mut schema, "pattern", s.pattern.clone().map(Value::String));
    insert_some(&mut schema, "minLength", s.min_length.map(Value::from));
    insert_some(&mut schema, "maxLength", s.max_length.map(Value::from));
    insert_some(&mut schema, "const", s.const_value.clone().map(Value::String));
    insert_some(&mut schema, "enum", s.enum_values.clone().map(Value::from));
    schema
}

fn integer_schema(s: &IntegerSchema) -> Map<String, Value> {
    let mut schema = typed("integer");
    let to_value = |v: i64| Some(Value::from(v));
    bounds(&mut schema, ("minimum", "exclusiveMinimum"), s.minimum, s.exclusive_minimum, to_value);
    bounds(&mut schema, ("maximum", "exclusiveMaximum"), s.maximum, s.exclusive_maximum, to_value);
    insert_some(&mut schema, "const", s.const_value.map(Value::from));
    insert_some(&mut schema, "enum", s.enum_values.clone().map(Value::from));
    schema
}

fn number_schema(s: &NumberSchema) -> Map<String, Value> {
    let mut schema = typed("number");
    bounds(&mut schema, ("minimum", "exclusiveMinimum"), s.minimum, s.exclusive_minimum, float);
    bounds(&mut schema, ("maximum", "exclusiveMaximum"), s.maximum, s.exclusive_maximum, float);
    insert_some(&mut schema, "const", s.const_value.and_then(float));
    insert_some(
        &mut schema,
        "enum",
        s.enum_values
            .as_ref()
            .map(|values| Value::Array(values.iter().copied().filter_map(float).collect())),
    );
    schema
}

fn array_schema(s: &ArraySchema) -> Map<String, Value> {
    let mut schema = typed("array");
    schema.insert("items".to_owned(), s.items.to_json_schema());
    insert_some(&mut schema, "minItems", s.min_items.map(Value::from));
    insert_some(&mut schema, "maxItems", s.max_items.map(Value::from));
    insert_some(&mut schema, "const", s.const_value.clone().map(Value::Array));
    insert_some(
        &mut schema,
        "enum",
        s.enum_values
            .as_ref()
            .map(|values| Value::Array(values.iter().cloned().map(Value::Array).collect())),
    );
    schema
}

fn object_schema(s: &ObjectSchema) -> Map<String, Value> {
    let mut schema = typed("object");
    let properties: Map<String, Value> = s
        .properties
        .iter()
        .map(|(name, property)| (name.clone(), property.to_json_schema()))
        .collect();
    schema.insert("properties".to_owned(), Value::Object(properties));

    // read-only and always-omitted properties never appear in requests
    let mapping = s.meta.constraint_mapping.as_deref();
    let required: Vec<Value> = s
        .required
        .iter()
        .filter(|name| s.property(name).is_none_or(|p| !p.is_read_only()))
        .filter(|name| mapping.is_none_or(|m| !m.forces_ignore(name, RelationScope::Body)))
        .map(|name| Value::String(name.clone()))
        .collect();
    if !required.is_empty() {
        schema.insert("required".to_owned(), Value::Array(required));
    }

    match &s.additional_properties {
        AdditionalProperties::Allowed => {}
        AdditionalProperties::Schema(extra) => {
            schema.insert("additionalProperties".to_owned(), extra.to_json_schema());
        }
        AdditionalProperties::Forbidden => {
            schema.insert("additionalProperties".to_owned(), Value::Bool(false));
        }
    }
    insert_some(&mut schema, "minProperties", s.min_properties.map(Value::from));
    insert_some(&mut schema, "maxProperties", s.max_properties.map(Value::from));
    insert_some(&mut schema, "const", s.const_value.clone().map(Value::Object));
    insert_some(
        &mut schema,
        "enum",
        s.enum_values
            .as_ref()
            .map(|values| Value::Array(values.iter().cloned().map(Value::Object).collect())),
    );
    schema
}

impl SchemaNode {
    /// This node as a JSON Schema fragment.
    ///
    /// Keywords the generator does not enforce (`format`, `multipleOf`,
    /// `uniqueItems`) are left out.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let schema = match self {
            SchemaNode::Null(_) => typed("null"),
            SchemaNode::Boolean(s) => {
                let mut schema = typed("boolean");
                insert_some(&mut schema, "const", s.const_value.map(Value::Bool));
                schema
            }
            SchemaNode::String(s) => string_schema(s),
            SchemaNode::Integer(s) => integer_schema(s),
            SchemaNode::Number(s) => number_schema(s),
            SchemaNode::Array(s) => array_schema(s),
            SchemaNode::Object(s) => object_schema(s),
            SchemaNode::Union(u) => {
                let arms: Vec<Value> =
                    u.resolved().iter().map(SchemaNode::to_json_schema).collect();
                return match <[Value; 1]>::try_from(arms) {
                    Ok([single]) => single,
                    Err(arms) => json!({ "anyOf": arms }),
                };
            }
        };
        if self.meta().nullable {
            return json!({ "anyOf": [Value::Object(schema), {"type": "null"}] });
        }
        Value::Object(schema)
    }

    /// [`Self::to_json_schema`] with the draft declared, ready for a
    /// validator.
    #[must_use]
    pub fn to_json_schema_document(&self) -> Value {
        let mut document = Map::new();
        document.insert("$schema".to_owned(), Value::String(DRAFT_2020_12.to_owned()));
        let schema = self.to_json_schema();
        if let Value::Object(schema) = schema {
            document.extend(schema);
        } else {
            document.insert("allOf".to_owned(), Value::Array(vec![schema]));
        }
        Value::Object(document)
    }
}

/// Errors `value` raises against `node`; empty when it is valid.
#[must_use]
pub fn validate_value(node: &SchemaNode, value: &Value) -> Vec<String> {
    let schema = node.to_json_schema_document();
    match jsonschema::validator_for(&schema) {
        Ok(validator) => validator
            .iter_errors(value)
            .map(|error| error.to_string())
            .collect(),
        Err(e) => vec![format!("failed to compile schema: {e}")],
    }
}

/// Whether `value` is accepted by `node`.
#[must_use]
pub fn is_valid(node: &SchemaNode, value: &Value) -> bool {
    validate_value(node, value).is_empty()
}
