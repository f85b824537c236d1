//! Typed, immutable representation of `OpenAPI` schema fragments.
//!
//! A [`SchemaNode`] is built once by the [`crate::schema_loader::SchemaLoader`]
//! and never mutated afterwards. Composition keywords (`allOf`, `anyOf`,
//! `oneOf`) become a [`UnionSchema`] whose flat list of non-union arms is
//! computed at construction time, so [`SchemaNode::resolved_schemas`] is a
//! cheap, infallible and idempotent accessor.

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::relations::ConstraintMapping;

/// Step used to move a floating point bound just inside or outside an
/// exclusive limit.
pub const NUMBER_EPSILON: f64 = 1e-10;

/// Default maximum string length when the schema declares none.
pub const DEFAULT_MAX_LENGTH: usize = 36;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unresolvable reference '{0}'")]
    UnresolvedReference(String),
    #[error("allOf members must each resolve to exactly one object schema: {0}")]
    InvalidAllOf(String),
    #[error("Unsupported schema type '{0}'")]
    UnsupportedType(String),
    #[error("Invalid value for '{keyword}' at '{location}': {reason}")]
    InvalidKeyword {
        keyword: String,
        location: String,
        reason: String,
    },
    #[error("Schema at '{0}' must be a JSON object")]
    NotAnObject(String),
}

/// Attributes shared by every schema variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaMeta {
    pub read_only: bool,
    pub write_only: bool,
    /// Declared nullability. Loaded non-union nodes carry it as a `Null`
    /// union arm instead, with this flag cleared.
    pub nullable: bool,
    pub constraint_mapping: Option<Arc<ConstraintMapping>>,
}

/// `exclusiveMinimum` / `exclusiveMaximum` in either dialect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExclusiveBound<T> {
    /// OAS 3.0: modifies `minimum` / `maximum`.
    Flag(bool),
    /// OAS 3.1: the limit itself.
    Threshold(T),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullSchema {
    pub meta: SchemaMeta,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooleanSchema {
    pub meta: SchemaMeta,
    pub const_value: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringSchema {
    pub meta: SchemaMeta,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub const_value: Option<String>,
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegerSchema {
    pub meta: SchemaMeta,
    pub format: Option<String>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub exclusive_minimum: Option<ExclusiveBound<i64>>,
    pub exclusive_maximum: Option<ExclusiveBound<i64>>,
    pub multiple_of: Option<f64>,
    pub const_value: Option<i64>,
    pub enum_values: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberSchema {
    pub meta: SchemaMeta,
    pub format: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<ExclusiveBound<f64>>,
    pub exclusive_maximum: Option<ExclusiveBound<f64>>,
    pub multiple_of: Option<f64>,
    pub const_value: Option<f64>,
    pub enum_values: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub meta: SchemaMeta,
    pub items: Box<SchemaNode>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub const_value: Option<Vec<Value>>,
    pub enum_values: Option<Vec<Vec<Value>>>,
}

/// `additionalProperties`, ordered from most to least permissive.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AdditionalProperties {
    #[default]
    Allowed,
    Schema(Box<SchemaNode>),
    Forbidden,
}

impl AdditionalProperties {
    fn permissiveness(&self) -> u8 {
        match self {
            AdditionalProperties::Allowed => 2,
            AdditionalProperties::Schema(_) => 1,
            AdditionalProperties::Forbidden => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub meta: SchemaMeta,
    /// Declaration order is preserved.
    pub properties: Vec<(String, SchemaNode)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
    pub const_value: Option<Map<String, Value>>,
    pub enum_values: Option<Vec<Map<String, Value>>>,
}

/// `allOf` / `anyOf` / `oneOf` composition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionSchema {
    pub meta: SchemaMeta,
    all_of: Vec<SchemaNode>,
    any_of: Vec<SchemaNode>,
    one_of: Vec<SchemaNode>,
    resolved: Vec<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Null(NullSchema),
    Boolean(BooleanSchema),
    String(StringSchema),
    Integer(IntegerSchema),
    Number(NumberSchema),
    Array(ArraySchema),
    Object(ObjectSchema),
    Union(UnionSchema),
}

// ---------------------------------------------------------------------------
// Numeric bound resolution
// ---------------------------------------------------------------------------

pub(crate) fn nudge_up(value: f64) -> f64 {
    value + NUMBER_EPSILON.max(value.abs() * f64::EPSILON * 2.0)
}

pub(crate) fn nudge_down(value: f64) -> f64 {
    value - NUMBER_EPSILON.max(value.abs() * f64::EPSILON * 2.0)
}

impl IntegerSchema {
    fn format_range(&self) -> (i64, i64) {
        if self.format.as_deref() == Some("int64") {
            (i64::MIN, i64::MAX)
        } else {
            (i64::from(i32::MIN), i64::from(i32::MAX))
        }
    }

    fn explicit_minimum(&self) -> Option<i64> {
        let from_minimum = match (self.minimum, self.exclusive_minimum) {
            (Some(m), Some(ExclusiveBound::Flag(true))) => Some(m.saturating_add(1)),
            (m, _) => m,
        };
        let from_threshold = match self.exclusive_minimum {
            Some(ExclusiveBound::Threshold(t)) => Some(t.saturating_add(1)),
            _ => None,
        };
        from_minimum.max(from_threshold)
    }

    fn explicit_maximum(&self) -> Option<i64> {
        let from_maximum = match (self.maximum, self.exclusive_maximum) {
            (Some(m), Some(ExclusiveBound::Flag(true))) => Some(m.saturating_sub(1)),
            (m, _) => m,
        };
        let from_threshold = match self.exclusive_maximum {
            Some(ExclusiveBound::Threshold(t)) => Some(t.saturating_sub(1)),
            _ => None,
        };
        match (from_maximum, from_threshold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Smallest valid value.
    #[must_use]
    pub fn resolved_minimum(&self) -> i64 {
        self.explicit_minimum().unwrap_or(self.format_range().0)
    }

    /// Largest valid value.
    #[must_use]
    pub fn resolved_maximum(&self) -> i64 {
        self.explicit_maximum().unwrap_or(self.format_range().1)
    }

    #[must_use]
    pub fn has_lower_bound(&self) -> bool {
        self.explicit_minimum().is_some()
    }

    #[must_use]
    pub fn has_upper_bound(&self) -> bool {
        self.explicit_maximum().is_some()
    }
}

impl NumberSchema {
    fn explicit_minimum(&self) -> Option<f64> {
        let from_minimum = match (self.minimum, self.exclusive_minimum) {
            (Some(m), Some(ExclusiveBound::Flag(true))) => Some(nudge_up(m)),
            (m, _) => m,
        };
        let from_threshold = match self.exclusive_minimum {
            Some(ExclusiveBound::Threshold(t)) => Some(nudge_up(t)),
            _ => None,
        };
        match (from_minimum, from_threshold) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn explicit_maximum(&self) -> Option<f64> {
        let from_maximum = match (self.maximum, self.exclusive_maximum) {
            (Some(m), Some(ExclusiveBound::Flag(true))) => Some(nudge_down(m)),
            (m, _) => m,
        };
        let from_threshold = match self.exclusive_maximum {
            Some(ExclusiveBound::Threshold(t)) => Some(nudge_down(t)),
            _ => None,
        };
        match (from_maximum, from_threshold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Smallest valid value; 1.0 below the maximum when only that is given.
    #[must_use]
    pub fn resolved_minimum(&self) -> f64 {
        match (self.explicit_minimum(), self.explicit_maximum()) {
            (Some(min), _) => min,
            (None, Some(max)) => max - 1.0,
            (None, None) => -1.0,
        }
    }

    /// Largest valid value; 1.0 above the minimum when only that is given.
    #[must_use]
    pub fn resolved_maximum(&self) -> f64 {
        match (self.explicit_maximum(), self.explicit_minimum()) {
            (Some(max), _) => max,
            (None, Some(min)) => min + 1.0,
            (None, None) => 1.0,
        }
    }

    #[must_use]
    pub fn has_lower_bound(&self) -> bool {
        self.explicit_minimum().is_some()
    }

    #[must_use]
    pub fn has_upper_bound(&self) -> bool {
        self.explicit_maximum().is_some()
    }
}

impl ArraySchema {
    #[must_use]
    pub fn new(items: SchemaNode) -> Self {
        Self {
            meta: SchemaMeta::default(),
            items: Box::new(items),
            min_items: None,
            max_items: None,
            unique_items: false,
            const_value: None,
            enum_values: None,
        }
    }

    /// `(min, max)` item counts used for generation, with defaults 0 / 1 and
    /// the maximum raised to at least the minimum.
    #[must_use]
    pub fn item_count_range(&self) -> (usize, usize) {
        let min = self.min_items.unwrap_or(0);
        let max = self.max_items.unwrap_or(1).max(min);
        (min, max)
    }
}

impl ObjectSchema {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find(|(prop, _)| prop == name)
            .map(|(_, schema)| schema)
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    /// Merge object schemas following `allOf` semantics.
    fn merge_all_of(parts: &[&ObjectSchema], meta: SchemaMeta) -> ObjectSchema {
        let mut merged = ObjectSchema {
            meta,
            ..ObjectSchema::default()
        };
        let mut additional: Option<AdditionalProperties> = None;

        for part in parts {
            for (name, schema) in &part.properties {
                if !merged.has_property(name) {
                    merged.properties.push((name.clone(), schema.clone()));
                }
            }
            for name in &part.required {
                if !merged.is_required(name) {
                    merged.required.push(name.clone());
                }
            }
            additional = match additional {
                Some(current)
                    if current.permissiveness() >= part.additional_properties.permissiveness() =>
                {
                    Some(current)
                }
                _ => Some(part.additional_properties.clone()),
            };
            merged.max_properties = match (merged.max_properties, part.max_properties) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            merged.min_properties = merged.min_properties.max(part.min_properties);
            if merged.meta.constraint_mapping.is_none() {
                merged
                    .meta
                    .constraint_mapping
                    .clone_from(&part.meta.constraint_mapping);
            }
        }

        merged.additional_properties = additional.unwrap_or_default();
        merged
    }
}

// ---------------------------------------------------------------------------
// Union resolution
// ---------------------------------------------------------------------------

impl UnionSchema {
    /// Build a union and resolve it to its flat list of non-union arms.
    ///
    /// # Errors
    /// Returns `SchemaError::InvalidAllOf` when an `allOf` member does not
    /// resolve to exactly one object schema.
    pub fn new(
        meta: SchemaMeta,
        all_of: Vec<SchemaNode>,
        any_of: Vec<SchemaNode>,
        one_of: Vec<SchemaNode>,
    ) -> Result<Self, SchemaError> {
        let resolved = Self::resolve(&meta, &all_of, &any_of, &one_of)?;
        Ok(Self {
            meta,
            all_of,
            any_of,
            one_of,
            resolved,
        })
    }

    fn resolve(
        meta: &SchemaMeta,
        all_of: &[SchemaNode],
        any_of: &[SchemaNode],
        one_of: &[SchemaNode],
    ) -> Result<Vec<SchemaNode>, SchemaError> {
        let mut arms: Vec<SchemaNode> = Vec::new();
        let mut has_null = false;

        if let [single] = all_of {
            arms.extend(single.resolved_schemas().iter().cloned());
        } else if !all_of.is_empty() {
            let mut objects = Vec::with_capacity(all_of.len());
            for member in all_of {
                match member.resolved_schemas() {
                    [SchemaNode::Object(object)] => objects.push(object),
                    [SchemaNode::Object(object), SchemaNode::Null(_)] => {
                        has_null = true;
                        objects.push(object);
                    }
                    other => {
                        let kinds: Vec<&str> = other.iter().map(SchemaNode::type_name).collect();
                        return Err(SchemaError::InvalidAllOf(format!(
                            "member resolved to [{}]",
                            kinds.join(", ")
                        )));
                    }
                }
            }
            let merged = ObjectSchema::merge_all_of(
                &objects,
                SchemaMeta {
                    constraint_mapping: meta.constraint_mapping.clone(),
                    ..SchemaMeta::default()
                },
            );
            arms.push(SchemaNode::Object(merged));
        }

        for member in any_of.iter().chain(one_of) {
            arms.extend(member.resolved_schemas().iter().cloned());
        }

        let mut result = Vec::with_capacity(arms.len());
        for arm in arms {
            if let SchemaNode::Null(_) = arm {
                has_null = true;
            } else {
                result.push(arm);
            }
        }
        if has_null || meta.nullable {
            result.push(SchemaNode::Null(NullSchema::default()));
        }
        Ok(result)
    }

    /// Flat list of non-union arms.
    #[must_use]
    pub fn resolved(&self) -> &[SchemaNode] {
        &self.resolved
    }

    #[must_use]
    pub fn all_of(&self) -> &[SchemaNode] {
        &self.all_of
    }

    #[must_use]
    pub fn any_of(&self) -> &[SchemaNode] {
        &self.any_of
    }

    #[must_use]
    pub fn one_of(&self) -> &[SchemaNode] {
        &self.one_of
    }

    /// Two-armed union `{schema, null}` used for nullable schemas.
    #[must_use]
    pub fn nullable(schema: SchemaNode) -> Self {
        let mut inner = schema;
        let meta = SchemaMeta {
            read_only: inner.meta().read_only,
            write_only: inner.meta().write_only,
            nullable: false,
            constraint_mapping: inner.meta().constraint_mapping.clone(),
        };
        inner.meta_mut().nullable = false;
        let any_of = vec![inner, SchemaNode::Null(NullSchema::default())];
        let resolved = Self::resolve(&meta, &[], &any_of, &[]).unwrap_or_default();
        Self {
            meta,
            all_of: Vec::new(),
            any_of,
            one_of: Vec::new(),
            resolved,
        }
    }

    /// The non-null resolved arms, or all arms if every arm is null.
    #[must_use]
    pub fn non_null_schemas(&self) -> Vec<&SchemaNode> {
        let non_null: Vec<&SchemaNode> = self
            .resolved
            .iter()
            .filter(|s| !matches!(s, SchemaNode::Null(_)))
            .collect();
        if non_null.is_empty() {
            self.resolved.iter().collect()
        } else {
            non_null
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaNode
// ---------------------------------------------------------------------------

impl SchemaNode {
    #[must_use]
    pub fn meta(&self) -> &SchemaMeta {
        match self {
            SchemaNode::Null(s) => &s.meta,
            SchemaNode::Boolean(s) => &s.meta,
            SchemaNode::String(s) => &s.meta,
            SchemaNode::Integer(s) => &s.meta,
            SchemaNode::Number(s) => &s.meta,
            SchemaNode::Array(s) => &s.meta,
            SchemaNode::Object(s) => &s.meta,
            SchemaNode::Union(s) => &s.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut SchemaMeta {
        match self {
            SchemaNode::Null(s) => &mut s.meta,
            SchemaNode::Boolean(s) => &mut s.meta,
            SchemaNode::String(s) => &mut s.meta,
            SchemaNode::Integer(s) => &mut s.meta,
            SchemaNode::Number(s) => &mut s.meta,
            SchemaNode::Array(s) => &mut s.meta,
            SchemaNode::Object(s) => &mut s.meta,
            SchemaNode::Union(s) => &mut s.meta,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaNode::Null(_) => "null",
            SchemaNode::Boolean(_) => "boolean",
            SchemaNode::String(_) => "string",
            SchemaNode::Integer(_) => "integer",
            SchemaNode::Number(_) => "number",
            SchemaNode::Array(_) => "array",
            SchemaNode::Object(_) => "object",
            SchemaNode::Union(_) => "union",
        }
    }

    /// Flat list of non-union schemas this node stands for.
    #[must_use]
    pub fn resolved_schemas(&self) -> &[SchemaNode] {
        match self {
            SchemaNode::Union(union) => &union.resolved,
            other => std::slice::from_ref(other),
        }
    }

    #[must_use]
    pub fn constraint_mapping(&self) -> Option<&ConstraintMapping> {
        self.meta().constraint_mapping.as_deref()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.meta().read_only
    }

    /// Returns a copy of this node with `mapping` embedded. Union arms that
    /// are objects receive the mapping too, so generation from any arm sees
    /// the same relations.
    #[must_use]
    pub fn with_constraint_mapping(self, mapping: Arc<ConstraintMapping>) -> SchemaNode {
        match self {
            SchemaNode::Union(union) => {
                let meta = SchemaMeta {
                    constraint_mapping: Some(Arc::clone(&mapping)),
                    ..union.meta
                };
                let resolved = union
                    .resolved
                    .into_iter()
                    .map(|arm| match arm {
                        SchemaNode::Object(_) => arm.with_constraint_mapping(Arc::clone(&mapping)),
                        other => other,
                    })
                    .collect();
                SchemaNode::Union(UnionSchema {
                    meta,
                    all_of: union.all_of,
                    any_of: union.any_of,
                    one_of: union.one_of,
                    resolved,
                })
            }
            mut other => {
                other.meta_mut().constraint_mapping = Some(mapping);
                other
            }
        }
    }

    /// Whether `value` has the JSON type this node declares.
    #[must_use]
    pub fn matches_type(&self, value: &Value) -> bool {
        if value.is_null() && self.meta().nullable {
            return true;
        }
        match self {
            SchemaNode::Null(_) => value.is_null(),
            SchemaNode::Boolean(_) => value.is_boolean(),
            SchemaNode::String(_) => value.is_string(),
            SchemaNode::Integer(_) => value.is_i64() || value.is_u64(),
            SchemaNode::Number(_) => value.is_number(),
            SchemaNode::Array(_) => value.is_array(),
            SchemaNode::Object(_) => value.is_object(),
            SchemaNode::Union(union) => union.resolved.iter().any(|arm| arm.matches_type(value)),
        }
    }

    /// Whether a query or header value of this schema can be made invalid
    /// without relying on a relation: non-string scalars can be replaced by a
    /// string, and const/enum/length/count constraints can be violated.
    #[must_use]
    pub fn can_be_invalidated(&self) -> bool {
        match self {
            SchemaNode::Null(_) => false,
            SchemaNode::Boolean(_) | SchemaNode::Integer(_) | SchemaNode::Number(_) => true,
            SchemaNode::String(s) => {
                s.const_value.is_some()
                    || s.enum_values.is_some()
                    || s.min_length.is_some()
                    || s.max_length.is_some()
            }
            SchemaNode::Array(a) => {
                a.const_value.is_some()
                    || a.enum_values.is_some()
                    || a.min_items.is_some()
                    || a.max_items.is_some()
                    || matches!(
                        *a.items,
                        SchemaNode::Boolean(_) | SchemaNode::Integer(_) | SchemaNode::Number(_)
                    )
            }
            SchemaNode::Object(o) => o.const_value.is_some() || o.enum_values.is_some(),
            SchemaNode::Union(u) => u.resolved.iter().any(SchemaNode::can_be_invalidated),
        }
    }

    /// A node whose only valid value is `value`; used where a fixed value
    /// stands in for a schema (e.g. past the recursion limit).
    #[must_use]
    pub fn from_const(value: &Value) -> SchemaNode {
        match value {
            Value::Null => SchemaNode::Null(NullSchema::default()),
            Value::Bool(b) => SchemaNode::Boolean(BooleanSchema {
                const_value: Some(*b),
                ..BooleanSchema::default()
            }),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SchemaNode::Integer(IntegerSchema {
                    format: Some("int64".to_owned()),
                    const_value: Some(i),
                    ..IntegerSchema::default()
                }),
                None => SchemaNode::Number(NumberSchema {
                    const_value: n.as_f64(),
                    ..NumberSchema::default()
                }),
            },
            Value::String(s) => SchemaNode::String(StringSchema {
                const_value: Some(s.clone()),
                ..StringSchema::default()
            }),
            Value::Array(items) => {
                let item_schema = items
                    .first()
                    .map_or_else(|| SchemaNode::String(StringSchema::default()), Self::from_const);
                SchemaNode::Array(ArraySchema {
                    const_value: Some(items.clone()),
                    ..ArraySchema::new(item_schema)
                })
            }
            Value::Object(map) => SchemaNode::Object(ObjectSchema {
                const_value: Some(map.clone()),
                ..ObjectSchema::default()
            }),
        }
    }
}

/// JSON type name of a value, using `integer` for integral numbers.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
