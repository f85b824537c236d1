//! Valid value generation.
//!
//! [`ValueGenerator`] borrows the shared random source and the injected
//! capabilities for the duration of one request; it holds no other state.
//! Invalid value generation lives in [`crate::invalidator`] as a second
//! `impl` block on the same type.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::pattern;
use crate::providers::{IdProvider, ProviderError};
use crate::random::Randomness;
use crate::relations::{ConstraintMapping, ConstraintValue, RelationScope};
use crate::schema::{
    AdditionalProperties, ArraySchema, DEFAULT_MAX_LENGTH, IntegerSchema, NumberSchema,
    ObjectSchema, SchemaNode, StringSchema, UnionSchema,
};
use crate::settings::DependencyPolicy;
use crate::value_source::RawValueSource;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No way to produce the requested data: {0}")]
    Exhausted(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Strategy not applicable: {0}")]
    Inapplicable(String),
    #[error("Schema cannot be satisfied: {0}")]
    Unsatisfiable(String),
    #[error(
        "Property '{property}' has {candidates} id dependencies and none matches the operation"
    )]
    AmbiguousDependency { property: String, candidates: usize },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct ValueGenerator<'a> {
    pub(crate) random: &'a mut Randomness,
    pub(crate) values: &'a dyn RawValueSource,
    pub(crate) ids: &'a dyn IdProvider,
    pub(crate) operation_id: Option<&'a str>,
    pub(crate) dependency_policy: DependencyPolicy,
}

pub(crate) fn number_value(value: f64) -> Result<Value, GenerationError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| GenerationError::Unsatisfiable(format!("{value} is not a JSON number")))
}

impl<'a> ValueGenerator<'a> {
    pub fn new(
        random: &'a mut Randomness,
        values: &'a dyn RawValueSource,
        ids: &'a dyn IdProvider,
    ) -> Self {
        Self {
            random,
            values,
            ids,
            operation_id: None,
            dependency_policy: DependencyPolicy::default(),
        }
    }

    /// Used to disambiguate id dependencies shared by several operations.
    #[must_use]
    pub fn for_operation(mut self, operation_id: Option<&'a str>) -> Self {
        self.operation_id = operation_id;
        self
    }

    #[must_use]
    pub fn with_dependency_policy(mut self, policy: DependencyPolicy) -> Self {
        self.dependency_policy = policy;
        self
    }

    pub fn random(&mut self) -> &mut Randomness {
        self.random
    }

    /// Generate a value that `node` accepts.
    ///
    /// # Errors
    /// `Unsatisfiable` for contradictory bounds or empty enums, and any error
    /// raised while resolving id dependencies.
    pub fn generate_valid(&mut self, node: &SchemaNode) -> Result<Value, GenerationError> {
        match node {
            SchemaNode::Null(_) => Ok(Value::Null),
            SchemaNode::Boolean(s) => Ok(Value::Bool(
                s.const_value.unwrap_or_else(|| self.random.coin()),
            )),
            SchemaNode::String(s) => self.valid_string(s),
            SchemaNode::Integer(s) => self.valid_integer(s),
            SchemaNode::Number(s) => self.valid_number(s),
            SchemaNode::Array(s) => self.valid_array(s),
            SchemaNode::Object(s) => self.valid_object(s),
            SchemaNode::Union(u) => self.valid_union(u),
        }
    }

    /// Pick one of the allowed values; `None` means the target must be left
    /// out.
    ///
    /// # Errors
    /// Errors from generating a chosen nested schema.
    pub fn value_from_candidates(
        &mut self,
        candidates: &[ConstraintValue],
    ) -> Result<Option<Value>, GenerationError> {
        match self.random.choose(candidates) {
            None | Some(ConstraintValue::Ignore) => Ok(None),
            Some(ConstraintValue::Value(v)) => Ok(Some(v.clone())),
            Some(ConstraintValue::Schema(schema)) => self.generate_valid(schema).map(Some),
        }
    }

    fn pick_enum<T: Clone>(&mut self, values: &[T]) -> Result<T, GenerationError> {
        self.random
            .choose(values)
            .cloned()
            .ok_or_else(|| GenerationError::Unsatisfiable("enum without values".to_owned()))
    }

    fn formatted_string(&mut self, format: &str) -> String {
        if let Some(value) = self.values.string_for_format(format, self.random) {
            return value;
        }
        tracing::debug!("No generator for string format '{}', using uuid", format);
        self.values
            .string_for_format("uuid", self.random)
            .unwrap_or_else(|| self.values.opaque_string(self.random))
    }

    fn valid_string(&mut self, s: &StringSchema) -> Result<Value, GenerationError> {
        if let Some(value) = &s.const_value {
            return Ok(Value::String(value.clone()));
        }
        if let Some(values) = &s.enum_values {
            return self.pick_enum(values).map(Value::String);
        }
        if let Some(regex) = &s.pattern {
            match pattern::generate_matching(regex, self.random) {
                Ok(value) => return Ok(Value::String(value)),
                Err(e) => tracing::warn!("{}; falling back to format-based generation", e),
            }
        }

        let min = s.min_length.unwrap_or(0);
        let max = s.max_length.unwrap_or_else(|| DEFAULT_MAX_LENGTH.max(min));
        if min > max {
            return Err(GenerationError::Unsatisfiable(format!(
                "minLength {min} exceeds maxLength {max}"
            )));
        }

        let format = s.format.as_deref().unwrap_or("uuid");
        let mut value = self.formatted_string(format);
        while value.chars().count() < min {
            value.push_str(&self.values.opaque_string(self.random));
        }
        if value.chars().count() > max {
            value = value.chars().take(max).collect();
        }
        Ok(Value::String(value))
    }

    fn valid_integer(&mut self, s: &IntegerSchema) -> Result<Value, GenerationError> {
        if let Some(value) = s.const_value {
            return Ok(Value::from(value));
        }
        if let Some(values) = &s.enum_values {
            return self.pick_enum(values).map(Value::from);
        }
        let min = s.resolved_minimum();
        let max = s.resolved_maximum();
        if min > max {
            return Err(GenerationError::Unsatisfiable(format!(
                "integer minimum {min} exceeds maximum {max}"
            )));
        }
        if let Some(step) = integral_step(s.multiple_of) {
            let low = min.div_euclid(step) + i64::from(min.rem_euclid(step) != 0);
            let high = max.div_euclid(step);
            if low <= high {
                let k = self.random.int_in(low, high);
                if let Some(value) = k.checked_mul(step) {
                    return Ok(Value::from(value));
                }
            }
        }
        Ok(Value::from(self.random.int_in(min, max)))
    }

    fn valid_number(&mut self, s: &NumberSchema) -> Result<Value, GenerationError> {
        if let Some(value) = s.const_value {
            return number_value(value);
        }
        if let Some(values) = &s.enum_values {
            let value = self.pick_enum(values)?;
            return number_value(value);
        }
        let min = s.resolved_minimum();
        let max = s.resolved_maximum();
        if min > max {
            return Err(GenerationError::Unsatisfiable(format!(
                "number minimum {min} exceeds maximum {max}"
            )));
        }
        number_value(self.random.float_in(min, max))
    }

    fn valid_array(&mut self, s: &ArraySchema) -> Result<Value, GenerationError> {
        if let Some(value) = &s.const_value {
            return Ok(Value::Array(value.clone()));
        }
        if let Some(values) = &s.enum_values {
            return self.pick_enum(values).map(Value::Array);
        }
        let (min, max) = s.item_count_range();
        let count = self.random.usize_in(min, max);
        let items = (0..count)
            .map(|_| self.generate_valid(&s.items))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(items))
    }

    fn valid_object(&mut self, s: &ObjectSchema) -> Result<Value, GenerationError> {
        if let Some(value) = &s.const_value {
            return Ok(Value::Object(value.clone()));
        }
        if let Some(values) = &s.enum_values {
            return self.pick_enum(values).map(Value::Object);
        }

        let mapping = s.meta.constraint_mapping.clone();
        let mut names: Vec<&str> = s
            .property_names()
            .filter(|name| {
                mapping
                    .as_deref()
                    .is_none_or(|m| !m.forces_ignore(name, RelationScope::Body))
            })
            .collect();

        if let Some(max) = s.max_properties
            && names.len() > max
        {
            let (required, optional): (Vec<&str>, Vec<&str>) =
                names.iter().copied().partition(|name| s.is_required(name));
            let room = max.saturating_sub(required.len());
            let sampled = self.random.sample(&optional, room);
            names.retain(|name| required.contains(name) || sampled.contains(name));
        }

        let mut result = Map::new();
        for name in names {
            let Some(schema) = s.property(name) else {
                continue;
            };
            if schema.is_read_only() {
                continue;
            }
            if let Some(mapping) = mapping.as_deref() {
                if let Some(candidates) = mapping.constrained_values(name, RelationScope::Body) {
                    match self.value_from_candidates(candidates)? {
                        Some(value) => {
                            result.insert(name.to_owned(), value);
                        }
                        None => tracing::debug!("Leaving out '{}' as constrained", name),
                    }
                    continue;
                }
                if let Some(id) = mapping.dependent_id(
                    name,
                    RelationScope::Body,
                    self.operation_id,
                    self.ids,
                    self.dependency_policy,
                )? {
                    result.insert(name.to_owned(), id);
                    continue;
                }
            }
            let value = self.generate_valid(schema)?;
            result.insert(name.to_owned(), value);
        }

        self.top_up_properties(s, &mut result)?;
        Ok(Value::Object(result))
    }

    /// Add undeclared properties until `min_properties` is met, where the
    /// schema allows them.
    fn top_up_properties(
        &mut self,
        s: &ObjectSchema,
        result: &mut Map<String, Value>,
    ) -> Result<(), GenerationError> {
        let Some(min) = s.min_properties else {
            return Ok(());
        };
        let mut index = 0;
        while result.len() < min {
            let value = match &s.additional_properties {
                AdditionalProperties::Forbidden => return Ok(()),
                AdditionalProperties::Allowed => {
                    Value::String(self.values.opaque_string(self.random))
                }
                AdditionalProperties::Schema(schema) => self.generate_valid(schema)?,
            };
            let key = format!("additional_property_{index}");
            index += 1;
            if !result.contains_key(&key) && !s.has_property(&key) {
                result.insert(key, value);
            }
        }
        Ok(())
    }

    fn valid_union(&mut self, u: &UnionSchema) -> Result<Value, GenerationError> {
        let arms = u.resolved();

        let constrained: Vec<&str> = u
            .meta
            .constraint_mapping
            .as_deref()
            .map_or_else(Vec::new, ConstraintMapping::constrained_properties);

        let preferred: Vec<&SchemaNode> = if constrained.is_empty() {
            Vec::new()
        } else {
            arms.iter()
                .filter(|arm| match arm {
                    SchemaNode::Object(o) => constrained.iter().all(|name| o.has_property(name)),
                    _ => false,
                })
                .collect()
        };

        let chosen = if preferred.is_empty() {
            self.random.choose(arms)
        } else {
            self.random.choose(&preferred).copied()
        };
        let chosen = chosen
            .ok_or_else(|| GenerationError::Unsatisfiable("union without schemas".to_owned()))?
            .clone();
        tracing::debug!("Generating from '{}' arm of union", chosen.type_name());
        self.generate_valid(&chosen)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integral_step(multiple_of: Option<f64>) -> Option<i64> {
    let step = multiple_of?;
    (step >= 1.0 && step.fract().abs() < f64::EPSILON && step < 9.0e15).then_some(step as i64)
}
