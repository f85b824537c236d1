//! Invalid value generation.
//!
//! Strategies are tried from the narrowest violation to the broadest:
//! relation candidates, then `const`/`enum`, then bounds, and a change of
//! JSON type only as the last resort.

use serde_json::{Map, Value, json};

use crate::generator::{GenerationError, ValueGenerator, number_value};
use crate::relations::ConstraintValue;
use crate::schema::{
    AdditionalProperties, ArraySchema, ExclusiveBound, IntegerSchema, NumberSchema, ObjectSchema,
    SchemaNode, StringSchema, nudge_down, nudge_up,
};
use crate::validation::is_valid;

/// Outcome of invalidation: a value, or leaving the target out entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidValue {
    Value(Value),
    Ignore,
}

impl InvalidValue {
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            InvalidValue::Value(v) => Some(v),
            InvalidValue::Ignore => None,
        }
    }
}

fn inapplicable(reason: &str) -> GenerationError {
    GenerationError::Inapplicable(reason.to_owned())
}

/// A value of a JSON type that `node` does not accept at all.
fn foreign_type_value(node: &SchemaNode) -> Result<Value, GenerationError> {
    [
        Value::Null,
        Value::Bool(true),
        json!([{"invalid": [null, false]}]),
        json!({"invalid": true}),
        Value::String("invalid".to_owned()),
        json!(0.5),
    ]
    .into_iter()
    .find(|value| !node.matches_type(value))
    .ok_or_else(|| GenerationError::Unsatisfiable("every JSON type is accepted".to_owned()))
}

impl ValueGenerator<'_> {
    /// Produce a value that violates `node`, starting from `valid_value` and
    /// the allowed `candidates` a relation declares for the target.
    ///
    /// # Errors
    /// Errors from generating a replacement valid value or a nested
    /// candidate schema.
    pub fn generate_invalid(
        &mut self,
        node: &SchemaNode,
        valid_value: &Value,
        candidates: &[ConstraintValue],
    ) -> Result<InvalidValue, GenerationError> {
        if candidates.iter().any(ConstraintValue::is_ignore) {
            return Ok(InvalidValue::Ignore);
        }
        let mut values = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match candidate {
                ConstraintValue::Value(v) => values.push(v.clone()),
                ConstraintValue::Schema(schema) => values.push(self.generate_valid(schema)?),
                ConstraintValue::Ignore => {}
            }
        }
        if let [Value::Bool(b)] = values.as_slice() {
            return Ok(InvalidValue::Value(Value::Bool(!b)));
        }

        if let SchemaNode::Union(union) = node {
            let arms = union.non_null_schemas();
            let matching: Vec<&SchemaNode> = arms
                .iter()
                .copied()
                .filter(|arm| arm.matches_type(valid_value))
                .collect();
            let pool = if matching.is_empty() { &arms } else { &matching };
            let arm = self
                .random
                .choose(pool)
                .copied()
                .ok_or_else(|| GenerationError::Unsatisfiable("union without schemas".to_owned()))?;
            tracing::debug!("Invalidating through '{}' arm of union", arm.type_name());
            let invalid = self.invalidate_resolved(arm, valid_value, &values)?;
            return match invalid {
                InvalidValue::Value(value) if is_valid(node, &value) => {
                    tracing::debug!("{} is accepted by another arm of the union", value);
                    foreign_type_value(node).map(InvalidValue::Value)
                }
                other => Ok(other),
            };
        }
        self.invalidate_resolved(node, valid_value, &values)
    }

    fn invalidate_resolved(
        &mut self,
        node: &SchemaNode,
        valid_value: &Value,
        candidates: &[Value],
    ) -> Result<InvalidValue, GenerationError> {
        let regenerated;
        let valid_value = if node.matches_type(valid_value) {
            valid_value
        } else {
            regenerated = self.generate_valid(node)?;
            &regenerated
        };

        if !candidates.is_empty() {
            match invalid_from_candidates(candidates) {
                Ok(value) => {
                    tracing::debug!("Invalid value {} folded from relation candidates", value);
                    return Ok(InvalidValue::Value(value));
                }
                Err(e) => tracing::debug!("Candidate folding failed: {}", e),
            }
        }

        match self.invalid_from_const_or_enum(node) {
            Ok(value) => {
                tracing::debug!("Invalid value {} derived from const/enum", value);
                return Ok(InvalidValue::Value(value));
            }
            Err(GenerationError::Inapplicable(_)) => {}
            Err(e) => return Err(e),
        }

        match self.values_out_of_bounds(node, valid_value) {
            Ok(options) => {
                if let Some(value) = self.random.choose(&options) {
                    tracing::debug!("Invalid value {} out of bounds", value);
                    return Ok(InvalidValue::Value(value.clone()));
                }
            }
            Err(GenerationError::Inapplicable(_)) => {}
            Err(e) => return Err(e),
        }

        let value = match node {
            SchemaNode::String(_) => json!([{"invalid": [null, false]}, "null", null, true]),
            _ => Value::String(self.values.opaque_string(self.random)),
        };
        tracing::debug!("Invalid value {} by type change", value);
        Ok(InvalidValue::Value(value))
    }

    /// A value equal to none of the schema's `const`/`enum` values.
    ///
    /// # Errors
    /// `Inapplicable` when the schema has neither, or its type offers no way
    /// to combine them.
    pub fn invalid_from_const_or_enum(
        &mut self,
        node: &SchemaNode,
    ) -> Result<Value, GenerationError> {
        match node {
            SchemaNode::String(s) => invalid_string_choice(s),
            SchemaNode::Integer(s) => invalid_integer_choice(s),
            SchemaNode::Number(s) => invalid_number_choice(s),
            SchemaNode::Boolean(s) => s
                .const_value
                .map(|b| Value::Bool(!b))
                .ok_or_else(|| inapplicable("boolean without const")),
            SchemaNode::Array(s) => self.invalid_array_choice(s),
            SchemaNode::Object(s) => invalid_object_choice(s),
            SchemaNode::Null(_) | SchemaNode::Union(_) => Err(inapplicable("no const or enum")),
        }
    }

    fn invalid_array_choice(&mut self, s: &ArraySchema) -> Result<Value, GenerationError> {
        let allowed: Vec<&Vec<Value>> = match (&s.const_value, &s.enum_values) {
            (Some(value), _) => vec![value],
            (None, Some(values)) => values.iter().collect(),
            (None, None) => return Err(inapplicable("array without const or enum")),
        };
        let mut combined: Vec<Value> = allowed.iter().flat_map(|v| v.iter().cloned()).collect();
        if combined.is_empty() {
            combined.push(self.generate_valid(&s.items)?);
        } else {
            combined.extend_from_within(..);
        }
        Ok(Value::Array(combined))
    }

    /// Values that violate a length, count or range bound of `node`, derived
    /// from `valid_value`.
    ///
    /// # Errors
    /// `Inapplicable` when the schema declares no bound that can be violated.
    pub fn values_out_of_bounds(
        &mut self,
        node: &SchemaNode,
        valid_value: &Value,
    ) -> Result<Vec<Value>, GenerationError> {
        let options = match node {
            SchemaNode::Integer(s) => integer_out_of_bounds(s),
            SchemaNode::Number(s) => number_out_of_bounds(s)?,
            SchemaNode::String(s) => string_out_of_bounds(s, valid_value.as_str().unwrap_or("")),
            SchemaNode::Array(s) => self.array_out_of_bounds(s, valid_value)?,
            SchemaNode::Object(s) => self.object_out_of_bounds(s, valid_value)?,
            SchemaNode::Null(_) | SchemaNode::Boolean(_) | SchemaNode::Union(_) => Vec::new(),
        };
        if options.is_empty() {
            return Err(inapplicable("no bounds to violate"));
        }
        Ok(options)
    }

    fn array_out_of_bounds(
        &mut self,
        s: &ArraySchema,
        valid_value: &Value,
    ) -> Result<Vec<Value>, GenerationError> {
        let items: Vec<Value> = valid_value.as_array().cloned().unwrap_or_default();
        let mut options = Vec::new();
        if let Some(min) = s.min_items
            && min > 0
        {
            options.push(Value::Array(items.iter().take(min - 1).cloned().collect()));
        }
        if let Some(max) = s.max_items {
            let mut seed = items;
            if seed.is_empty() {
                seed.push(self.generate_valid(&s.items)?);
            }
            let extended: Vec<Value> = seed.iter().cycle().take(max + 1).cloned().collect();
            options.push(Value::Array(extended));
        }
        Ok(options)
    }

    fn object_out_of_bounds(
        &mut self,
        s: &ObjectSchema,
        valid_value: &Value,
    ) -> Result<Vec<Value>, GenerationError> {
        let map: Map<String, Value> = valid_value.as_object().cloned().unwrap_or_default();
        let mut options = Vec::new();
        if let Some(min) = s.min_properties
            && min > 0
        {
            let trimmed: Map<String, Value> = map
                .iter()
                .take(min - 1)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            options.push(Value::Object(trimmed));
        }
        if let Some(max) = s.max_properties {
            let mut extended = map;
            let mut index = 0;
            while extended.len() <= max {
                let key = format!("additional_property_{index}");
                index += 1;
                if extended.contains_key(&key) {
                    continue;
                }
                let value = match &s.additional_properties {
                    AdditionalProperties::Schema(schema) => self.generate_valid(schema)?,
                    AdditionalProperties::Allowed | AdditionalProperties::Forbidden => {
                        Value::String(self.values.opaque_string(self.random))
                    }
                };
                extended.insert(key, value);
            }
            options.push(Value::Object(extended));
        }
        Ok(options)
    }
}

// ---------------------------------------------------------------------------
// Candidate folding
// ---------------------------------------------------------------------------

/// Fold the allowed values of a relation into one value equal to none of
/// them.
///
/// # Errors
/// `Inapplicable` for booleans, nulls, mixed types and empty results;
/// `Unsupported` for arrays of arrays.
pub fn invalid_from_candidates(values: &[Value]) -> Result<Value, GenerationError> {
    let first = values.first().ok_or_else(|| inapplicable("no candidates"))?;
    match first {
        Value::Number(_) => {
            let numbers: Option<Vec<&serde_json::Number>> = values
                .iter()
                .map(|v| match v {
                    Value::Number(n) => Some(n),
                    _ => None,
                })
                .collect();
            let numbers = numbers.ok_or_else(|| inapplicable("mixed candidate types"))?;
            fold_numbers(&numbers)
        }
        Value::String(_) => {
            let strings: Option<Vec<&str>> = values.iter().map(Value::as_str).collect();
            let strings = strings.ok_or_else(|| inapplicable("mixed candidate types"))?;
            let joined = strings.concat().repeat(2);
            if joined.is_empty() {
                return Err(inapplicable("only empty string candidates"));
            }
            Ok(Value::String(joined))
        }
        Value::Array(_) => {
            let arrays: Option<Vec<&Vec<Value>>> = values.iter().map(Value::as_array).collect();
            let arrays = arrays.ok_or_else(|| inapplicable("mixed candidate types"))?;
            let longest = arrays.iter().copied().map(Vec::len).max().unwrap_or(0);
            let mut folded = Vec::with_capacity(longest);
            for index in 0..longest {
                let column: Vec<Value> =
                    arrays.iter().filter_map(|a| a.get(index).cloned()).collect();
                if column.iter().any(Value::is_array) {
                    return Err(GenerationError::Unsupported(
                        "constraint folding of arrays of arrays".to_owned(),
                    ));
                }
                folded.push(invalid_from_candidates(&column)?);
            }
            if folded.is_empty() {
                return Err(inapplicable("only empty array candidates"));
            }
            Ok(Value::Array(folded))
        }
        Value::Object(_) => {
            let maps: Option<Vec<&Map<String, Value>>> =
                values.iter().map(Value::as_object).collect();
            let maps = maps.ok_or_else(|| inapplicable("mixed candidate types"))?;
            let folded = fold_objects(&maps)?;
            if folded.is_empty() {
                return Err(inapplicable("only empty object candidates"));
            }
            Ok(Value::Object(folded))
        }
        Value::Bool(_) | Value::Null => Err(inapplicable("no folding for booleans or null")),
    }
}

/// Twice the sum of absolute values, or 1 when that is zero.
fn fold_numbers(numbers: &[&serde_json::Number]) -> Result<Value, GenerationError> {
    if numbers.iter().all(|n| n.is_i64()) {
        let sum = numbers
            .iter()
            .filter_map(|n| n.as_i64())
            .try_fold(0i64, |acc, n| acc.checked_add(n.checked_abs()?))
            .and_then(|sum| sum.checked_mul(2))
            .ok_or_else(|| inapplicable("integer candidates too large to fold"))?;
        return Ok(Value::from(if sum == 0 { 1 } else { sum }));
    }
    let sum = numbers
        .iter()
        .filter_map(|n| n.as_f64())
        .map(f64::abs)
        .sum::<f64>()
        * 2.0;
    finite_number(if sum.abs() < f64::EPSILON { 1.0 } else { sum })
}

fn finite_number(value: f64) -> Result<Value, GenerationError> {
    if !value.is_finite() {
        return Err(inapplicable("number candidates too large to fold"));
    }
    number_value(value)
}

fn fold_objects(maps: &[&Map<String, Value>]) -> Result<Map<String, Value>, GenerationError> {
    let mut keys: Vec<&String> = Vec::new();
    for map in maps {
        for key in map.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    let mut folded = Map::new();
    for key in keys {
        let column: Vec<Value> = maps.iter().filter_map(|m| m.get(key).cloned()).collect();
        let value = match invalid_from_candidates(&column) {
            Ok(value) => value,
            Err(GenerationError::Inapplicable(_)) => scalar_fallback(&column),
            Err(e) => return Err(e),
        };
        folded.insert(key.clone(), value);
    }
    Ok(folded)
}

fn scalar_fallback(column: &[Value]) -> Value {
    match column {
        [Value::Bool(b), ..] if column.iter().all(|v| v == &Value::Bool(*b)) => Value::Bool(!b),
        _ => Value::String("invalid".to_owned()),
    }
}

// ---------------------------------------------------------------------------
// const / enum
// ---------------------------------------------------------------------------

fn invalid_string_choice(s: &StringSchema) -> Result<Value, GenerationError> {
    let allowed: Vec<&String> = match (&s.const_value, &s.enum_values) {
        (Some(value), _) => vec![value],
        (None, Some(values)) => values.iter().collect(),
        (None, None) => return Err(inapplicable("string without const or enum")),
    };
    let mut combined: String = allowed
        .iter()
        .copied()
        .map(String::as_str)
        .collect::<String>()
        .repeat(2);
    while combined.is_empty() || allowed.contains(&&combined) {
        combined.push('x');
    }
    Ok(Value::String(combined))
}

fn invalid_integer_choice(s: &IntegerSchema) -> Result<Value, GenerationError> {
    let allowed: Vec<i64> = match (s.const_value, &s.enum_values) {
        (Some(value), _) => vec![value],
        (None, Some(values)) => values.clone(),
        (None, None) => return Err(inapplicable("integer without const or enum")),
    };
    let sum = allowed
        .iter()
        .fold(0i64, |acc, v| acc.saturating_add(v.saturating_abs()))
        .saturating_mul(2);
    let mut candidate = if sum == 0 { 1 } else { sum };
    while allowed.contains(&candidate) {
        candidate = candidate.wrapping_sub(1);
    }
    Ok(Value::from(candidate))
}

fn invalid_number_choice(s: &NumberSchema) -> Result<Value, GenerationError> {
    let allowed: Vec<f64> = match (s.const_value, &s.enum_values) {
        (Some(value), _) => vec![value],
        (None, Some(values)) => values.clone(),
        (None, None) => return Err(inapplicable("number without const or enum")),
    };
    let sum = allowed.iter().map(|v| v.abs()).sum::<f64>() * 2.0;
    finite_number(if sum.abs() < f64::EPSILON { 1.0 } else { sum })
}

fn invalid_object_choice(s: &ObjectSchema) -> Result<Value, GenerationError> {
    let allowed: Vec<&Map<String, Value>> = match (&s.const_value, &s.enum_values) {
        (Some(value), _) => vec![value],
        (None, Some(values)) => values.iter().collect(),
        (None, None) => return Err(inapplicable("object without const or enum")),
    };
    let mut folded = fold_objects(&allowed)?;
    if folded.is_empty() {
        folded.insert("invalid".to_owned(), Value::Bool(true));
    }
    Ok(Value::Object(folded))
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// The value just past a bound: an exclusive limit itself, or one `step`
/// beyond an inclusive one.
fn past_bound<T: Copy>(
    inclusive: Option<T>,
    exclusive: Option<ExclusiveBound<T>>,
    step: impl Fn(T) -> Option<T>,
) -> Option<T> {
    match exclusive {
        Some(ExclusiveBound::Threshold(limit)) => Some(limit),
        Some(ExclusiveBound::Flag(true)) => inclusive,
        _ => inclusive.and_then(step),
    }
}

fn integer_out_of_bounds(s: &IntegerSchema) -> Vec<Value> {
    let below = past_bound(s.minimum, s.exclusive_minimum, |m| m.checked_sub(1));
    let above = past_bound(s.maximum, s.exclusive_maximum, |m| m.checked_add(1));
    below.into_iter().chain(above).map(Value::from).collect()
}

fn number_out_of_bounds(s: &NumberSchema) -> Result<Vec<Value>, GenerationError> {
    let below = past_bound(s.minimum, s.exclusive_minimum, |m| Some(nudge_down(m)));
    let above = past_bound(s.maximum, s.exclusive_maximum, |m| Some(nudge_up(m)));
    below
        .into_iter()
        .chain(above)
        .filter(|v| v.is_finite())
        .map(number_value)
        .collect()
}

fn string_out_of_bounds(s: &StringSchema, valid: &str) -> Vec<Value> {
    let mut options = Vec::new();
    if let Some(min) = s.min_length
        && min > 0
    {
        options.push(Value::String(valid.chars().take(min - 1).collect()));
    }
    if let Some(max) = s.max_length {
        let seed = if valid.is_empty() { "x" } else { valid };
        options.push(Value::String(seed.chars().cycle().take(max + 1).collect()));
    }
    options
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_numbers() {
        assert_eq!(invalid_from_candidates(&[json!(1), json!(-2)]).unwrap(), json!(6));
        assert_eq!(invalid_from_candidates(&[json!(0)]).unwrap(), json!(1));
        assert_eq!(invalid_from_candidates(&[json!(0.5)]).unwrap(), json!(1.0));
    }

    #[test]
    fn test_fold_numbers_overflow_is_inapplicable() {
        assert!(matches!(
            invalid_from_candidates(&[json!(i64::MAX)]),
            Err(GenerationError::Inapplicable(_))
        ));
        assert!(matches!(
            invalid_from_candidates(&[json!(i64::MIN), json!(1)]),
            Err(GenerationError::Inapplicable(_))
        ));
        assert!(matches!(
            invalid_from_candidates(&[json!(f64::MAX), json!(0.5)]),
            Err(GenerationError::Inapplicable(_))
        ));
    }

    #[test]
    fn test_invalid_number_choice_overflow_falls_through() {
        let s = NumberSchema {
            enum_values: Some(vec![f64::MAX, 1.5]),
            ..NumberSchema::default()
        };
        assert!(matches!(
            invalid_number_choice(&s),
            Err(GenerationError::Inapplicable(_))
        ));
    }

    #[test]
    fn test_fold_strings() {
        assert_eq!(
            invalid_from_candidates(&[json!("a"), json!("b")]).unwrap(),
            json!("abab")
        );
        assert!(matches!(
            invalid_from_candidates(&[json!("")]),
            Err(GenerationError::Inapplicable(_))
        ));
    }

    #[test]
    fn test_fold_booleans_fails() {
        assert!(matches!(
            invalid_from_candidates(&[json!(true), json!(false)]),
            Err(GenerationError::Inapplicable(_))
        ));
    }

    #[test]
    fn test_fold_arrays_per_index() {
        let folded = invalid_from_candidates(&[json!([1, "a"]), json!([2])]).unwrap();
        assert_eq!(folded, json!([6, "aa"]));
    }

    #[test]
    fn test_fold_arrays_of_arrays_unsupported() {
        assert!(matches!(
            invalid_from_candidates(&[json!([[1]])]),
            Err(GenerationError::Unsupported(_))
        ));
    }

    #[test]
    fn test_fold_objects_per_key() {
        let folded =
            invalid_from_candidates(&[json!({"a": 1, "b": "x"}), json!({"a": 2})]).unwrap();
        assert_eq!(folded, json!({"a": 6, "b": "xx"}));
    }

    #[test]
    fn test_fold_mixed_types_fails() {
        assert!(invalid_from_candidates(&[json!(1), json!("a")]).is_err());
    }

    #[test]
    fn test_integer_out_of_bounds_exclusive_forms() {
        let flag = IntegerSchema {
            minimum: Some(3),
            exclusive_minimum: Some(ExclusiveBound::Flag(true)),
            ..IntegerSchema::default()
        };
        assert_eq!(integer_out_of_bounds(&flag), vec![json!(3)]);
        let threshold = IntegerSchema {
            exclusive_maximum: Some(ExclusiveBound::Threshold(9)),
            ..IntegerSchema::default()
        };
        assert_eq!(integer_out_of_bounds(&threshold), vec![json!(9)]);
    }

    #[test]
    fn test_integer_out_of_bounds_saturates() {
        let s = IntegerSchema {
            minimum: Some(i64::MIN),
            maximum: Some(i64::MAX),
            ..IntegerSchema::default()
        };
        assert!(integer_out_of_bounds(&s).is_empty());
    }

    #[test]
    fn test_string_out_of_bounds_reuses_characters() {
        let s = StringSchema {
            min_length: Some(3),
            max_length: Some(5),
            ..StringSchema::default()
        };
        assert_eq!(
            string_out_of_bounds(&s, "TTTT"),
            vec![json!("TT"), json!("TTTTTT")]
        );
        let only_max = StringSchema {
            max_length: Some(2),
            ..StringSchema::default()
        };
        assert_eq!(string_out_of_bounds(&only_max, ""), vec![json!("xxx")]);
    }

    #[test]
    fn test_invalid_string_choice_avoids_collisions() {
        let s = StringSchema {
            enum_values: Some(vec![String::new(), "x".to_owned()]),
            ..StringSchema::default()
        };
        assert_eq!(invalid_string_choice(&s).unwrap(), json!("xx"));
        let empty = StringSchema {
            const_value: Some(String::new()),
            ..StringSchema::default()
        };
        assert_eq!(invalid_string_choice(&empty).unwrap(), json!("x"));
    }

    #[test]
    fn test_invalid_integer_choice() {
        let s = IntegerSchema {
            enum_values: Some(vec![1, 2, 3]),
            ..IntegerSchema::default()
        };
        assert_eq!(invalid_integer_choice(&s).unwrap(), json!(12));
        let zero = IntegerSchema {
            const_value: Some(0),
            ..IntegerSchema::default()
        };
        assert_eq!(invalid_integer_choice(&zero).unwrap(), json!(1));
    }

    #[test]
    fn test_invalid_object_choice() {
        let s = ObjectSchema {
            const_value: Some(json!({"on": true, "n": 2}).as_object().unwrap().clone()),
            ..ObjectSchema::default()
        };
        assert_eq!(
            invalid_object_choice(&s).unwrap(),
            json!({"on": false, "n": 4})
        );
        let empty = ObjectSchema {
            const_value: Some(Map::new()),
            ..ObjectSchema::default()
        };
        assert_eq!(invalid_object_choice(&empty).unwrap(), json!({"invalid": true}));
    }
}
