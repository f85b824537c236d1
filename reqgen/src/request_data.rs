//! The data of one request, and queries over it used when deriving
//! variants (required-only, minimal, one parameter invalidated).

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::operation::{Parameter, ParameterLocation};
use crate::random::Randomness;
use crate::relations::{ConstraintMapping, Relation, RelationScope};
use crate::schema::{ObjectSchema, SchemaNode};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestData {
    #[serde(skip)]
    pub parameters: Vec<Parameter>,
    pub query: Map<String, Value>,
    /// Header values are always strings.
    pub headers: Map<String, Value>,
    pub body: Option<Value>,
    #[serde(skip)]
    pub body_schema: Option<SchemaNode>,
    pub has_body: bool,
    #[serde(skip)]
    pub constraint_mapping: Option<Arc<ConstraintMapping>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl RequestData {
    /// The object schema the body was generated from: for unions, the first
    /// object arm declaring every key of the body.
    #[must_use]
    pub fn body_object_schema(&self) -> Option<&ObjectSchema> {
        let schema = self.body_schema.as_ref()?;
        let objects: Vec<&ObjectSchema> = schema
            .resolved_schemas()
            .iter()
            .filter_map(|s| match s {
                SchemaNode::Object(o) => Some(o),
                _ => None,
            })
            .collect();
        let keys: Vec<&String> = self
            .body
            .as_ref()
            .and_then(Value::as_object)
            .map(|body| body.keys().collect())
            .unwrap_or_default();
        objects
            .iter()
            .find(|o| keys.iter().all(|k| o.has_property(k)))
            .or_else(|| objects.first())
            .copied()
    }

    fn mandatory(&self, scope: RelationScope) -> Vec<&str> {
        self.constraint_mapping
            .as_deref()
            .map_or_else(Vec::new, |m| m.mandatory_properties(scope))
    }

    /// Required body properties, including ones a relation marks mandatory;
    /// read-only properties are never required in a request.
    #[must_use]
    pub fn required_properties(&self) -> Vec<String> {
        let Some(schema) = self.body_object_schema() else {
            return Vec::new();
        };
        let mut names: Vec<String> = schema
            .required
            .iter()
            .filter(|name| schema.property(name).is_none_or(|p| !p.is_read_only()))
            .cloned()
            .collect();
        for name in self.mandatory(RelationScope::Body) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_owned());
            }
        }
        names
    }

    #[must_use]
    pub fn has_optional_properties(&self) -> bool {
        let required = self.required_properties();
        self.body
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|body| body.keys().any(|k| !required.contains(k)))
    }

    fn is_required_parameter(&self, parameter: &Parameter) -> bool {
        parameter.required
            || self
                .mandatory(RelationScope::Parameter)
                .contains(&parameter.name.as_str())
    }

    fn has_optional_in(&self, location: ParameterLocation) -> bool {
        self.parameters
            .iter()
            .any(|p| p.location == location && !self.is_required_parameter(p))
    }

    #[must_use]
    pub fn has_optional_params(&self) -> bool {
        self.has_optional_in(ParameterLocation::Query)
    }

    #[must_use]
    pub fn has_optional_headers(&self) -> bool {
        self.has_optional_in(ParameterLocation::Header)
    }

    fn required_in(
        &self,
        location: ParameterLocation,
        values: &Map<String, Value>,
    ) -> Map<String, Value> {
        values
            .iter()
            .filter(|(name, _)| {
                self.parameters.iter().any(|p| {
                    p.location == location && &p.name == *name && self.is_required_parameter(p)
                })
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn required_query(&self) -> Map<String, Value> {
        self.required_in(ParameterLocation::Query, &self.query)
    }

    #[must_use]
    pub fn required_headers(&self) -> Map<String, Value> {
        self.required_in(ParameterLocation::Header, &self.headers)
    }

    /// The body reduced to its required properties, topped up with randomly
    /// chosen optional ones when the schema sets `minProperties`.
    pub fn minimal_body(&self, random: &mut Randomness) -> Option<Value> {
        let body = self.body.as_ref()?;
        let Some(map) = body.as_object() else {
            return Some(body.clone());
        };
        let required = self.required_properties();
        let mut minimal: Map<String, Value> = map
            .iter()
            .filter(|(k, _)| required.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let min = self
            .body_object_schema()
            .and_then(|s| s.min_properties)
            .unwrap_or(0);
        if minimal.len() < min {
            let optional: Vec<&String> = map.keys().filter(|k| !required.contains(k)).collect();
            for key in random.sample(&optional, min - minimal.len()) {
                minimal.insert(key.clone(), map[key.as_str()].clone());
            }
            // keep the body's key order
            minimal = map
                .iter()
                .filter(|(k, _)| minimal.contains_key(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        Some(Value::Object(minimal))
    }

    fn invalidatable_in(&self, location: ParameterLocation) -> Vec<String> {
        let related: Vec<&str> = self
            .constraint_mapping
            .as_deref()
            .map(|m| {
                m.parameter_relations
                    .iter()
                    .filter_map(Relation::property)
                    .collect()
            })
            .unwrap_or_default();
        self.parameters
            .iter()
            .filter(|p| p.location == location)
            .filter(|p| p.schema.can_be_invalidated() || related.contains(&p.name.as_str()))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Query parameters whose schema or relations allow an invalid value.
    #[must_use]
    pub fn params_that_can_be_invalidated(&self) -> Vec<String> {
        self.invalidatable_in(ParameterLocation::Query)
    }

    /// Headers whose schema or relations allow an invalid value.
    #[must_use]
    pub fn headers_that_can_be_invalidated(&self) -> Vec<String> {
        self.invalidatable_in(ParameterLocation::Header)
    }
}

/// Render a generated parameter value as a header string.
#[must_use]
pub fn header_string(value: &Value) -> Value {
    Value::String(value.as_str().map_or_else(|| value.to_string(), ToOwned::to_owned))
}
