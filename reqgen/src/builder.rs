//! Assembly of complete requests, and of their invalid variants targeting a
//! given status code.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::generator::{GenerationError, ValueGenerator};
use crate::invalidator::InvalidValue;
use crate::mapping_config::MappingTable;
use crate::operation::{Operation, OperationIndex, Parameter, ParameterLocation};
use crate::providers::{
    IdProvider, ProviderError, ResourceCreator, UnavailableCreator, UnavailableIdProvider,
};
use crate::random::Randomness;
use crate::relations::{ConstraintMapping, ConstraintValue, PathOverride, Relation, RelationScope};
use crate::request_data::{RequestData, header_string};
use crate::schema::{SchemaError, SchemaNode, json_type_name};
use crate::settings::{DependencyPolicy, GeneratorSettings};
use crate::value_source::{FakeValueSource, RawValueSource};

const INVALID_ID_LENGTH: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOverrides {
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidParameters {
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
}

struct Capabilities {
    random: Randomness,
    values: Box<dyn RawValueSource>,
    ids: Box<dyn IdProvider>,
    creator: Box<dyn ResourceCreator>,
}

impl Capabilities {
    fn generator<'a>(
        &'a mut self,
        operation_id: Option<&'a str>,
        policy: DependencyPolicy,
    ) -> ValueGenerator<'a> {
        ValueGenerator::new(&mut self.random, self.values.as_ref(), self.ids.as_ref())
            .for_operation(operation_id)
            .with_dependency_policy(policy)
    }
}

pub struct RequestDataBuilder {
    operations: OperationIndex,
    settings: GeneratorSettings,
    capabilities: Capabilities,
}

impl RequestDataBuilder {
    #[must_use]
    pub fn new(operations: OperationIndex, settings: GeneratorSettings) -> Self {
        Self {
            operations,
            settings,
            capabilities: Capabilities {
                random: Randomness::from_entropy(),
                values: Box::new(FakeValueSource),
                ids: Box::new(UnavailableIdProvider),
                creator: Box::new(UnavailableCreator),
            },
        }
    }

    /// # Errors
    /// `SchemaError` when an operation's schemas cannot be loaded.
    pub fn from_document(
        document: &Value,
        mappings: &MappingTable,
        settings: GeneratorSettings,
    ) -> Result<Self, SchemaError> {
        let operations = OperationIndex::from_document(document, mappings, &settings)?;
        Ok(Self::new(operations, settings))
    }

    #[must_use]
    pub fn with_random(mut self, random: Randomness) -> Self {
        self.capabilities.random = random;
        self
    }

    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_random(Randomness::seeded(seed))
    }

    #[must_use]
    pub fn with_value_source(mut self, values: impl RawValueSource + 'static) -> Self {
        self.capabilities.values = Box::new(values);
        self
    }

    #[must_use]
    pub fn with_id_provider(mut self, ids: impl IdProvider + 'static) -> Self {
        self.capabilities.ids = Box::new(ids);
        self
    }

    #[must_use]
    pub fn with_creator(mut self, creator: impl ResourceCreator + 'static) -> Self {
        self.capabilities.creator = Box::new(creator);
        self
    }

    #[must_use]
    pub fn operations(&self) -> &OperationIndex {
        &self.operations
    }

    #[must_use]
    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn random(&mut self) -> &mut Randomness {
        &mut self.capabilities.random
    }

    /// # Errors
    /// See [`ValueGenerator::generate_valid`].
    pub fn generate_valid(&mut self, node: &SchemaNode) -> Result<Value, GenerationError> {
        self.capabilities
            .generator(None, self.settings.dependency_policy)
            .generate_valid(node)
    }

    /// # Errors
    /// See [`ValueGenerator::generate_invalid`].
    pub fn generate_invalid(
        &mut self,
        node: &SchemaNode,
        valid_value: &Value,
        candidates: &[ConstraintValue],
    ) -> Result<InvalidValue, GenerationError> {
        self.capabilities
            .generator(None, self.settings.dependency_policy)
            .generate_invalid(node, valid_value, candidates)
    }

    // ---------------------------------------------------------------------
    // Valid request data
    // ---------------------------------------------------------------------

    /// # Errors
    /// Errors from value generation or id resolution.
    pub fn build(
        &mut self,
        path: &str,
        method: &str,
        overrides: &RequestOverrides,
    ) -> Result<RequestData, GenerationError> {
        let Some(operation) = self.operations.get(path, method) else {
            tracing::info!("No operation {} {}, returning empty request data", method, path);
            return Ok(RequestData::default());
        };
        let mut generator = self
            .capabilities
            .generator(operation.operation_id.as_deref(), self.settings.dependency_policy);
        let mut data = build_valid(&mut generator, operation)?;
        apply_overrides(&mut data, overrides);
        tracing::debug!(
            "Built request data for {} {}: {} query, {} headers, body: {}",
            operation.method,
            operation.path,
            data.query.len(),
            data.headers.len(),
            data.body.is_some()
        );
        Ok(data)
    }

    // ---------------------------------------------------------------------
    // Invalid bodies
    // ---------------------------------------------------------------------

    /// # Errors
    /// `Exhausted` when no strategy can target `status`, `Unsupported` for
    /// non-object bodies, and provider failures from side-effecting
    /// strategies.
    pub fn build_invalid_body(
        &mut self,
        url: &str,
        method: &str,
        status: u16,
        data: &RequestData,
    ) -> Result<Value, GenerationError> {
        let relations: Vec<Relation> = data
            .constraint_mapping
            .as_deref()
            .map(|m| {
                m.relations_for_error_code(status, RelationScope::Body)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let Some(relation) = self.capabilities.random.choose(&relations).cloned() else {
            tracing::debug!("No body relation for status {}, invalidating by schema", status);
            return self.invalidate_body(status, data);
        };
        tracing::debug!(
            "Using {} relation on '{}' for status {}",
            relation.kind(),
            relation.property().unwrap_or("-"),
            status
        );
        match relation {
            Relation::UniquenessConstraint(r) => {
                let mut body = object_body(data)?;
                body.insert(r.property.clone(), r.value.clone());
                self.create_conflict(url, method, status, Value::Object(body), data)
            }
            Relation::IdReference(r) => {
                self.put_in_use(url, &r.property, &r.consumer_post_path)?;
                Ok(data.body.clone().unwrap_or_default())
            }
            _ => self.invalidate_body(status, data),
        }
    }

    fn create_conflict(
        &mut self,
        url: &str,
        method: &str,
        status: u16,
        body: Value,
        data: &RequestData,
    ) -> Result<Value, GenerationError> {
        let method = method.to_lowercase();
        let (target, payload) = if method == "put" || method == "patch" {
            let collection = url
                .trim_end_matches('/')
                .rsplit_once('/')
                .map_or(url, |(prefix, _)| prefix);
            let mut payload = self.post_body_for(collection)?;
            if let Some(values) = body.as_object() {
                for (key, value) in values {
                    payload.insert(key.clone(), value.clone());
                }
            }
            (collection.to_owned(), Value::Object(payload))
        } else {
            (url.to_owned(), body.clone())
        };

        let created = self
            .capabilities
            .creator
            .create(&target, &payload, &data.query, &data.headers)?;
        if !created.ok && created.status_code != status {
            return Err(ProviderError::CreateFailed {
                path: target,
                status_code: created.status_code,
                body: created.body,
            }
            .into());
        }
        tracing::debug!("Created conflicting resource at {} ({})", target, created.status_code);
        Ok(body)
    }

    fn put_in_use(
        &mut self,
        url: &str,
        property: &str,
        consumer_path: &str,
    ) -> Result<(), GenerationError> {
        let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        let id = segment
            .parse::<i64>()
            .map_or_else(|_| Value::String(segment.to_owned()), Value::from);

        let mut overrides = RequestOverrides::default();
        overrides.body.insert(property.to_owned(), id.clone());
        let consumer = self.build(consumer_path, "post", &overrides)?;
        let body = consumer.body.unwrap_or_else(|| {
            let mut body = Map::new();
            body.insert(property.to_owned(), id);
            Value::Object(body)
        });

        let created = self
            .capabilities
            .creator
            .create(consumer_path, &body, &consumer.query, &consumer.headers)?;
        if !created.ok {
            return Err(ProviderError::CreateFailed {
                path: consumer_path.to_owned(),
                status_code: created.status_code,
                body: created.body,
            }
            .into());
        }
        tracing::debug!("Resource {} is now referenced from {}", url, consumer_path);
        Ok(())
    }

    fn post_body_for(&mut self, url: &str) -> Result<Map<String, Value>, GenerationError> {
        let path = url_path(url);
        let Some(template) = self.operations.match_path(path).map(ToOwned::to_owned) else {
            tracing::debug!("No operation matches {}, posting the request body as-is", path);
            return Ok(Map::new());
        };
        let data = self.build(&template, "post", &RequestOverrides::default())?;
        Ok(match data.body {
            Some(Value::Object(body)) => body,
            _ => Map::new(),
        })
    }

    fn invalidate_body(
        &mut self,
        status: u16,
        data: &RequestData,
    ) -> Result<Value, GenerationError> {
        let mut body = object_body(data)?;
        let schema = data.body_object_schema().ok_or_else(|| {
            GenerationError::Exhausted("operation has no object body schema".to_owned())
        })?;
        let mapping = data.constraint_mapping.clone().unwrap_or_default();
        let relations = mapping.relations_for_error_code(status, RelationScope::Body);

        let mut names: Vec<&str> = Vec::new();
        for name in relations.iter().copied().filter_map(Relation::property) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if status == self.settings.invalid_property_default_code {
            for (name, property) in &schema.properties {
                if !property.is_read_only() && !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        self.capabilities.random.shuffle(&mut names);
        let Some(&name) = names.first() else {
            return Err(GenerationError::Exhausted(format!(
                "no property can be invalidated for status {status}"
            )));
        };

        let mut generator = self
            .capabilities
            .generator(data.operation_id.as_deref(), self.settings.dependency_policy);
        let invalid = if relations
            .iter()
            .any(|r| matches!(r, Relation::IdDependency(d) if d.property == name))
        {
            InvalidValue::Value(Value::String(generator.random.hex_string(INVALID_ID_LENGTH)))
        } else if let Some(declared) =
            declared_invalid(&mapping, name, RelationScope::Body, status)
        {
            resolve_declared(&mut generator, declared)?
        } else {
            let Some(property) = schema.property(name) else {
                return Err(GenerationError::Exhausted(format!(
                    "property '{name}' is not declared by the body schema"
                )));
            };
            let current = if let Some(value) = body.get(name) {
                value.clone()
            } else {
                generator.generate_valid(property)?
            };
            let candidates = mapping
                .constrained_values(name, RelationScope::Body)
                .unwrap_or_default();
            generator.generate_invalid(property, &current, candidates)?
        };

        match invalid {
            InvalidValue::Value(value) => {
                tracing::debug!("Invalidated '{}' with {}", name, value);
                body.insert(name.to_owned(), value);
            }
            InvalidValue::Ignore => {
                tracing::debug!("Invalidated '{}' by leaving it out", name);
                body.shift_remove(name);
            }
        }
        Ok(Value::Object(body))
    }

    // ---------------------------------------------------------------------
    // Invalid parameters
    // ---------------------------------------------------------------------

    /// # Errors
    /// `Exhausted` when no parameter can be invalidated for `status`, and
    /// errors from value generation.
    pub fn build_invalidated_parameters(
        &mut self,
        status: u16,
        data: &RequestData,
    ) -> Result<InvalidParameters, GenerationError> {
        let mapping = data.constraint_mapping.clone().unwrap_or_default();
        let relations = mapping.relations_for_error_code(status, RelationScope::Parameter);
        let names = self.invalidatable_parameters(status, data, &mapping)?;

        let Some(name) = self.capabilities.random.choose(&names).cloned() else {
            return Err(GenerationError::Exhausted(format!(
                "no parameter can be invalidated for status {status}"
            )));
        };
        let Some(parameter) = data.parameters.iter().find(|p| p.name == name) else {
            return Err(GenerationError::Exhausted(format!("unknown parameter '{name}'")));
        };

        let mut result = InvalidParameters {
            query: data.query.clone(),
            headers: data.headers.clone(),
        };
        let is_header = parameter.location == ParameterLocation::Header;
        let target = if is_header {
            &mut result.headers
        } else {
            &mut result.query
        };

        let mut generator = self
            .capabilities
            .generator(data.operation_id.as_deref(), self.settings.dependency_policy);
        let current = if let Some(value) = target.get(&name) {
            value.clone()
        } else if let Some(value) =
            parameter_value(&mut generator, parameter, Some(mapping.as_ref()))?
        {
            value
        } else {
            generator.generate_valid(&parameter.schema)?
        };

        let invalid = if let Some(declared) =
            declared_invalid(&mapping, &name, RelationScope::Parameter, status)
        {
            resolve_declared(&mut generator, declared)?
        } else if relations
            .iter()
            .any(|r| matches!(r, Relation::IdDependency(d) if d.property == name))
        {
            InvalidValue::Value(Value::String(generator.random.hex_string(INVALID_ID_LENGTH)))
        } else {
            let candidates = mapping
                .constrained_values(&name, RelationScope::Parameter)
                .unwrap_or_default();
            generator.generate_invalid(&parameter.schema, &current, candidates)?
        };

        match invalid {
            InvalidValue::Value(value) => {
                tracing::debug!("Invalidated parameter '{}' with {}", name, value);
                let value = if is_header { header_string(&value) } else { value };
                target.insert(name, value);
            }
            InvalidValue::Ignore => {
                tracing::debug!("Invalidated parameter '{}' by leaving it out", name);
                target.shift_remove(&name);
            }
        }
        Ok(result)
    }

    fn invalidatable_parameters(
        &self,
        status: u16,
        data: &RequestData,
        mapping: &ConstraintMapping,
    ) -> Result<Vec<String>, GenerationError> {
        let relation_names: Vec<&str> = mapping
            .relations_for_error_code(status, RelationScope::Parameter)
            .into_iter()
            .filter_map(Relation::property)
            .collect();
        let is_default = status == self.settings.invalid_property_default_code;
        if relation_names.is_empty() && !is_default {
            return Err(GenerationError::Exhausted(format!(
                "no parameter relation for status {status}"
            )));
        }

        let mut names: Vec<String> = Vec::new();
        if is_default {
            names.extend(data.params_that_can_be_invalidated());
            names.extend(data.headers_that_can_be_invalidated());
        }
        for name in relation_names {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_owned());
            }
        }
        names.retain(|name| {
            let known = data.parameters.iter().any(|p| {
                &p.name == name
                    && matches!(p.location, ParameterLocation::Query | ParameterLocation::Header)
            });
            if !known {
                tracing::warn!(
                    "Relation names '{}', which is not a query or header parameter",
                    name
                );
                return false;
            }
            let ignored = mapping
                .value_constraints(name, RelationScope::Parameter)
                .any(|vc| vc.forces_ignore() && vc.invalid_value_for(status).is_none());
            !ignored
        });
        Ok(names)
    }

    // ---------------------------------------------------------------------
    // Urls
    // ---------------------------------------------------------------------

    fn path_overrides(&self, path: &str) -> Vec<PathOverride> {
        self.operations
            .operations()
            .iter()
            .filter(|op| op.path == path)
            .filter_map(|op| op.constraint_mapping.as_deref())
            .flat_map(|m| &m.relations)
            .filter_map(|r| match r {
                Relation::PathOverride(o) => Some(o.clone()),
                _ => None,
            })
            .collect()
    }

    /// # Errors
    /// Provider errors when an id cannot be obtained for a path parameter.
    pub fn valid_url(&mut self, path: &str) -> Result<String, GenerationError> {
        let template = if let Some(o) = self.path_overrides(path).first() {
            tracing::debug!("Using path override {} for {}", o.path, path);
            o.path.clone()
        } else {
            path.to_owned()
        };

        let mut segments: Vec<String> = Vec::new();
        for (index, segment) in template.split('/').enumerate() {
            if is_template_segment(segment) {
                let prefix = template.split('/').take(index + 1).collect::<Vec<_>>().join("/");
                let id = self.capabilities.ids.valid_id(&prefix, None)?;
                segments.push(id_segment(&id));
            } else {
                segments.push(segment.to_owned());
            }
        }
        Ok(segments.join("/"))
    }

    /// # Errors
    /// `Exhausted` when `path` has no path parameter and no override targets
    /// `status`.
    pub fn invalidated_url(
        &mut self,
        valid_url: &str,
        path: &str,
        status: u16,
    ) -> Result<String, GenerationError> {
        if let Some(invalid) = self
            .path_overrides(path)
            .into_iter()
            .find(|o| o.invalid_path.is_some() && o.invalid_path_error_code == Some(status))
            .and_then(|o| o.invalid_path)
        {
            tracing::debug!("Using invalid path override {} for status {}", invalid, status);
            return Ok(invalid);
        }

        let template: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        let Some(index) = template.iter().rposition(|s| is_template_segment(s)) else {
            return Err(GenerationError::Exhausted(format!(
                "path {path} has no parameter to invalidate"
            )));
        };
        let mut segments: Vec<String> = valid_url
            .trim_end_matches('/')
            .split('/')
            .map(ToOwned::to_owned)
            .collect();
        let Some(offset) = segments.len().checked_sub(template.len()) else {
            return Err(GenerationError::Exhausted(format!(
                "url {valid_url} does not resolve {path}"
            )));
        };
        segments[offset + index] = self.capabilities.random.hex_string(INVALID_ID_LENGTH);
        Ok(segments.join("/"))
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn build_valid(
    generator: &mut ValueGenerator<'_>,
    operation: &Operation,
) -> Result<RequestData, GenerationError> {
    let mapping = operation.constraint_mapping.as_deref();
    let mut query = Map::new();
    let mut headers = Map::new();

    for parameter in &operation.parameters {
        let (target, is_header) = match parameter.location {
            ParameterLocation::Query => (&mut query, false),
            ParameterLocation::Header => (&mut headers, true),
            ParameterLocation::Path | ParameterLocation::Cookie => continue,
        };
        let Some(value) = parameter_value(generator, parameter, mapping)? else {
            tracing::debug!("Leaving out parameter '{}' as constrained", parameter.name);
            continue;
        };
        let value = if is_header { header_string(&value) } else { value };
        target.insert(parameter.name.clone(), value);
    }

    let body = operation
        .body_schema
        .as_ref()
        .map(|schema| generator.generate_valid(schema))
        .transpose()?;

    Ok(RequestData {
        parameters: operation.parameters.clone(),
        query,
        headers,
        body,
        body_schema: operation.body_schema.clone(),
        has_body: operation.has_body,
        constraint_mapping: operation.constraint_mapping.clone(),
        operation_id: operation.operation_id.clone(),
    })
}

fn parameter_value(
    generator: &mut ValueGenerator<'_>,
    parameter: &Parameter,
    mapping: Option<&ConstraintMapping>,
) -> Result<Option<Value>, GenerationError> {
    if let Some(mapping) = mapping {
        if let Some(candidates) =
            mapping.constrained_values(&parameter.name, RelationScope::Parameter)
        {
            return generator.value_from_candidates(candidates);
        }
        if let Some(id) = mapping.dependent_id(
            &parameter.name,
            RelationScope::Parameter,
            generator.operation_id,
            generator.ids,
            generator.dependency_policy,
        )? {
            return Ok(Some(id));
        }
    }
    generator.generate_valid(&parameter.schema).map(Some)
}

fn apply_overrides(data: &mut RequestData, overrides: &RequestOverrides) {
    for (name, value) in &overrides.query {
        data.query.insert(name.clone(), value.clone());
    }
    for (name, value) in &overrides.headers {
        data.headers.insert(name.clone(), header_string(value));
    }
    if overrides.body.is_empty() {
        return;
    }
    match data.body.as_mut() {
        Some(Value::Object(body)) => {
            for (name, value) in &overrides.body {
                body.insert(name.clone(), value.clone());
            }
        }
        Some(other) => tracing::warn!(
            "Ignoring body overrides for a {} body",
            json_type_name(other)
        ),
        None => data.body = Some(Value::Object(overrides.body.clone())),
    }
}

fn declared_invalid(
    mapping: &ConstraintMapping,
    name: &str,
    scope: RelationScope,
    status: u16,
) -> Option<ConstraintValue> {
    mapping
        .value_constraints(name, scope)
        .find_map(|vc| vc.invalid_value_for(status))
        .cloned()
}

fn resolve_declared(
    generator: &mut ValueGenerator<'_>,
    declared: ConstraintValue,
) -> Result<InvalidValue, GenerationError> {
    Ok(match declared {
        ConstraintValue::Value(value) => InvalidValue::Value(value),
        ConstraintValue::Schema(schema) => InvalidValue::Value(generator.generate_valid(&schema)?),
        ConstraintValue::Ignore => InvalidValue::Ignore,
    })
}

fn object_body(data: &RequestData) -> Result<Map<String, Value>, GenerationError> {
    match &data.body {
        Some(Value::Object(body)) => Ok(body.clone()),
        Some(other) => Err(GenerationError::Unsupported(format!(
            "invalidating a {} body",
            json_type_name(other)
        ))),
        None => Err(GenerationError::Exhausted("operation has no request body".to_owned())),
    }
}

fn is_template_segment(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

fn id_segment(id: &Value) -> String {
    id.as_str().map_or_else(|| id.to_string(), ToOwned::to_owned)
}

fn url_path(url: &str) -> &str {
    url.split_once("://")
        .map_or(url, |(_, rest)| rest.find('/').map_or("/", |index| &rest[index..]))
}
