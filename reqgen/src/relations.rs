//! Relations declared by the user for an operation, and the resolver that
//! decides which of them can produce a requested status code.

use serde_json::Value;
use std::sync::Arc;

use crate::generator::GenerationError;
use crate::providers::IdProvider;
use crate::schema::SchemaNode;
use crate::settings::DependencyPolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    Value(Value),
    /// A nested schema; a value is generated from it when chosen.
    Schema(Arc<SchemaNode>),
    /// The property or parameter must be left out.
    Ignore,
}

impl ConstraintValue {
    #[must_use]
    pub fn is_ignore(&self) -> bool {
        matches!(self, ConstraintValue::Ignore)
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ConstraintValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueConstraint {
    pub property: String,
    pub values: Vec<ConstraintValue>,
    /// `None` when no invalid value is declared.
    pub invalid_value: Option<ConstraintValue>,
    pub invalid_value_error_code: Option<u16>,
    pub error_code: u16,
    pub treat_as_mandatory: bool,
}

impl ValueConstraint {
    #[must_use]
    pub fn invalid_value_for(&self, code: u16) -> Option<&ConstraintValue> {
        let produces = self.invalid_value_error_code.unwrap_or(self.error_code);
        self.invalid_value.as_ref().filter(|_| produces == code)
    }

    #[must_use]
    pub fn forces_ignore(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(ConstraintValue::is_ignore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdDependency {
    pub property: String,
    /// Path of the resource collection whose ids are valid values.
    pub source_path: String,
    /// Ties the dependency to one operation when several name the same
    /// property.
    pub operation_id: Option<String>,
    pub error_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdReference {
    pub property: String,
    /// Endpoint whose POST body references the resource by `property`.
    pub consumer_post_path: String,
    pub error_code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessConstraint {
    pub property: String,
    pub value: Value,
    pub error_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOverride {
    pub path: String,
    pub invalid_path: Option<String>,
    pub invalid_path_error_code: Option<u16>,
    pub error_code: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    ValueConstraint(ValueConstraint),
    IdDependency(IdDependency),
    IdReference(IdReference),
    UniquenessConstraint(UniquenessConstraint),
    PathOverride(PathOverride),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationScope {
    Body,
    Parameter,
    Path,
}

impl Relation {
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        match self {
            Relation::ValueConstraint(r) => Some(&r.property),
            Relation::IdDependency(r) => Some(&r.property),
            Relation::IdReference(r) => Some(&r.property),
            Relation::UniquenessConstraint(r) => Some(&r.property),
            Relation::PathOverride(_) => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> u16 {
        match self {
            Relation::ValueConstraint(r) => r.error_code,
            Relation::IdDependency(r) => r.error_code,
            Relation::IdReference(r) => r.error_code,
            Relation::UniquenessConstraint(r) => r.error_code,
            Relation::PathOverride(r) => r.error_code,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Relation::ValueConstraint(_) => "value_constraint",
            Relation::IdDependency(_) => "id_dependency",
            Relation::IdReference(_) => "id_reference",
            Relation::UniquenessConstraint(_) => "uniqueness_constraint",
            Relation::PathOverride(_) => "path_override",
        }
    }

    #[must_use]
    pub fn matches_status(&self, code: u16) -> bool {
        if self.error_code() == code {
            return true;
        }
        match self {
            Relation::ValueConstraint(r) => {
                r.invalid_value.is_some() && r.invalid_value_error_code == Some(code)
            }
            Relation::PathOverride(r) => {
                r.invalid_path.is_some() && r.invalid_path_error_code == Some(code)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintMapping {
    /// Body relations; path relations live here as well.
    pub relations: Vec<Relation>,
    /// Query and header relations.
    pub parameter_relations: Vec<Relation>,
}

impl ConstraintMapping {
    #[must_use]
    pub fn new(relations: Vec<Relation>, parameter_relations: Vec<Relation>) -> Self {
        Self {
            relations,
            parameter_relations,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty() && self.parameter_relations.is_empty()
    }

    fn scoped(&self, scope: RelationScope) -> &[Relation] {
        match scope {
            RelationScope::Body | RelationScope::Path => &self.relations,
            RelationScope::Parameter => &self.parameter_relations,
        }
    }

    #[must_use]
    pub fn relations_for_error_code(&self, code: u16, scope: RelationScope) -> Vec<&Relation> {
        self.scoped(scope)
            .iter()
            .filter(|r| matches!(r, Relation::PathOverride(_)) == (scope == RelationScope::Path))
            .filter(|r| r.matches_status(code))
            .collect()
    }

    #[must_use]
    pub fn constrained_values(
        &self,
        property: &str,
        scope: RelationScope,
    ) -> Option<&[ConstraintValue]> {
        self.scoped(scope).iter().find_map(|r| match r {
            Relation::ValueConstraint(vc) if vc.property == property && !vc.values.is_empty() => {
                Some(vc.values.as_slice())
            }
            _ => None,
        })
    }

    pub fn value_constraints<'a>(
        &'a self,
        property: &'a str,
        scope: RelationScope,
    ) -> impl Iterator<Item = &'a ValueConstraint> + 'a {
        self.scoped(scope).iter().filter_map(move |r| match r {
            Relation::ValueConstraint(vc) if vc.property == property => Some(vc),
            _ => None,
        })
    }

    #[must_use]
    pub fn forces_ignore(&self, property: &str, scope: RelationScope) -> bool {
        self.value_constraints(property, scope)
            .any(ValueConstraint::forces_ignore)
    }

    #[must_use]
    pub fn constrained_properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for relation in &self.relations {
            let name = match relation {
                Relation::ValueConstraint(r) => &r.property,
                Relation::IdDependency(r) => &r.property,
                _ => continue,
            };
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    #[must_use]
    pub fn mandatory_properties(&self, scope: RelationScope) -> Vec<&str> {
        self.scoped(scope)
            .iter()
            .filter_map(|r| match r {
                Relation::ValueConstraint(vc) if vc.treat_as_mandatory => {
                    Some(vc.property.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// # Errors
    /// Propagates id provider failures, and returns
    /// `GenerationError::AmbiguousDependency` under the strict policy when
    /// several dependencies exist and none is tied to `operation_id`.
    pub fn dependent_id(
        &self,
        property: &str,
        scope: RelationScope,
        operation_id: Option<&str>,
        ids: &dyn IdProvider,
        policy: DependencyPolicy,
    ) -> Result<Option<Value>, GenerationError> {
        let candidates: Vec<&IdDependency> = self
            .scoped(scope)
            .iter()
            .filter_map(|r| match r {
                Relation::IdDependency(dep) if dep.property == property => Some(dep),
                _ => None,
            })
            .collect();

        let chosen = match candidates.as_slice() {
            [] => return Ok(None),
            [only] => *only,
            several => {
                let tied = several.iter().find(|dep| {
                    dep.operation_id.is_some() && dep.operation_id.as_deref() == operation_id
                });
                match (tied, policy) {
                    (Some(dep), _) => *dep,
                    (None, DependencyPolicy::Lenient) => {
                        tracing::debug!(
                            "{} dependencies for '{}' and none tied to '{}', \
                             treating as independent",
                            several.len(),
                            property,
                            operation_id.unwrap_or("-")
                        );
                        return Ok(None);
                    }
                    (None, DependencyPolicy::Strict) => {
                        return Err(GenerationError::AmbiguousDependency {
                            property: property.to_owned(),
                            candidates: several.len(),
                        });
                    }
                }
            }
        };

        let id = ids.valid_id(&chosen.source_path, chosen.operation_id.as_deref())?;
        tracing::debug!("Resolved '{}' from {} to {}", property, chosen.source_path, id);
        Ok(Some(id))
    }
}
