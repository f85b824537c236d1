//! Relation mappings and `OpenAPI` documents loaded from disk.
//!
//! Mapping files are JSON or YAML documents in the [`MappingFile`] format.
//! A path may name a single file or a directory, which is walked for
//! `.json`, `.yaml` and `.yml` files in file name order.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

use crate::relations::{
    ConstraintMapping, ConstraintValue, IdDependency, IdReference, PathOverride, Relation,
    UniquenessConstraint, ValueConstraint,
};
use crate::schema::SchemaError;
use crate::schema_loader::SchemaLoader;
use crate::settings::GeneratorSettings;

const VALID_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];
const EXCLUDE_LIST: &[&str] = &["node_modules", "target", ".git"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse '{path}': {reason}")]
    Parse { path: String, reason: String },
    #[error("'{0}' is neither a file nor a directory")]
    NotFound(String),
    #[error("Invalid relation for {method} {path}: {reason}")]
    InvalidRelation {
        path: String,
        method: String,
        reason: String,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn default_value_error_code() -> u16 {
    422
}

fn default_path_error_code() -> u16 {
    404
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MappingFile {
    /// Overrides for the generator settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<GeneratorSettings>,
    #[serde(default)]
    pub operations: Vec<OperationMappingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OperationMappingConfig {
    /// Path template as written in the `OpenAPI` document.
    pub path: String,
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Body and path relations.
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    /// Query and header relations.
    #[serde(default)]
    pub parameter_relations: Vec<RelationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RelationConfig {
    ValueConstraint {
        property: String,
        /// Literal allowed values.
        #[serde(default)]
        values: Vec<Value>,
        /// Schemas a value is generated from when chosen.
        #[serde(default)]
        value_schemas: Vec<Value>,
        /// The property must be left out.
        #[serde(default)]
        ignore: bool,
        #[serde(default)]
        invalid_value: Option<Value>,
        /// Leaving the property out is the invalid value.
        #[serde(default)]
        invalid_value_ignore: bool,
        #[serde(default)]
        invalid_value_error_code: Option<u16>,
        #[serde(default = "default_value_error_code")]
        error_code: u16,
        #[serde(default)]
        treat_as_mandatory: bool,
    },
    IdDependency {
        property: String,
        source_path: String,
        #[serde(default)]
        operation_id: Option<String>,
        #[serde(default = "default_value_error_code")]
        error_code: u16,
    },
    IdReference {
        property: String,
        consumer_post_path: String,
        #[serde(default = "default_value_error_code")]
        error_code: u16,
    },
    UniquenessConstraint {
        property: String,
        value: Value,
        #[serde(default = "default_value_error_code")]
        error_code: u16,
    },
    PathOverride {
        path: String,
        #[serde(default)]
        invalid_path: Option<String>,
        #[serde(default)]
        invalid_path_error_code: Option<u16>,
        #[serde(default = "default_path_error_code")]
        error_code: u16,
    },
}

impl RelationConfig {
    fn into_relation(
        self,
        loader: &mut SchemaLoader<'_>,
        location: &str,
    ) -> Result<Relation, ConfigError> {
        let relation = match self {
            RelationConfig::ValueConstraint {
                property,
                values,
                value_schemas,
                ignore,
                invalid_value,
                invalid_value_ignore,
                invalid_value_error_code,
                error_code,
                treat_as_mandatory,
            } => {
                let mut allowed: Vec<ConstraintValue> =
                    values.into_iter().map(ConstraintValue::Value).collect();
                for (i, raw) in value_schemas.iter().enumerate() {
                    let node =
                        loader.load(raw, &format!("{location}/{property}/value_schemas/{i}"))?;
                    allowed.push(ConstraintValue::Schema(Arc::new(node)));
                }
                if ignore {
                    allowed.push(ConstraintValue::Ignore);
                }
                let invalid_value = if invalid_value_ignore {
                    Some(ConstraintValue::Ignore)
                } else {
                    invalid_value.map(ConstraintValue::Value)
                };
                Relation::ValueConstraint(ValueConstraint {
                    property,
                    values: allowed,
                    invalid_value,
                    invalid_value_error_code,
                    error_code,
                    treat_as_mandatory,
                })
            }
            RelationConfig::IdDependency {
                property,
                source_path,
                operation_id,
                error_code,
            } => Relation::IdDependency(IdDependency {
                property,
                source_path,
                operation_id,
                error_code,
            }),
            RelationConfig::IdReference {
                property,
                consumer_post_path,
                error_code,
            } => Relation::IdReference(IdReference {
                property,
                consumer_post_path,
                error_code,
            }),
            RelationConfig::UniquenessConstraint {
                property,
                value,
                error_code,
            } => Relation::UniquenessConstraint(UniquenessConstraint {
                property,
                value,
                error_code,
            }),
            RelationConfig::PathOverride {
                path,
                invalid_path,
                invalid_path_error_code,
                error_code,
            } => Relation::PathOverride(PathOverride {
                path,
                invalid_path,
                invalid_path_error_code,
                error_code,
            }),
        };
        Ok(relation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: HashMap<(String, String), Arc<ConstraintMapping>>,
}

impl MappingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, method: &str, mapping: ConstraintMapping) {
        self.mappings
            .insert((path.to_owned(), method.to_lowercase()), Arc::new(mapping));
    }

    #[must_use]
    pub fn get(&self, path: &str, method: &str) -> Option<Arc<ConstraintMapping>> {
        self.mappings
            .get(&(path.to_owned(), method.to_lowercase()))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// # Errors
    /// `ConfigError::Schema` when a value schema fails to load.
    pub fn from_files(
        files: Vec<MappingFile>,
        loader: &mut SchemaLoader<'_>,
    ) -> Result<Self, ConfigError> {
        let mut collected: Vec<((String, String), ConstraintMapping)> = Vec::new();
        for file in files {
            for operation in file.operations {
                let key = (operation.path.clone(), operation.method.to_lowercase());
                let location = format!("{} {}", key.1, key.0);
                let relations = operation
                    .relations
                    .into_iter()
                    .map(|r| r.into_relation(loader, &location))
                    .collect::<Result<Vec<_>, _>>()?;
                let parameter_relations = operation
                    .parameter_relations
                    .into_iter()
                    .map(|r| r.into_relation(loader, &location))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(invalid) = parameter_relations
                    .iter()
                    .find(|r| matches!(r, Relation::PathOverride(_)))
                {
                    return Err(ConfigError::InvalidRelation {
                        path: key.0,
                        method: key.1,
                        reason: format!("{} belongs in 'relations'", invalid.kind()),
                    });
                }

                if let Some((_, existing)) = collected.iter_mut().find(|(k, _)| *k == key) {
                    existing.relations.extend(relations);
                    existing.parameter_relations.extend(parameter_relations);
                } else {
                    collected.push((key, ConstraintMapping::new(relations, parameter_relations)));
                }
            }
        }

        let mut table = MappingTable::new();
        for ((path, method), mapping) in collected {
            table.insert(&path, &method, mapping);
        }
        tracing::info!("Loaded constraint mappings for {} operations", table.len());
        Ok(table)
    }
}

#[must_use]
pub fn merged_settings(files: &[MappingFile]) -> GeneratorSettings {
    files
        .iter()
        .rev()
        .find_map(|f| f.settings.clone())
        .unwrap_or_default()
}

#[must_use]
pub fn mapping_file_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(MappingFile)).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

fn has_valid_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| VALID_EXTENSIONS.contains(&e.as_str()))
}

fn collect_files(path: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let root = PathBuf::from(shellexpand::tilde(path).to_string());
    if root.is_file() {
        return Ok(vec![root]);
    }
    if !root.is_dir() {
        return Err(ConfigError::NotFound(root.to_string_lossy().to_string()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && EXCLUDE_LIST.contains(&entry.file_name().to_string_lossy().as_ref()))
        });
    for entry in walker.flatten() {
        let path = entry.path();
        if path.is_file() && has_valid_extension(path) {
            tracing::debug!("- discovered file: {}", path.display());
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// # Errors
/// `ConfigError::Io` or `ConfigError::Parse`.
pub fn read_value_file(path: &Path) -> Result<Value, ConfigError> {
    let display = path.to_string_lossy().to_string();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let parsed: Result<Value, String> = match extension.as_str() {
        "yaml" | "yml" => serde_saphyr::from_str(&content).map_err(|e| e.to_string()),
        _ => serde_json::from_str(&content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| ConfigError::Parse {
        path: display,
        reason,
    })
}

/// # Errors
/// `ConfigError` when the file cannot be read or parsed.
pub fn load_document(path: &str) -> Result<Value, ConfigError> {
    let path = PathBuf::from(shellexpand::tilde(path).to_string());
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_string_lossy().to_string()));
    }
    let document = read_value_file(&path)?;
    tracing::info!("Loaded OpenAPI document {}", path.display());
    Ok(document)
}

/// # Errors
/// `ConfigError` for unreadable files or files not in the mapping format.
pub fn read_mapping_files(path: &str) -> Result<Vec<MappingFile>, ConfigError> {
    let mut files = Vec::new();
    for file in collect_files(path)? {
        let value = read_value_file(&file)?;
        let mapping: MappingFile =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse {
                path: file.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        files.push(mapping);
    }
    tracing::info!("Read {} mapping files from {}", files.len(), path);
    Ok(files)
}
