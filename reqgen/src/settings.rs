use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// What to do when several `IdDependency` relations name the same property
/// and none of them is tied to the current operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Treat the property as having no dependency.
    #[default]
    Lenient,
    /// Fail with `GenerationError::AmbiguousDependency`.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorSettings {
    /// Status used for generic "invalid property" requests.
    pub invalid_property_default_code: u16,
    /// How many times a `$ref` may be entered again while it is being loaded.
    pub recursion_limit: usize,
    /// Value substituted for a schema once the recursion limit is reached.
    pub recursion_default: Value,
    pub dependency_policy: DependencyPolicy,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            invalid_property_default_code: 422,
            recursion_limit: 1,
            recursion_default: json!({}),
            dependency_policy: DependencyPolicy::Lenient,
        }
    }
}
