pub mod builder;
pub mod generator;
pub mod invalidator;
pub mod mapping_config;
pub mod operation;
pub mod pattern;
pub mod providers;
pub mod random;
pub mod relations;
pub mod request_data;
pub mod schema;
pub mod schema_loader;
pub mod settings;
pub mod validation;
pub mod value_source;

#[cfg(test)]
#[path = "generator_tests.rs"]
mod generator_tests;

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;


// Re-export commonly used types
pub use builder::{InvalidParameters, RequestDataBuilder, RequestOverrides};
pub use generator::{GenerationError, ValueGenerator};
pub use invalidator::{InvalidValue, invalid_from_candidates};
pub use mapping_config::{ConfigError, MappingFile, MappingTable};
pub use operation::{Operation, OperationIndex, Parameter, ParameterLocation};
pub use providers::{
    CreatedResource, IdProvider, ProviderError, ResourceCreator, StaticIdProvider,
    UnavailableCreator, UnavailableIdProvider,
};
pub use random::Randomness;
pub use relations::{
    ConstraintMapping, ConstraintValue, IdDependency, IdReference, PathOverride, Relation,
    RelationScope, UniquenessConstraint, ValueConstraint,
};
pub use request_data::RequestData;
pub use schema::{SchemaError, SchemaNode};
pub use schema_loader::{OasVersion, SchemaLoader};
pub use settings::{DependencyPolicy, GeneratorSettings};
pub use validation::{is_valid, validate_value};
pub use value_source::{FakeValueSource, RawValueSource};
