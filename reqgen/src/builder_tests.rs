#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::builder::{RequestDataBuilder, RequestOverrides};
    use crate::generator::GenerationError;
    use crate::mapping_config::MappingTable;
    use crate::providers::{CreatedResource, ProviderError, ResourceCreator, StaticIdProvider};
    use crate::relations::{
        ConstraintMapping, ConstraintValue, IdDependency, IdReference, PathOverride, Relation,
        UniquenessConstraint, ValueConstraint,
    };
    use crate::settings::GeneratorSettings;
    use crate::validation::is_valid;
    use serde_json::{Map, Value, json};
    use std::cell::RefCell;
    use std::rc::Rc;

    const UNIQUE_EMAIL: &str = "alpha@example.com";

    type Calls = Rc<RefCell<Vec<(String, Value)>>>;

    struct RecordingCreator {
        calls: Calls,
        ok: bool,
        status_code: u16,
    }

    impl RecordingCreator {
        fn new(ok: bool, status_code: u16) -> (Self, Calls) {
            let calls = Calls::default();
            let creator = Self {
                calls: Rc::clone(&calls),
                ok,
                status_code,
            };
            (creator, calls)
        }
    }

    impl ResourceCreator for RecordingCreator {
        fn create(
            &self,
            path: &str,
            body: &Value,
            _query: &Map<String, Value>,
            _headers: &Map<String, Value>,
        ) -> Result<CreatedResource, ProviderError> {
            self.calls.borrow_mut().push((path.to_owned(), body.clone()));
            Ok(CreatedResource {
                ok: self.ok,
                status_code: self.status_code,
                body: body.clone(),
            })
        }
    }

    fn document() -> Value {
        let employee_body = json!({
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Employee"}}}
        });
        let wagegroup_body = json!({
            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Wagegroup"}}}
        });
        json!({
            "openapi": "3.0.3",
            "paths": {
                "/employees": {
                    "post": {
                        "operationId": "createEmployee",
                        "parameters": [
                            {"name": "dry_run", "in": "query", "schema": {"type": "boolean"}},
                            {
                                "name": "X-Request-Id",
                                "in": "header",
                                "required": true,
                                "schema": {"type": "integer", "minimum": 1, "maximum": 9}
                            }
                        ],
                        "requestBody": employee_body
                    }
                },
                "/employees/{employee_id}": {
                    "parameters": [
                        {
                            "name": "employee_id",
                            "in": "path",
                            "required": true,
                            "schema": {"type": "string"}
                        }
                    ],
                    "get": {"operationId": "getEmployee"},
                    "put": {"operationId": "putEmployee", "requestBody": employee_body}
                },
                "/wagegroups": {
                    "post": {"operationId": "createWagegroup", "requestBody": wagegroup_body}
                },
                "/wagegroups/{wagegroup_id}": {
                    "parameters": [
                        {
                            "name": "wagegroup_id",
                            "in": "path",
                            "required": true,
                            "schema": {"type": "string"}
                        }
                    ],
                    "put": {"operationId": "putWagegroup", "requestBody": wagegroup_body},
                    "delete": {"operationId": "deleteWagegroup"}
                }
            },
            "components": {
                "schemas": {
                    "Employee": {
                        "type": "object",
                        "required": ["name", "email", "wagegroup_id"],
                        "properties": {
                            "id": {"type": "string", "readOnly": true},
                            "name": {"type": "string", "minLength": 1, "maxLength": 20},
                            "email": {"type": "string", "format": "email"},
                            "wagegroup_id": {"type": "string"},
                            "age": {"type": "integer", "minimum": 18, "maximum": 65}
                        }
                    },
                    "Wagegroup": {
                        "type": "object",
                        "required": ["hourly_rate"],
                        "properties": {
                            "hourly_rate": {"type": "number", "minimum": 14.37}
                        }
                    }
                }
            }
        })
    }

    fn employee_relations() -> Vec<Relation> {
        vec![
            Relation::IdDependency(IdDependency {
                property: "wagegroup_id".to_owned(),
                source_path: "/wagegroups".to_owned(),
                operation_id: None,
                error_code: 451,
            }),
            Relation::UniquenessConstraint(UniquenessConstraint {
                property: "email".to_owned(),
                value: json!(UNIQUE_EMAIL),
                error_code: 409,
            }),
            Relation::ValueConstraint(ValueConstraint {
                property: "name".to_owned(),
                values: vec![],
                invalid_value: Some(ConstraintValue::Value(json!("forbidden"))),
                invalid_value_error_code: None,
                error_code: 418,
                treat_as_mandatory: false,
            }),
        ]
    }

    fn parameter_relations() -> Vec<Relation> {
        vec![
            Relation::ValueConstraint(ValueConstraint {
                property: "dry_run".to_owned(),
                values: vec![ConstraintValue::Ignore],
                invalid_value: None,
                invalid_value_error_code: None,
                error_code: 422,
                treat_as_mandatory: false,
            }),
            Relation::ValueConstraint(ValueConstraint {
                property: "X-Request-Id".to_owned(),
                values: vec![],
                invalid_value: Some(ConstraintValue::Value(json!("abc"))),
                invalid_value_error_code: Some(400),
                error_code: 422,
                treat_as_mandatory: false,
            }),
        ]
    }

    fn mappings() -> MappingTable {
        let mut table = MappingTable::new();
        table.insert(
            "/employees",
            "post",
            ConstraintMapping::new(employee_relations(), parameter_relations()),
        );
        table.insert(
            "/employees/{employee_id}",
            "put",
            ConstraintMapping::new(employee_relations(), vec![]),
        );
        table.insert(
            "/employees/{employee_id}",
            "get",
            ConstraintMapping::new(
                vec![Relation::PathOverride(PathOverride {
                    path: "/employees/{employee_id}".to_owned(),
                    invalid_path: Some("/employees/not-a-number".to_owned()),
                    invalid_path_error_code: Some(400),
                    error_code: 404,
                })],
                vec![],
            ),
        );
        table.insert(
            "/wagegroups/{wagegroup_id}",
            "put",
            ConstraintMapping::new(
                vec![Relation::IdReference(IdReference {
                    property: "wagegroup_id".to_owned(),
                    consumer_post_path: "/employees".to_owned(),
                    error_code: 406,
                })],
                vec![],
            ),
        );
        table
    }

    fn ids() -> StaticIdProvider {
        StaticIdProvider::new()
            .with_id("/wagegroups", json!("wg-1"))
            .with_id("/employees/{employee_id}", json!("emp-1"))
            .with_id("/wagegroups/{wagegroup_id}", json!("wg-1"))
    }

    fn builder(seed: u64) -> RequestDataBuilder {
        RequestDataBuilder::from_document(&document(), &mappings(), GeneratorSettings::default())
            .unwrap()
            .with_seed(seed)
            .with_id_provider(ids())
    }

    // --- valid data ----------------------------------------------------------

    #[test]
    fn test_build_valid_request() {
        let mut builder = builder(1);
        let data = builder
            .build("/employees", "POST", &RequestOverrides::default())
            .unwrap();

        let body = data.body.clone().unwrap();
        assert!(body.get("id").is_none());
        assert_eq!(body["wagegroup_id"], json!("wg-1"));
        assert!(body["email"].as_str().unwrap().contains('@'));
        assert!(is_valid(data.body_schema.as_ref().unwrap(), &body));

        assert!(data.query.get("dry_run").is_none());
        let request_id: i64 = data.headers["X-Request-Id"].as_str().unwrap().parse().unwrap();
        assert!((1..=9).contains(&request_id));
        assert_eq!(data.operation_id.as_deref(), Some("createEmployee"));
        assert!(data.has_body);
    }

    #[test]
    fn test_build_applies_overrides_last() {
        let mut builder = builder(2);
        let overrides: RequestOverrides = serde_json::from_value(json!({
            "query": {"page": 2},
            "headers": {"X-Trace": 5},
            "body": {"name": "Override"}
        }))
        .unwrap();
        let data = builder.build("/employees", "post", &overrides).unwrap();
        assert_eq!(data.query["page"], json!(2));
        assert_eq!(data.headers["X-Trace"], json!("5"));
        assert_eq!(data.body.unwrap()["name"], json!("Override"));
    }

    #[test]
    fn test_build_unknown_operation_is_empty() {
        let mut builder = builder(3);
        let data = builder
            .build("/nowhere", "get", &RequestOverrides::default())
            .unwrap();
        assert!(data.body.is_none());
        assert!(data.query.is_empty());
        assert!(data.parameters.is_empty());
    }

    #[test]
    fn test_build_is_reproducible_under_a_seed() {
        let first = builder(4)
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let second = builder(4)
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        assert_eq!(first.body, second.body);
        assert_eq!(first.headers, second.headers);
    }

    // --- invalid bodies --------------------------------------------------------

    #[test]
    fn test_default_code_invalidates_one_property() {
        for seed in 0..10 {
            let mut builder = builder(seed);
            let data = builder
                .build("/employees", "post", &RequestOverrides::default())
                .unwrap();
            let invalid = builder
                .build_invalid_body("/employees", "post", 422, &data)
                .unwrap();
            let schema = data.body_schema.as_ref().unwrap();
            assert!(!is_valid(schema, &invalid), "{invalid}");

            let valid = data.body.as_ref().unwrap().as_object().unwrap();
            let invalid_map = invalid.as_object().unwrap();
            let mut keys: Vec<&String> = valid.keys().chain(invalid_map.keys()).collect();
            keys.sort();
            keys.dedup();
            let changed = keys
                .iter()
                .filter(|key| valid.get(key.as_str()) != invalid_map.get(key.as_str()))
                .count();
            assert_eq!(changed, 1, "{invalid}");
        }
    }

    #[test]
    fn test_dependency_is_broken_with_random_id() {
        let mut builder = builder(5);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let invalid = builder
            .build_invalid_body("/employees", "post", 451, &data)
            .unwrap();
        let id = invalid["wagegroup_id"].as_str().unwrap();
        assert_ne!(id, "wg-1");
        assert_eq!(id.len(), 32);
        assert_eq!(invalid["name"], data.body.unwrap()["name"]);
    }

    #[test]
    fn test_declared_invalid_value_is_used() {
        let mut builder = builder(6);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let invalid = builder
            .build_invalid_body("/employees", "post", 418, &data)
            .unwrap();
        assert_eq!(invalid["name"], json!("forbidden"));
    }

    #[test]
    fn test_unmatched_status_is_exhausted() {
        let mut builder = builder(7);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let result = builder.build_invalid_body("/employees", "post", 499, &data);
        assert!(matches!(result, Err(GenerationError::Exhausted(_))));
    }

    #[test]
    fn test_uniqueness_creates_conflicting_resource() {
        let (creator, calls) = RecordingCreator::new(true, 201);
        let mut builder = builder(8).with_creator(creator);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let body = builder
            .build_invalid_body("/employees", "post", 409, &data)
            .unwrap();
        assert_eq!(body["email"], json!(UNIQUE_EMAIL));

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/employees");
        assert_eq!(calls[0].1, body);
    }

    #[test]
    fn test_uniqueness_for_put_posts_to_collection() {
        let (creator, calls) = RecordingCreator::new(true, 201);
        let mut builder = builder(9).with_creator(creator);
        let data = builder
            .build("/employees/{employee_id}", "put", &RequestOverrides::default())
            .unwrap();
        builder
            .build_invalid_body("http://localhost:8000/employees/emp-1", "put", 409, &data)
            .unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://localhost:8000/employees");
        assert_eq!(calls[0].1["email"], json!(UNIQUE_EMAIL));
        assert_eq!(calls[0].1["wagegroup_id"], json!("wg-1"));
    }

    #[test]
    fn test_uniqueness_conflict_status_is_accepted() {
        let (creator, _) = RecordingCreator::new(false, 409);
        let mut builder = builder(10).with_creator(creator);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        assert!(builder.build_invalid_body("/employees", "post", 409, &data).is_ok());
    }

    #[test]
    fn test_uniqueness_create_failure_is_propagated() {
        let (creator, _) = RecordingCreator::new(false, 500);
        let mut builder = builder(11).with_creator(creator);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let result = builder.build_invalid_body("/employees", "post", 409, &data);
        assert!(matches!(
            result,
            Err(GenerationError::Provider(ProviderError::CreateFailed { status_code: 500, .. }))
        ));
    }

    #[test]
    fn test_reference_makes_resource_in_use() {
        let (creator, calls) = RecordingCreator::new(true, 201);
        let mut builder = builder(12).with_creator(creator);
        let data = builder
            .build("/wagegroups/{wagegroup_id}", "put", &RequestOverrides::default())
            .unwrap();
        let body = builder
            .build_invalid_body("/wagegroups/wg-1", "put", 406, &data)
            .unwrap();
        assert_eq!(Some(body), data.body);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/employees");
        assert_eq!(calls[0].1["wagegroup_id"], json!("wg-1"));
    }

    #[test]
    fn test_reference_without_creator_fails() {
        let mut builder = builder(13);
        let data = builder
            .build("/wagegroups/{wagegroup_id}", "put", &RequestOverrides::default())
            .unwrap();
        let result = builder.build_invalid_body("/wagegroups/wg-1", "put", 406, &data);
        assert!(matches!(result, Err(GenerationError::Provider(_))));
    }

    // --- invalid parameters ----------------------------------------------------

    #[test]
    fn test_default_code_invalidates_header() {
        for seed in 0..5 {
            let mut builder = builder(seed);
            let data = builder
                .build("/employees", "post", &RequestOverrides::default())
                .unwrap();
            let invalid = builder.build_invalidated_parameters(422, &data).unwrap();
            assert!(invalid.query.get("dry_run").is_none());
            let header = invalid.headers["X-Request-Id"].as_str().unwrap();
            assert!(header == "0" || header == "10", "{header}");
        }
    }

    #[test]
    fn test_declared_invalid_parameter_value() {
        let mut builder = builder(14);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let invalid = builder.build_invalidated_parameters(400, &data).unwrap();
        assert_eq!(invalid.headers["X-Request-Id"], json!("abc"));
    }

    #[test]
    fn test_relation_for_unknown_parameter_is_skipped() {
        let mut relations = parameter_relations();
        relations.push(Relation::ValueConstraint(ValueConstraint {
            property: "X-Missing".to_owned(),
            values: vec![],
            invalid_value: Some(ConstraintValue::Value(json!("nope"))),
            invalid_value_error_code: None,
            error_code: 400,
            treat_as_mandatory: false,
        }));
        let mut table = mappings();
        table.insert(
            "/employees",
            "post",
            ConstraintMapping::new(employee_relations(), relations),
        );

        for seed in 0..5 {
            let mut builder =
                RequestDataBuilder::from_document(&document(), &table, GeneratorSettings::default())
                    .unwrap()
                    .with_seed(seed)
                    .with_id_provider(ids());
            let data = builder
                .build("/employees", "post", &RequestOverrides::default())
                .unwrap();
            let invalid = builder.build_invalidated_parameters(400, &data).unwrap();
            assert_eq!(invalid.headers["X-Request-Id"], json!("abc"));
            assert!(invalid.headers.get("X-Missing").is_none());
            assert!(invalid.query.get("X-Missing").is_none());
        }
    }

    #[test]
    fn test_parameters_without_strategy_are_exhausted() {
        let mut builder = builder(15);
        let data = builder
            .build("/employees", "post", &RequestOverrides::default())
            .unwrap();
        let result = builder.build_invalidated_parameters(404, &data);
        assert!(matches!(result, Err(GenerationError::Exhausted(_))));
    }

    // --- urls --------------------------------------------------------------------

    #[test]
    fn test_valid_url_resolves_path_parameters() {
        let mut builder = builder(16);
        assert_eq!(
            builder.valid_url("/employees/{employee_id}").unwrap(),
            "/employees/emp-1"
        );
        assert_eq!(builder.valid_url("/employees").unwrap(), "/employees");
    }

    #[test]
    fn test_invalidated_url_replaces_last_parameter() {
        let mut builder = builder(17);
        let url = builder
            .invalidated_url(
                "http://localhost:8000/employees/emp-1",
                "/employees/{employee_id}",
                404,
            )
            .unwrap();
        let (prefix, id) = url.rsplit_once('/').unwrap();
        assert_eq!(prefix, "http://localhost:8000/employees");
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn test_invalidated_url_uses_path_override() {
        let mut builder = builder(18);
        let url = builder
            .invalidated_url("/employees/emp-1", "/employees/{employee_id}", 400)
            .unwrap();
        assert_eq!(url, "/employees/not-a-number");
    }

    #[test]
    fn test_invalidated_url_without_parameters() {
        let mut builder = builder(19);
        let result = builder.invalidated_url("/employees", "/employees", 404);
        assert!(matches!(result, Err(GenerationError::Exhausted(_))));
    }
}
