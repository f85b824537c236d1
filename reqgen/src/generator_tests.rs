#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::generator::{GenerationError, ValueGenerator};
    use crate::invalidator::InvalidValue;
    use crate::providers::{StaticIdProvider, UnavailableIdProvider};
    use crate::random::Randomness;
    use crate::relations::{
        ConstraintMapping, ConstraintValue, IdDependency, Relation, ValueConstraint,
    };
    use crate::schema::{
        AdditionalProperties, ArraySchema, BooleanSchema, ExclusiveBound, IntegerSchema,
        NumberSchema, ObjectSchema, SchemaMeta, SchemaNode, StringSchema, UnionSchema,
    };
    use crate::settings::DependencyPolicy;
    use crate::validation::is_valid;
    use crate::value_source::FakeValueSource;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn generate(seed: u64, node: &SchemaNode) -> Value {
        let mut random = Randomness::seeded(seed);
        ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .generate_valid(node)
            .unwrap()
    }

    fn invalidate(
        seed: u64,
        node: &SchemaNode,
        valid: &Value,
        candidates: &[ConstraintValue],
    ) -> InvalidValue {
        let mut random = Randomness::seeded(seed);
        ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .generate_invalid(node, valid, candidates)
            .unwrap()
    }

    fn string(min: Option<usize>, max: Option<usize>) -> SchemaNode {
        SchemaNode::String(StringSchema {
            min_length: min,
            max_length: max,
            ..StringSchema::default()
        })
    }

    fn object(properties: &[&str], required: &[&str]) -> ObjectSchema {
        ObjectSchema {
            properties: properties
                .iter()
                .map(|name| ((*name).to_owned(), string(None, None)))
                .collect(),
            required: required.iter().map(|name| (*name).to_owned()).collect(),
            ..ObjectSchema::default()
        }
    }

    fn value_constraint(property: &str, values: Vec<ConstraintValue>) -> Relation {
        Relation::ValueConstraint(ValueConstraint {
            property: property.to_owned(),
            values,
            invalid_value: None,
            invalid_value_error_code: None,
            error_code: 422,
            treat_as_mandatory: false,
        })
    }

    fn dependency(property: &str, source_path: &str, operation_id: Option<&str>) -> Relation {
        Relation::IdDependency(IdDependency {
            property: property.to_owned(),
            source_path: source_path.to_owned(),
            operation_id: operation_id.map(ToOwned::to_owned),
            error_code: 404,
        })
    }

    fn with_mapping(node: ObjectSchema, relations: Vec<Relation>) -> SchemaNode {
        SchemaNode::Object(node)
            .with_constraint_mapping(Arc::new(ConstraintMapping::new(relations, vec![])))
    }

    // --- valid generation --------------------------------------------------

    #[test]
    fn test_const_and_enum_take_precedence() {
        let constant = SchemaNode::String(StringSchema {
            const_value: Some("fixed".to_owned()),
            pattern: Some("^[0-9]+$".to_owned()),
            ..StringSchema::default()
        });
        assert_eq!(generate(1, &constant), json!("fixed"));

        let choices = SchemaNode::Integer(IntegerSchema {
            enum_values: Some(vec![3, 5, 8]),
            ..IntegerSchema::default()
        });
        for seed in 0..10 {
            let value = generate(seed, &choices);
            assert!([json!(3), json!(5), json!(8)].contains(&value));
        }
    }

    #[test]
    fn test_default_string_is_a_uuid() {
        let value = generate(2, &string(None, None));
        assert!(uuid::Uuid::parse_str(value.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_string_length_is_clamped() {
        for seed in 0..10 {
            let long = generate(seed, &string(Some(40), Some(50)));
            let len = long.as_str().unwrap().chars().count();
            assert!((40..=50).contains(&len), "length {len}");

            let short = generate(seed, &string(None, Some(5)));
            assert!(short.as_str().unwrap().chars().count() <= 5);
        }
    }

    #[test]
    fn test_contradictory_string_bounds() {
        let mut random = Randomness::seeded(3);
        let result = ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .generate_valid(&string(Some(10), Some(2)));
        assert!(matches!(result, Err(GenerationError::Unsatisfiable(_))));
    }

    #[test]
    fn test_pattern_strings_match() {
        let node = SchemaNode::String(StringSchema {
            pattern: Some("^[A-Z]{3}-[0-9]{2}$".to_owned()),
            ..StringSchema::default()
        });
        let re = regex::Regex::new("^[A-Z]{3}-[0-9]{2}$").unwrap();
        for seed in 0..10 {
            let value = generate(seed, &node);
            assert!(re.is_match(value.as_str().unwrap()), "{value}");
        }
    }

    #[test]
    fn test_integer_defaults_to_int32() {
        for seed in 0..20 {
            let value = generate(seed, &SchemaNode::Integer(IntegerSchema::default()));
            let n = value.as_i64().unwrap();
            assert!(i32::try_from(n).is_ok());
        }
    }

    #[test]
    fn test_integer_exclusive_flags_narrow_by_one() {
        let node = SchemaNode::Integer(IntegerSchema {
            minimum: Some(0),
            maximum: Some(2),
            exclusive_minimum: Some(ExclusiveBound::Flag(true)),
            exclusive_maximum: Some(ExclusiveBound::Flag(true)),
            ..IntegerSchema::default()
        });
        for seed in 0..5 {
            assert_eq!(generate(seed, &node), json!(1));
        }
    }

    #[test]
    fn test_integer_threshold_bounds() {
        let node = SchemaNode::Integer(IntegerSchema {
            exclusive_minimum: Some(ExclusiveBound::Threshold(7)),
            exclusive_maximum: Some(ExclusiveBound::Threshold(9)),
            ..IntegerSchema::default()
        });
        assert_eq!(generate(4, &node), json!(8));
    }

    #[test]
    fn test_integer_multiple_of() {
        let node = SchemaNode::Integer(IntegerSchema {
            minimum: Some(1),
            maximum: Some(20),
            multiple_of: Some(5.0),
            ..IntegerSchema::default()
        });
        for seed in 0..10 {
            let n = generate(seed, &node).as_i64().unwrap();
            assert_eq!(n % 5, 0);
            assert!((5..=20).contains(&n));
        }
    }

    #[test]
    fn test_number_ranges() {
        for seed in 0..10 {
            let unbounded = generate(seed, &SchemaNode::Number(NumberSchema::default()));
            let n = unbounded.as_f64().unwrap();
            assert!((-1.0..=1.0).contains(&n));

            let anchored = SchemaNode::Number(NumberSchema {
                minimum: Some(10.0),
                ..NumberSchema::default()
            });
            let n = generate(seed, &anchored).as_f64().unwrap();
            assert!((10.0..=11.0).contains(&n));
        }
    }

    #[test]
    fn test_array_item_count() {
        let node = SchemaNode::Array(ArraySchema {
            min_items: Some(2),
            max_items: Some(4),
            ..ArraySchema::new(SchemaNode::Boolean(BooleanSchema::default()))
        });
        for seed in 0..10 {
            let items = generate(seed, &node);
            let items = items.as_array().unwrap();
            assert!((2..=4).contains(&items.len()));
            assert!(items.iter().all(Value::is_boolean));
        }
    }

    #[test]
    fn test_object_respects_required_and_max_properties() {
        let node = SchemaNode::Object(ObjectSchema {
            max_properties: Some(2),
            ..object(&["a", "b", "c", "d"], &["a"])
        });
        for seed in 0..10 {
            let value = generate(seed, &node);
            let map = value.as_object().unwrap();
            assert!(map.contains_key("a"));
            assert!(map.len() <= 2);
        }
    }

    #[test]
    fn test_object_skips_read_only_properties() {
        let mut schema = object(&["name"], &["name"]);
        let mut id = StringSchema::default();
        id.meta.read_only = true;
        schema.properties.insert(0, ("id".to_owned(), SchemaNode::String(id)));
        let value = generate(5, &SchemaNode::Object(schema));
        assert!(value.get("id").is_none());
        assert!(value.get("name").is_some());
    }

    #[test]
    fn test_object_tops_up_to_min_properties() {
        let node = SchemaNode::Object(ObjectSchema {
            min_properties: Some(3),
            ..object(&["a"], &[])
        });
        let value = generate(6, &node);
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("additional_property_0"));
    }

    #[test]
    fn test_constrained_properties_use_candidates() {
        let node = with_mapping(
            object(&["kind", "hidden"], &[]),
            vec![
                value_constraint("kind", vec![ConstraintValue::Value(json!("admin"))]),
                value_constraint("hidden", vec![ConstraintValue::Ignore]),
            ],
        );
        for seed in 0..5 {
            let value = generate(seed, &node);
            assert_eq!(value["kind"], json!("admin"));
            assert!(value.get("hidden").is_none());
        }
    }

    #[test]
    fn test_constraint_candidate_schema_is_generated() {
        let nested = SchemaNode::Integer(IntegerSchema {
            minimum: Some(100),
            maximum: Some(100),
            ..IntegerSchema::default()
        });
        let node = with_mapping(
            object(&["code"], &[]),
            vec![value_constraint("code", vec![ConstraintValue::Schema(Arc::new(nested))])],
        );
        assert_eq!(generate(7, &node)["code"], json!(100));
    }

    #[test]
    fn test_dependency_ids_come_from_provider() {
        let node = with_mapping(
            object(&["owner_id"], &["owner_id"]),
            vec![dependency("owner_id", "/owners", None)],
        );
        let ids = StaticIdProvider::new().with_id("/owners", json!(7));
        let mut random = Randomness::seeded(8);
        let value = ValueGenerator::new(&mut random, &FakeValueSource, &ids)
            .generate_valid(&node)
            .unwrap();
        assert_eq!(value, json!({"owner_id": 7}));
    }

    #[test]
    fn test_ambiguous_dependency_policies() {
        let node = with_mapping(
            object(&["owner_id"], &[]),
            vec![
                dependency("owner_id", "/a-owners", Some("createA")),
                dependency("owner_id", "/b-owners", Some("createB")),
            ],
        );
        let ids = StaticIdProvider::new()
            .with_id("/a-owners", json!("A"))
            .with_id("/b-owners", json!("B"));

        let mut random = Randomness::seeded(9);
        let tied = ValueGenerator::new(&mut random, &FakeValueSource, &ids)
            .for_operation(Some("createB"))
            .generate_valid(&node)
            .unwrap();
        assert_eq!(tied["owner_id"], json!("B"));

        let lenient = ValueGenerator::new(&mut random, &FakeValueSource, &ids)
            .for_operation(Some("other"))
            .generate_valid(&node)
            .unwrap();
        assert!(lenient["owner_id"].as_str().is_some_and(|s| s != "A" && s != "B"));

        let strict = ValueGenerator::new(&mut random, &FakeValueSource, &ids)
            .for_operation(Some("other"))
            .with_dependency_policy(DependencyPolicy::Strict)
            .generate_valid(&node);
        assert!(matches!(
            strict,
            Err(GenerationError::AmbiguousDependency { candidates: 2, .. })
        ));
    }

    #[test]
    fn test_union_prefers_arm_with_constrained_properties() {
        let union = UnionSchema::new(
            SchemaMeta::default(),
            vec![],
            vec![
                SchemaNode::Object(object(&["a"], &["a"])),
                SchemaNode::Object(object(&["b"], &["b"])),
            ],
            vec![],
        )
        .unwrap();
        let node = SchemaNode::Union(union).with_constraint_mapping(Arc::new(ConstraintMapping::new(
            vec![value_constraint("b", vec![ConstraintValue::Value(json!("fixed"))])],
            vec![],
        )));
        for seed in 0..10 {
            assert_eq!(generate(seed, &node), json!({"b": "fixed"}));
        }
    }

    #[test]
    fn test_generated_values_validate() {
        let nodes = [
            string(Some(3), Some(8)),
            SchemaNode::Integer(IntegerSchema {
                minimum: Some(-5),
                exclusive_maximum: Some(ExclusiveBound::Threshold(5)),
                ..IntegerSchema::default()
            }),
            SchemaNode::Number(NumberSchema {
                maximum: Some(0.5),
                exclusive_maximum: Some(ExclusiveBound::Flag(true)),
                ..NumberSchema::default()
            }),
            SchemaNode::Object(object(&["x", "y"], &["x"])),
            SchemaNode::Union(UnionSchema::nullable(string(None, Some(4)))),
        ];
        for node in &nodes {
            for seed in 0..10 {
                let value = generate(seed, node);
                assert!(is_valid(node, &value), "{value} for {}", node.type_name());
            }
        }
    }

    // --- invalid generation ------------------------------------------------

    #[test]
    fn test_string_length_violation() {
        let node = string(Some(3), Some(5));
        for seed in 0..10 {
            let invalid = invalidate(seed, &node, &json!("TTTT"), &[]).into_value().unwrap();
            assert!(invalid == json!("TT") || invalid == json!("TTTTTT"), "{invalid}");
        }
    }

    #[test]
    fn test_integer_minimum_violation() {
        let node = SchemaNode::Integer(IntegerSchema {
            minimum: Some(-10),
            ..IntegerSchema::default()
        });
        let invalid = invalidate(1, &node, &json!(0), &[]);
        assert_eq!(invalid, InvalidValue::Value(json!(-11)));
    }

    #[test]
    fn test_array_count_violations() {
        let node = SchemaNode::Array(ArraySchema {
            min_items: Some(1),
            max_items: Some(2),
            ..ArraySchema::new(SchemaNode::Integer(IntegerSchema::default()))
        });
        let mut random = Randomness::seeded(2);
        let options = ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .values_out_of_bounds(&node, &json!([7]))
            .unwrap();
        assert_eq!(options, vec![json!([]), json!([7, 7, 7])]);
    }

    #[test]
    fn test_ignore_candidate_wins() {
        let invalid = invalidate(
            3,
            &string(None, None),
            &json!("x"),
            &[ConstraintValue::Value(json!("a")), ConstraintValue::Ignore],
        );
        assert_eq!(invalid, InvalidValue::Ignore);
    }

    #[test]
    fn test_single_boolean_candidate_is_negated() {
        let node = SchemaNode::Boolean(BooleanSchema::default());
        let invalid = invalidate(4, &node, &json!(true), &[ConstraintValue::Value(json!(true))]);
        assert_eq!(invalid, InvalidValue::Value(json!(false)));
    }

    #[test]
    fn test_both_boolean_candidates_fall_back_to_type_change() {
        let node = SchemaNode::Boolean(BooleanSchema::default());
        let candidates = [
            ConstraintValue::Value(json!(true)),
            ConstraintValue::Value(json!(false)),
        ];
        let invalid = invalidate(5, &node, &json!(true), &candidates).into_value().unwrap();
        assert!(invalid.is_string());
    }

    #[test]
    fn test_candidates_are_folded() {
        let candidates = [
            ConstraintValue::Value(json!("red")),
            ConstraintValue::Value(json!("blue")),
        ];
        let invalid = invalidate(6, &string(None, None), &json!("red"), &candidates);
        assert_eq!(invalid, InvalidValue::Value(json!("redblueredblue")));
    }

    #[test]
    fn test_enum_violation() {
        let node = SchemaNode::String(StringSchema {
            enum_values: Some(vec!["a".to_owned(), "b".to_owned()]),
            ..StringSchema::default()
        });
        let invalid = invalidate(7, &node, &json!("a"), &[]).into_value().unwrap();
        assert!(invalid != json!("a") && invalid != json!("b"));
        assert!(!is_valid(&node, &invalid));
    }

    #[test]
    fn test_unconstrained_string_changes_type() {
        let invalid = invalidate(8, &string(None, None), &json!("x"), &[]).into_value().unwrap();
        assert!(!invalid.is_string());
    }

    #[test]
    fn test_unconstrained_integer_becomes_string() {
        let invalid = invalidate(9, &SchemaNode::Integer(IntegerSchema::default()), &json!(3), &[])
            .into_value()
            .unwrap();
        assert!(invalid.is_string());
    }

    #[test]
    fn test_mismatched_valid_value_is_regenerated() {
        let node = string(Some(2), Some(2));
        let invalid = invalidate(10, &node, &json!(42), &[]).into_value().unwrap();
        let len = invalid.as_str().unwrap().chars().count();
        assert!(len == 1 || len == 3);
    }

    #[test]
    fn test_number_exclusive_flag_violation() {
        let node = SchemaNode::Number(NumberSchema {
            minimum: Some(1.5),
            exclusive_minimum: Some(ExclusiveBound::Flag(true)),
            ..NumberSchema::default()
        });
        for seed in 0..5 {
            let invalid = invalidate(seed, &node, &json!(2.0), &[]);
            assert_eq!(invalid, InvalidValue::Value(json!(1.5)));
        }
        assert!(!is_valid(&node, &json!(1.5)));
    }

    #[test]
    fn test_number_exclusive_threshold_violation() {
        let node = SchemaNode::Number(NumberSchema {
            maximum: Some(10.0),
            exclusive_maximum: Some(ExclusiveBound::Threshold(2.5)),
            ..NumberSchema::default()
        });
        let mut random = Randomness::seeded(12);
        let options = ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .values_out_of_bounds(&node, &json!(1.0))
            .unwrap();
        assert_eq!(options, vec![json!(2.5)]);
        assert!(!is_valid(&node, &options[0]));
    }

    #[test]
    fn test_object_property_count_violations() {
        let node = SchemaNode::Object(ObjectSchema {
            min_properties: Some(2),
            max_properties: Some(3),
            ..object(&["a", "b", "c"], &[])
        });
        let valid = json!({"a": "x", "b": "y"});
        assert!(is_valid(&node, &valid));

        let mut random = Randomness::seeded(13);
        let options = ValueGenerator::new(&mut random, &FakeValueSource, &UnavailableIdProvider)
            .values_out_of_bounds(&node, &valid)
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0], json!({"a": "x"}));
        let extended = options[1].as_object().unwrap();
        assert_eq!(extended.len(), 4);
        assert!(extended.contains_key("additional_property_1"));
        assert!(options.iter().all(|option| !is_valid(&node, option)));
    }

    #[test]
    fn test_object_extension_uses_additional_properties_schema() {
        let node = SchemaNode::Object(ObjectSchema {
            max_properties: Some(0),
            additional_properties: AdditionalProperties::Schema(Box::new(SchemaNode::Integer(
                IntegerSchema {
                    minimum: Some(1),
                    maximum: Some(1),
                    ..IntegerSchema::default()
                },
            ))),
            ..ObjectSchema::default()
        });
        let invalid = invalidate(14, &node, &json!({}), &[]);
        assert_eq!(invalid, InvalidValue::Value(json!({"additional_property_0": 1})));
    }

    #[test]
    fn test_union_of_different_types_is_left_entirely() {
        let union = UnionSchema::new(
            SchemaMeta::default(),
            vec![],
            vec![string(None, None), SchemaNode::Integer(IntegerSchema::default())],
            vec![],
        )
        .unwrap();
        let node = SchemaNode::Union(union);
        for seed in 0..20 {
            let invalid = invalidate(seed, &node, &json!(5), &[]).into_value().unwrap();
            assert_eq!(invalid, Value::Null);
            assert!(!is_valid(&node, &invalid));
        }
    }

    #[test]
    fn test_nullable_union_of_different_types_skips_null() {
        let meta = SchemaMeta {
            nullable: true,
            ..SchemaMeta::default()
        };
        let union = UnionSchema::new(
            meta,
            vec![],
            vec![SchemaNode::Integer(IntegerSchema::default())],
            vec![string(None, None)],
        )
        .unwrap();
        let node = SchemaNode::Union(union);
        let invalid = invalidate(15, &node, &json!(5), &[]).into_value().unwrap();
        assert_eq!(invalid, json!(true));
        assert!(!is_valid(&node, &invalid));
    }

    #[test]
    fn test_union_bound_violation_is_kept() {
        let union = UnionSchema::new(
            SchemaMeta::default(),
            vec![],
            vec![
                string(None, Some(3)),
                SchemaNode::Integer(IntegerSchema {
                    maximum: Some(3),
                    ..IntegerSchema::default()
                }),
            ],
            vec![],
        )
        .unwrap();
        let node = SchemaNode::Union(union);
        let invalid = invalidate(16, &node, &json!(1), &[]);
        assert_eq!(invalid, InvalidValue::Value(json!(4)));
    }

    #[test]
    fn test_oversized_integer_candidates_fall_through() {
        let node = SchemaNode::Integer(IntegerSchema {
            const_value: Some(i64::MAX),
            ..IntegerSchema::default()
        });
        let candidates = [ConstraintValue::Value(json!(i64::MAX))];
        let invalid = invalidate(17, &node, &json!(i64::MAX), &candidates)
            .into_value()
            .unwrap();
        assert_ne!(invalid, json!(i64::MAX));
        assert!(!is_valid(&node, &invalid));
    }

    #[test]
    fn test_oversized_number_enum_falls_back_to_type_change() {
        let node = SchemaNode::Number(NumberSchema {
            enum_values: Some(vec![f64::MAX, 1.0]),
            ..NumberSchema::default()
        });
        let invalid = invalidate(18, &node, &json!(1.0), &[]).into_value().unwrap();
        assert!(invalid.is_string());
    }

    #[test]
    fn test_nullable_union_invalidates_non_null_arm() {
        let node = SchemaNode::Union(UnionSchema::nullable(SchemaNode::Integer(IntegerSchema {
            maximum: Some(3),
            ..IntegerSchema::default()
        })));
        let invalid = invalidate(11, &node, &json!(1), &[]);
        assert_eq!(invalid, InvalidValue::Value(json!(4)));
    }
}
