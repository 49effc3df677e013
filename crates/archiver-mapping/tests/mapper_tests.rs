use archiver_mapping::{FunctionRegistry, JsonMapper, MappingError, MappingFn, MappingResult};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn anchor_on_array_maps_each_element_in_order() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({"$on": "contacts", "name": ["full_name"]});
    let source = json!({"contacts": [{"full_name": "A"}, {"full_name": "B"}]});

    let out = mapper.map_json(&source, &spec).unwrap();
    assert_eq!(out, json!([{"name": "A"}, {"name": "B"}]));
}

#[test]
fn anchor_on_object_maps_once() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({"$on": "project.core", "title": ["project_title"]});
    let source = json!({"project": {"core": {"project_title": "Atlas"}}});

    assert_eq!(mapper.map_json(&source, &spec).unwrap(), json!({"title": "Atlas"}));
}

#[test]
fn anchor_on_scalar_is_invalid_node() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({"$on": "name", "x": ["y"]});

    let err = mapper.map_json(&json!({"name": "scalar"}), &spec).unwrap_err();
    assert!(matches!(err, MappingError::InvalidNode { .. }));
}

#[test]
fn anchor_on_missing_path_is_invalid_node() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({"$on": "nowhere.at.all", "x": ["y"]});

    let err = mapper.map_json(&json!({"name": "scalar"}), &spec).unwrap_err();
    assert!(matches!(err, MappingError::InvalidNode { ref path, .. } if path == "nowhere.at.all"));
}

#[test]
fn nested_anchor_on_missing_path_is_invalid_node() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({"title": ["t"], "people": {"$on": "contributors", "n": ["name"]}});

    let err = mapper.map_json(&json!({"t": "x"}), &spec).unwrap_err();
    assert!(matches!(err, MappingError::InvalidNode { .. }));
}

#[test]
fn non_mapping_specification_is_unreadable() {
    let mapper = JsonMapper::with_defaults();
    let err = mapper.map_json(&json!({}), &json!([["a"]])).unwrap_err();
    assert!(matches!(err, MappingError::UnreadableSpecification(_)));
}

#[test]
fn filter_drops_array_elements_before_mapping() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({
        "$on": "contributors",
        "$filter": ["corresponding_contributor", "equals", true],
        "email": ["email"]
    });
    let source = json!({"contributors": [
        {"email": "a@x", "corresponding_contributor": true},
        {"email": "b@x", "corresponding_contributor": false},
        {"email": "c@x"}
    ]});

    assert_eq!(mapper.map_json(&source, &spec).unwrap(), json!([{"email": "a@x"}]));
}

#[test]
fn filter_with_pattern_keeps_matching_elements() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({
        "$on": "samples",
        "$filter": ["accession", "matches", "^SAM(EA|N)"],
        "id": ["accession"]
    });
    let source = json!({"samples": [
        {"accession": "SAMEA1"},
        {"accession": "ERS2"},
        {"accession": "SAMN3"},
        {}
    ]});

    assert_eq!(
        mapper.map_json(&source, &spec).unwrap(),
        json!([{"id": "SAMEA1"}, {"id": "SAMN3"}])
    );
}

#[test]
fn bad_pattern_fails_when_compiled() {
    let mapper = JsonMapper::with_defaults();
    let err = mapper
        .compile(&json!({"ok": ["accession", "matches", "SAM("]}))
        .unwrap_err();
    assert!(matches!(err, MappingError::UnreadableSpecification(_)));
    assert!(err.is_specification_defect());
}

#[test]
fn binder_runs_once_per_compile() {
    let binds = Arc::new(AtomicUsize::new(0));
    let mut registry = FunctionRegistry::with_defaults();
    let counter = Arc::clone(&binds);
    registry.register("suffix", |value, args| {
        Ok(value.and_then(Value::as_str).map(|s| json!(format!("{s}{}", args[0].as_str().unwrap_or_default()))))
    });
    registry.register_binder("suffix", move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let suffix = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
        let bound: MappingFn = Arc::new(move |value: Option<&Value>, _args: &[Value]| -> MappingResult<Option<Value>> {
            Ok(value.and_then(Value::as_str).map(|s| json!(format!("{s}{suffix}"))))
        });
        Ok(bound)
    });
    let mapper = JsonMapper::new(Arc::new(registry));
    let spec = mapper
        .compile(&json!({"$on": "items", "name": ["name", "suffix", "_x"]}))
        .unwrap();

    let source = json!({"items": [{"name": "a"}, {"name": "b"}, {"name": "c"}]});
    let out = mapper.map(&source, &spec).unwrap();
    mapper.map(&source, &spec).unwrap();

    assert_eq!(out, json!([{"name": "a_x"}, {"name": "b_x"}, {"name": "c_x"}]));
    assert_eq!(binds.load(Ordering::SeqCst), 1);
}

#[test]
fn nested_anchor_inside_object_spec() {
    let mapper = JsonMapper::with_defaults();
    let spec = json!({
        "title": ["content.project_core.project_title"],
        "authors": {
            "$on": "content.contributors",
            "name": ["name"],
            "attributes.affiliation": ["institution", "to_attribute"]
        }
    });
    let source = json!({"content": {
        "project_core": {"project_title": "Atlas"},
        "contributors": [{"name": "A", "institution": "EBI"}, {"name": "B"}]
    }});

    assert_eq!(
        mapper.map_json(&source, &spec).unwrap(),
        json!({
            "title": "Atlas",
            "authors": [
                {"name": "A", "attributes": {"affiliation": [{"value": "EBI"}]}},
                {"name": "B"}
            ]
        })
    );
}

#[test]
fn compiled_spec_is_reusable() {
    let mapper = JsonMapper::with_defaults();
    let spec = mapper.compile(&json!({"id": ["uuid.uuid"]})).unwrap();

    for uuid in ["a", "b", "c"] {
        let out = mapper.map(&json!({"uuid": {"uuid": uuid}}), &spec).unwrap();
        assert_eq!(out, json!({"id": uuid}));
    }
}

#[test]
fn custom_registry_functions() {
    let mut registry = FunctionRegistry::with_defaults();
    registry.register("double", |value, _| {
        Ok(value.and_then(Value::as_i64).map(|n| json!(n * 2)))
    });
    let mapper = JsonMapper::new(Arc::new(registry));

    let out = mapper.map_json(&json!({"n": 21}), &json!({"n": ["n", "double"]})).unwrap();
    assert_eq!(out, json!({"n": 42}));
}

proptest! {
    #[test]
    fn prop_copy_spec_preserves_present_values(name in "[a-zA-Z ]{0,16}") {
        let mapper = JsonMapper::with_defaults();
        let spec = json!({"greeting": ["user.name"]});

        let out = mapper.map_json(&json!({"user": {"name": name.clone()}}), &spec).unwrap();
        prop_assert_eq!(out, json!({"greeting": name}));
    }

    #[test]
    fn prop_array_anchor_preserves_length_and_order(names in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
        let mapper = JsonMapper::with_defaults();
        let spec = json!({"$on": "items", "n": ["name"]});
        let items: Vec<Value> = names.iter().map(|n| json!({"name": n})).collect();

        let out = mapper.map_json(&json!({"items": items}), &spec).unwrap();
        let mapped: Vec<String> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["n"].as_str().unwrap().to_string())
            .collect();
        prop_assert_eq!(mapped, names);
    }
}
