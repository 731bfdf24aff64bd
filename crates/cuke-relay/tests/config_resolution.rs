//! Configuration files and environment overrides resolved into what a run
//! uses: outputs, step-definition patterns and the specs worth running.

use std::fs;
use std::path::{Path, PathBuf};

use cuke_relay::config::{resolve, ConfigError, Configuration, RuntimeContext, TestingType};
use cuke_relay::messages::{Pickle, PickleTag};
use cuke_relay::paths::step_definition_patterns;
use cuke_relay::reconciler::{ReconcilerSettings, Spec};
use cuke_relay::specs::{filter_specs, SpecCandidate};
use serde_json::{json, Map, Value};

fn runtime(testing_type: TestingType) -> RuntimeContext {
    RuntimeContext {
        testing_type,
        project_root: PathBuf::from("/project"),
        implicit_integration_folder: PathBuf::from("/project/tests/features"),
    }
}

fn environment(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("environment fixture must be an object, got {other}"),
    }
}

fn resolve_yaml(
    yaml: &str,
    env: Value,
    testing_type: TestingType,
) -> Result<Configuration, ConfigError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".cuke-relay.yaml");
    fs::write(&path, yaml).unwrap();
    resolve(Some(&path), &environment(env), &runtime(testing_type))
}

const CONFIG: &str = r#"
stepDefinitions: "tests/features/[filepart]/steps.rs"
messages:
  enabled: true
  output: reports/messages.ndjson
filterSpecs: true
e2e:
  omitFiltered: true
component:
  messages:
    output: reports/component.ndjson
"#;

#[test]
fn test_file_sections_and_environment_combine() {
    let configuration = resolve_yaml(
        CONFIG,
        json!({ "tags": "@smoke", "stateSoftErrors": "true", "jsonEnabled": "" }),
        TestingType::E2e,
    )
    .unwrap();

    assert_eq!(configuration.step_definitions, vec!["tests/features/[filepart]/steps.rs"]);
    assert!(configuration.messages.enabled);
    assert_eq!(configuration.messages.output, "reports/messages.ndjson");
    assert!(configuration.omit_filtered);
    assert!(configuration.state.soft_errors);
    assert!(!configuration.json.enabled);
    assert_eq!(configuration.tags.as_deref(), Some("@smoke"));

    let component = resolve_yaml(CONFIG, json!({}), TestingType::Component).unwrap();
    assert_eq!(component.messages.output, "reports/component.ndjson");
    assert!(!component.omit_filtered);
}

#[test]
fn test_resolved_configuration_drives_the_reconciler() {
    let configuration = resolve_yaml(CONFIG, json!({}), TestingType::E2e).unwrap();

    let settings = ReconcilerSettings::from_configuration(&configuration, true, "/project");
    assert!(settings.tracking);
    assert_eq!(settings.messages_output, Some(PathBuf::from("reports/messages.ndjson")));

    let interactive = ReconcilerSettings::from_configuration(&configuration, false, "/project");
    assert!(!interactive.tracking);
}

#[test]
fn test_filepart_patterns_from_a_file() {
    let configuration = resolve_yaml(CONFIG, json!({}), TestingType::E2e).unwrap();
    let patterns = step_definition_patterns(
        &configuration,
        Path::new("/project/tests/features/checkout/payment.feature"),
    )
    .unwrap();

    assert_eq!(
        patterns,
        vec![
            "tests/features/checkout/payment/steps.rs",
            "tests/features/checkout/steps.rs",
            "tests/features/steps.rs",
        ]
    );
}

#[test]
fn test_specs_filtered_by_environment_tags() {
    let configuration = resolve_yaml(
        CONFIG,
        json!({ "tags": "@smoke and not @wip", "filterSpecsMixedMode": "show" }),
        TestingType::E2e,
    )
    .unwrap();

    let pickle = |tags: &[&str]| Pickle {
        tags: tags
            .iter()
            .map(|name| PickleTag {
                name: name.to_string(),
                ast_node_id: String::new(),
            })
            .collect(),
        ..Default::default()
    };
    let smoke = Spec::new("tests/features/smoke.feature", "/project/tests/features/smoke.feature");
    let wip = Spec::new("tests/features/wip.feature", "/project/tests/features/wip.feature");
    let plain = Spec::new("tests/e2e/plain.rs", "/project/tests/e2e/plain.rs");
    let smoke_pickles = vec![pickle(&["@smoke"])];
    let wip_pickles = vec![pickle(&["@smoke", "@wip"])];

    let kept = filter_specs(
        &[
            SpecCandidate {
                spec: &smoke,
                pickles: &smoke_pickles,
            },
            SpecCandidate {
                spec: &wip,
                pickles: &wip_pickles,
            },
            SpecCandidate {
                spec: &plain,
                pickles: &[],
            },
        ],
        &configuration,
    )
    .unwrap();

    let kept: Vec<&str> = kept.iter().map(|spec| spec.relative.as_str()).collect();
    assert_eq!(kept, vec!["tests/features/smoke.feature", "tests/e2e/plain.rs"]);
}

#[test]
fn test_invalid_file_is_drawn() {
    let yaml = "messages:\n  enabled: \"yes\"\n";
    let err = resolve_yaml(yaml, json!({}), TestingType::E2e).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert_eq!(
        err.to_string(),
        "optional property \"messages\"\n└─ optional property \"enabled\"\n   └─ cannot decode \"yes\", should be boolean"
    );
}

#[test]
fn test_unparsable_file_names_the_path() {
    let err = resolve_yaml("messages: [\n", json!({}), TestingType::E2e).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml { .. }));
    assert!(err.to_string().contains(".cuke-relay.yaml"));
}
