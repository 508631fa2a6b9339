//! Integration tests for script parsing and loading

mod common;

use common::{create_test_script, engine_with_spy};
use serde_json::json;
use taskscript::config::{parse_script, parse_script_file};
use taskscript::error::DefinitionError;
use taskscript::{Engine, ScriptError};

#[test]
fn test_load_complete_script() {
    let yaml = r#"
tasks:
  - name: Defaults
    vars:
      env: staging
      replicas: 2

  - name: Announce
    log:
      info: "Deploying to {{ env }}"
      debug: "with {{ replicas }} replicas"

  - name: Deploy steps
    block:
      - test:
          object: "{{ env }}"
          number: "{{ replicas }}"
        register: deployed
      - fail: production needs approval
        when:
          - env == "production"
          - approved is undefined

  - return:
      result:
        env: "{{ env }}"
        ok: "{{ deployed.succeeded }}"
"#;

    let source = parse_script(yaml).unwrap();
    let (engine, _) = engine_with_spy();
    let script = engine.load(source).unwrap();

    let names: Vec<&str> = script.tasks().iter().map(|task| task.name()).collect();
    assert_eq!(names, vec!["Defaults", "Announce", "Deploy steps", "return"]);

    let block = &script.tasks()[2];
    assert_eq!(block.kind_name(), "block");
    assert_eq!(block.children().len(), 2);
    assert_eq!(block.children()[1].when().len(), 2);

    let log = &script.tasks()[1];
    let params: Vec<&str> = log.params().names().collect();
    assert_eq!(params, vec!["info", "debug"]);

    let mut scope = engine.new_scope();
    assert_eq!(
        script.run(&mut scope).unwrap(),
        json!({"env": "staging", "ok": true})
    );
}

#[test]
fn test_parse_script_file() {
    let (_dir, path) = create_test_script(
        "script.yml",
        r#"
- vars:
    a: 1
- return: "{{ a }}"
"#,
    );

    let source = parse_script_file(&path).unwrap();
    assert_eq!(Engine::new().execute(source, None).unwrap(), json!(1));
}

#[test]
fn test_parse_json_script_file() {
    let (_dir, path) = create_test_script(
        "script.json",
        r#"{"tasks": [{"return": {"result": [1, 2, 3]}}]}"#,
    );

    let source = parse_script_file(&path).unwrap();
    assert_eq!(Engine::new().execute(source, None).unwrap(), json!([1, 2, 3]));
}

#[test]
fn test_parse_invalid_yaml() {
    let result = parse_script("tasks:\n  - log: [unclosed\n");
    assert!(matches!(result, Err(ScriptError::Yaml(_))));
}

#[test]
fn test_script_without_tasks() {
    let source = parse_script("name: nothing here\n").unwrap();
    let err = Engine::new().load(source).unwrap_err();
    assert!(matches!(err, ScriptError::InvalidScript(_)));
}

#[test]
fn test_scalar_script() {
    let source = parse_script("just a string").unwrap();
    let err = Engine::new().load(source).unwrap_err();
    assert!(matches!(err, ScriptError::InvalidScript(_)));
}

#[test]
fn test_unknown_top_level_task_key() {
    let source = parse_script("- log:\n    info: hi\n  retries: 3\n").unwrap();
    let err = Engine::new().load(source).unwrap_err();
    assert!(matches!(
        err,
        ScriptError::InvalidTask(DefinitionError::UnknownTopLevel { .. })
    ));
}

#[test]
fn test_wrong_control_key_type() {
    let source = parse_script("- log:\n    info: hi\n  ignore_errors: sometimes\n").unwrap();
    let err = Engine::new().load(source).unwrap_err();
    assert!(err.to_string().contains("ignore_errors"));
}

#[test]
fn test_non_string_parameter_keys() {
    let result = parse_script("- vars:\n    1: one\n");
    assert!(matches!(result, Err(ScriptError::InvalidScript(_))));
}

#[test]
fn test_error_in_nested_block_definition() {
    let source = parse_script(
        r#"
- block:
    - log:
        info: fine
    - block:
        - fail: {}
"#,
    )
    .unwrap();
    let err = Engine::new().load(source).unwrap_err();
    assert!(err.to_string().contains("msg"));
}
