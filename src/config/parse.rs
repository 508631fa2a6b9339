//! Script file parsing
//!
//! Scripts are written in YAML (which also accepts JSON) and converted into
//! `serde_json` values, the data model used everywhere in the engine.

use crate::error::{Result, ScriptError};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Parse a script source from a string
pub fn parse_script(text: &str) -> Result<Value> {
    let document: serde_yaml::Value = serde_yaml::from_str(text)?;
    yaml_to_json(document)
}

/// Parse a script source from a file
///
/// Files with a `.json` extension are read with the JSON parser, anything else
/// with the YAML parser.
pub fn parse_script_file(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path)?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        _ => parse_script(&contents),
    }
}

/// Convert a YAML document into a JSON value.
///
/// Mapping keys must be strings; tags are dropped.
pub fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(key) => key,
                    other => {
                        return Err(ScriptError::InvalidScript(format!(
                            "Mapping keys must be strings, got {}",
                            describe_key(&other)
                        )))
                    }
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn describe_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Sequence(_) => "a list".to_string(),
        serde_yaml::Value::Mapping(_) => "an object".to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Tagged(tagged) => describe_key(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_yaml_script() {
        let yaml = r#"
tasks:
  - name: greet
    log:
      info: "Hello {{ who }}"
  - return: 42
"#;
        let source = parse_script(yaml).unwrap();
        assert_eq!(
            source,
            json!({
                "tasks": [
                    {"name": "greet", "log": {"info": "Hello {{ who }}"}},
                    {"return": 42}
                ]
            })
        );
    }

    #[test]
    fn test_parse_json_script() {
        let source = parse_script(r#"[{"vars": {"a": 1.5, "b": null}}]"#).unwrap();
        assert_eq!(source, json!([{"vars": {"a": 1.5, "b": null}}]));
    }

    #[test]
    fn test_key_order_is_preserved() {
        let source = parse_script("vars:\n  z: 1\n  a: 2\n  m: 3\n").unwrap();
        let keys: Vec<&str> = source["vars"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_non_string_keys_are_rejected() {
        let result = parse_script("- vars:\n    42: answer\n");
        assert!(matches!(result, Err(ScriptError::InvalidScript(msg)) if msg.contains("42")));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(parse_script("tasks: [unclosed"), Err(ScriptError::Yaml(_))));
    }

    #[test]
    fn test_parse_script_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "- return: done").unwrap();

        let source = parse_script_file(file.path()).unwrap();
        assert_eq!(source, json!([{"return": "done"}]));
    }

    #[test]
    fn test_parse_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"tasks": [{{"return": 1}}]}}"#).unwrap();

        let source = parse_script_file(file.path()).unwrap();
        assert_eq!(source, json!({"tasks": [{"return": 1}]}));
    }

    #[test]
    fn test_missing_file() {
        let result = parse_script_file(Path::new("/nonexistent/script.yml"));
        assert!(matches!(result, Err(ScriptError::Io(_))));
    }
}
