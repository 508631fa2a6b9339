//! Script source and task definition types
//!
//! A script is a list of task definitions, or an object with a `tasks` key
//! holding that list. Each definition is an object with exactly one kind key
//! plus optional control keys.

use crate::error::{DefinitionError, DefinitionResult, ScriptError};
use serde_json::{Map, Value};

/// Top-level control keys understood by every task.
///
/// Task kinds must not use these names.
pub const RESERVED_PARAMS: &[&str] = &["name", "when", "ignore_errors", "register", "loop"];

/// Check whether a name is a reserved control key
pub fn is_reserved(name: &str) -> bool {
    RESERVED_PARAMS.contains(&name)
}

/// Normalize a script source into its list of task definitions
pub fn script_tasks(source: Value) -> Result<Vec<Value>, ScriptError> {
    let mut source = match source {
        Value::Array(tasks) => {
            let mut map = Map::new();
            map.insert("tasks".to_string(), Value::Array(tasks));
            map
        }
        Value::Object(map) => map,
        other => {
            return Err(ScriptError::InvalidScript(format!(
                "A script must be a list of tasks or an object, got {}",
                describe(&other)
            )))
        }
    };

    let tasks = match source.remove("tasks") {
        None | Some(Value::Null) => {
            return Err(ScriptError::InvalidScript(
                "At least one task is required".to_string(),
            ))
        }
        Some(Value::Array(tasks)) if tasks.is_empty() => {
            return Err(ScriptError::InvalidScript(
                "At least one task is required".to_string(),
            ))
        }
        Some(Value::Array(tasks)) => tasks,
        Some(other) => {
            return Err(ScriptError::InvalidScript(format!(
                "Tasks must be a list, got {}",
                describe(&other)
            )))
        }
    };

    if !source.is_empty() {
        let unknown: Vec<&str> = source.keys().map(String::as_str).collect();
        return Err(ScriptError::InvalidScript(format!(
            "Only tasks are currently supported for a script, got {}",
            unknown.join(", ")
        )));
    }

    Ok(tasks)
}

/// Control parameters popped from the top level of a task definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlParams {
    /// Display name (defaults to the kind name)
    pub name: Option<String>,

    /// Guard expressions, all of which must be truthy
    pub when: Vec<String>,

    /// Whether body failures become failed results instead of errors
    pub ignore_errors: bool,

    /// Variable to store the result under
    pub register: Option<String>,

    /// Loop template or literal list
    pub loop_items: Option<Value>,
}

impl ControlParams {
    /// Pop and type-check every control key from the remaining top-level keys.
    ///
    /// Anything left over afterwards is an unknown top-level parameter.
    pub fn extract(task: &str, top_level: &mut Map<String, Value>) -> DefinitionResult<Self> {
        let when = match top_level.remove("when") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(expr)) => vec![expr],
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(expr) => Ok(expr),
                    other => Err(control_type(
                        "when",
                        "a string or a list of strings",
                        task,
                        &other,
                    )),
                })
                .collect::<DefinitionResult<Vec<String>>>()?,
            Some(other) => {
                return Err(control_type("when", "a string or a list of strings", task, &other))
            }
        };

        let ignore_errors = match top_level.remove("ignore_errors") {
            None => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => return Err(control_type("ignore_errors", "a boolean", task, &other)),
        };

        let register = optional_string(top_level.remove("register"), "register", task)?;
        let name = optional_string(top_level.remove("name"), "name", task)?;

        let loop_items = match top_level.remove("loop") {
            None | Some(Value::Null) => None,
            Some(value @ (Value::String(_) | Value::Array(_))) => Some(value),
            Some(other) => return Err(control_type("loop", "a string or a list", task, &other)),
        };

        if !top_level.is_empty() {
            let unknown: Vec<&str> = top_level.keys().map(String::as_str).collect();
            return Err(DefinitionError::UnknownTopLevel {
                task: task.to_string(),
                params: unknown.join(", "),
            });
        }

        Ok(ControlParams {
            name,
            when,
            ignore_errors,
            register,
            loop_items,
        })
    }
}

fn optional_string(
    value: Option<Value>,
    param: &str,
    task: &str,
) -> DefinitionResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(control_type(param, "a string", task, &other)),
    }
}

fn control_type(param: &str, expected: &str, task: &str, got: &Value) -> DefinitionError {
    DefinitionError::ControlType {
        param: param.to_string(),
        expected: expected.to_string(),
        task: task.to_string(),
        got: describe(got),
    }
}

/// Render a value for error messages: strings verbatim, everything else as JSON
pub fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
