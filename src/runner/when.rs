//! When condition evaluation
//!
//! Guards are expressions evaluated against the scope; a task runs only when
//! every one of them is truthy.

use crate::error::EvaluationResult;
use crate::runner::Scope;
use serde_json::Value;

/// Evaluate a list of when conditions (all must be true - AND logic)
pub fn evaluate_when_list(when_list: &[String], scope: &Scope) -> EvaluationResult<bool> {
    for when in when_list {
        if !evaluate_when(when, scope)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a single when condition
pub fn evaluate_when(when: &str, scope: &Scope) -> EvaluationResult<bool> {
    let value = scope.evaluator().evaluate_inline(when, scope)?;
    Ok(is_truthy(&value))
}

/// Truthiness of a data value.
///
/// Null, false, zero, and empty strings, lists and objects are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
