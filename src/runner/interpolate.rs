//! Template evaluation
//!
//! String values in scripts are Jinja templates. A string consisting of a
//! single `{{ expression }}` evaluates to the native value of the expression
//! (a number stays a number, a list stays a list). Any other template renders
//! to a string, and strings without template markers are returned verbatim.

use crate::error::{EvaluationError, EvaluationResult};
use crate::runner::filters;
use crate::runner::scope::Scope;
use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Matches a string that is exactly one `{{ ... }}` expression
static SINGLE_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*\{\{(.*)\}\}\s*$").unwrap());

/// Evaluates templates against a [`Scope`]
///
/// The engine only talks to the template language through this trait, so a
/// different expression language can be plugged in by the caller.
pub trait Evaluator: Send + Sync {
    /// Evaluate a template string.
    ///
    /// Returns `None` when the template is a single expression whose value
    /// is undefined.
    fn try_evaluate(&self, template: &str, scope: &Scope) -> EvaluationResult<Option<Value>>;

    /// Evaluate a template string; an undefined value becomes null
    fn evaluate(&self, template: &str, scope: &Scope) -> EvaluationResult<Value> {
        Ok(self.try_evaluate(template, scope)?.unwrap_or(Value::Null))
    }

    /// Evaluate a bare expression, wrapping it in `{{ }}` when needed
    fn evaluate_inline(&self, expression: &str, scope: &Scope) -> EvaluationResult<Value> {
        let mut template = expression.trim().to_string();
        if !template.starts_with("{{") {
            template.insert_str(0, "{{ ");
        }
        if !template.ends_with("}}") {
            template.push_str(" }}");
        }
        self.evaluate(&template, scope)
    }

    /// Evaluate every string inside lists and objects.
    ///
    /// Object keys are never evaluated.
    fn evaluate_recursive(&self, value: &Value, scope: &Scope) -> EvaluationResult<Value> {
        match value {
            Value::String(template) => self.evaluate(template, scope),
            Value::Array(items) => items
                .iter()
                .map(|item| self.evaluate_recursive(item, scope))
                .collect::<EvaluationResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut result = Map::new();
                for (key, item) in map {
                    result.insert(key.clone(), self.evaluate_recursive(item, scope)?);
                }
                Ok(Value::Object(result))
            }
            other => Ok(other.clone()),
        }
    }

    /// Whether a string contains template markers
    fn is_template(&self, value: &str) -> bool {
        value.contains("{{") || value.contains("{%")
    }
}

/// Default [`Evaluator`] backed by minijinja
#[derive(Debug, Default, Clone, Copy)]
pub struct JinjaEvaluator;

impl JinjaEvaluator {
    pub fn new() -> Self {
        JinjaEvaluator
    }

    /// Environment with the bundled filters, borrowing the template source
    fn environment<'source>(&self) -> Environment<'source> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        filters::register(&mut env);
        env
    }

    fn eval_expression(&self, source: &str, scope: &Scope) -> EvaluationResult<Option<Value>> {
        let env = self.environment();
        let expression = env.compile_expression(source)?;
        let ctx = context_for(expression.undeclared_variables(false), scope)?;
        let value = expression.eval(ctx)?;

        if value.is_undefined() {
            return Ok(None);
        }
        to_data(&value).map(Some)
    }

    fn render(&self, source: &str, scope: &Scope) -> EvaluationResult<Value> {
        let env = self.environment();
        let template = env.template_from_str(source)?;
        let ctx = context_for(template.undeclared_variables(false), scope)?;
        Ok(Value::String(template.render(ctx)?))
    }
}

impl Evaluator for JinjaEvaluator {
    fn try_evaluate(&self, template: &str, scope: &Scope) -> EvaluationResult<Option<Value>> {
        if !self.is_template(template) {
            return Ok(Some(Value::String(template.to_string())));
        }

        if let Some(caps) = SINGLE_EXPRESSION.captures(template) {
            let inner = &caps[1];
            if !["{{", "}}", "{%", "%}", "{#"].iter().any(|marker| inner.contains(marker)) {
                return self.eval_expression(inner, scope);
            }
        }

        self.render(template, scope).map(Some)
    }
}

/// Build a template context holding only the variables the template uses.
///
/// Variables are resolved through the scope so lazy values get evaluated on
/// first use. Missing ones, and lazy ones whose value is undefined, are left
/// out and stay undefined in the template.
fn context_for(names: HashSet<String>, scope: &Scope) -> EvaluationResult<minijinja::Value> {
    let mut vars = Map::new();
    for name in names {
        if let Some(value) = scope.get(&name)? {
            vars.insert(name, value);
        }
    }
    Ok(minijinja::Value::from_serialize(&vars))
}

fn to_data(value: &minijinja::Value) -> EvaluationResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| EvaluationError::Template(format!("cannot convert {} to data: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn scope_with(vars: Value) -> Scope {
        let mut scope = Scope::new(Arc::new(JinjaEvaluator::new()));
        for (key, value) in vars.as_object().cloned().unwrap_or_default() {
            scope.set(key, value);
        }
        scope
    }

    #[test]
    fn test_plain_string_is_verbatim() {
        let scope = scope_with(json!({}));
        assert_eq!(scope.evaluate("just text").unwrap(), json!("just text"));
    }

    #[test]
    fn test_single_expression_keeps_type() {
        let scope = scope_with(json!({"answer": 42, "items": [1, 2]}));
        assert_eq!(scope.evaluate("{{ answer }}").unwrap(), json!(42));
        assert_eq!(scope.evaluate("  {{ items }} ").unwrap(), json!([1, 2]));
        assert_eq!(scope.evaluate("{{ answer + 1 }}").unwrap(), json!(43));
        assert_eq!(scope.evaluate("{{ answer == 42 }}").unwrap(), json!(true));
    }

    #[test]
    fn test_mixed_template_renders_string() {
        let scope = scope_with(json!({"name": "world"}));
        assert_eq!(scope.evaluate("Hello {{ name }}!").unwrap(), json!("Hello world!"));
        assert_eq!(
            scope.evaluate("{{ name }} and {{ name }}").unwrap(),
            json!("world and world")
        );
    }

    #[test]
    fn test_statement_template() {
        let scope = scope_with(json!({"flag": true}));
        assert_eq!(
            scope.evaluate("{% if flag %}on{% else %}off{% endif %}").unwrap(),
            json!("on")
        );
    }

    #[test]
    fn test_undefined_expression() {
        let scope = scope_with(json!({}));
        let evaluator = JinjaEvaluator::new();
        assert_eq!(evaluator.try_evaluate("{{ banana }}", &scope).unwrap(), None);
        assert_eq!(scope.evaluate("{{ banana }}").unwrap(), Value::Null);
        assert_eq!(scope.evaluate("[{{ banana }}]").unwrap(), json!("[]"));
    }

    #[test]
    fn test_undefined_variable_stays_undefined() {
        let scope = scope_with(json!({"alias": "{{ banana }}"}));
        assert_eq!(scope.evaluate("{{ alias is undefined }}").unwrap(), json!(true));
        assert_eq!(
            scope.evaluate_recursive(&json!({"nested": ["{{ banana }}"]})).unwrap(),
            json!({"nested": [null]})
        );
    }

    #[test]
    fn test_undefined_test() {
        let scope = scope_with(json!({}));
        assert_eq!(scope.evaluate("{{ banana is undefined }}").unwrap(), json!(true));
    }

    #[test]
    fn test_syntax_error() {
        let scope = scope_with(json!({}));
        assert!(matches!(
            scope.evaluate("{{ 1 + }}"),
            Err(EvaluationError::Template(_))
        ));
    }

    #[test]
    fn test_inline_wrapping() {
        let scope = scope_with(json!({"answer": 42}));
        let evaluator = JinjaEvaluator::new();
        assert_eq!(evaluator.evaluate_inline("answer", &scope).unwrap(), json!(42));
        assert_eq!(
            evaluator.evaluate_inline("{{ answer > 40 }}", &scope).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_recursive_evaluation() {
        let scope = scope_with(json!({"answer": 42}));
        let value = json!({"list": ["{{ answer }}", 1], "{{ key }}": "x{{ answer }}"});
        assert_eq!(
            scope.evaluate_recursive(&value).unwrap(),
            json!({"list": [42, 1], "{{ key }}": "x42"})
        );
    }

    #[test]
    fn test_lazy_variables_are_resolved() {
        let scope = scope_with(json!({"answer": "{{ base + 2 }}", "base": 40}));
        assert_eq!(scope.evaluate("{{ answer }}").unwrap(), json!(42));
    }
}
