//! Variable scope for script execution
//!
//! A scope maps variable names to values. Values supplied by the caller are
//! stored lazily: templates inside them are evaluated each time the variable
//! is read, against the scope doing the reading. Values produced by the engine
//! itself (registered results, loop items, `vars` assignments) are stored
//! already resolved.

use crate::error::{EvaluationError, EvaluationResult};
use crate::runner::interpolate::Evaluator;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum nesting of variables referring to other variables
const MAX_DEPTH: usize = 32;

/// How a variable is stored
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Evaluated on every read
    Lazy(Value),

    /// Returned as is
    Resolved(Value),
}

impl Binding {
    /// The stored value, without evaluation
    pub fn raw(&self) -> &Value {
        match self {
            Binding::Lazy(value) | Binding::Resolved(value) => value,
        }
    }
}

/// Variables visible to a running script
pub struct Scope {
    evaluator: Arc<dyn Evaluator>,
    vars: HashMap<String, Binding>,
    depth: Cell<usize>,
}

impl Scope {
    /// Create an empty scope bound to an evaluator
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Scope {
            evaluator,
            vars: HashMap::new(),
            depth: Cell::new(0),
        }
    }

    /// Add lazily evaluated variables
    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        for (key, value) in vars {
            self.set(key, value);
        }
        self
    }

    /// The evaluator used for templates in this scope
    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    /// Read a variable, evaluating it if it is lazy.
    ///
    /// Returns `Ok(None)` when the variable does not exist, or when it is a
    /// lazy expression whose value is undefined.
    pub fn get(&self, key: &str) -> EvaluationResult<Option<Value>> {
        match self.vars.get(key) {
            None => Ok(None),
            Some(Binding::Resolved(value)) => Ok(Some(value.clone())),
            Some(Binding::Lazy(Value::String(template))) => {
                let _guard = self.enter(key)?;
                self.evaluator.try_evaluate(template, self)
            }
            Some(Binding::Lazy(value)) => {
                let _guard = self.enter(key)?;
                self.evaluator.evaluate_recursive(value, self).map(Some)
            }
        }
    }

    /// Read a variable without evaluating it
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.vars.get(key).map(Binding::raw)
    }

    /// Read how a variable is stored
    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.vars.get(key)
    }

    /// Store a value that is evaluated on every read
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), Binding::Lazy(value));
    }

    /// Store a value that is returned as is
    pub fn set_resolved(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), Binding::Resolved(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key).map(|binding| match binding {
            Binding::Lazy(value) | Binding::Resolved(value) => value,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Variable names, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Shallow copy sharing the evaluator.
    ///
    /// Writes to the copy are not visible in the original.
    pub fn copy(&self) -> Scope {
        Scope {
            evaluator: Arc::clone(&self.evaluator),
            vars: self.vars.clone(),
            depth: Cell::new(0),
        }
    }

    /// Fully evaluated copy of every variable
    pub fn snapshot(&self) -> EvaluationResult<Map<String, Value>> {
        let mut result = Map::new();
        for key in self.keys() {
            if let Some(value) = self.get(key)? {
                result.insert(key.to_string(), value);
            }
        }
        Ok(result)
    }

    /// Evaluate a template against this scope
    pub fn evaluate(&self, template: &str) -> EvaluationResult<Value> {
        self.evaluator.evaluate(template, self)
    }

    /// Evaluate a template; `None` when its value is undefined
    pub fn try_evaluate(&self, template: &str) -> EvaluationResult<Option<Value>> {
        self.evaluator.try_evaluate(template, self)
    }

    /// Evaluate every string inside a value against this scope
    pub fn evaluate_recursive(&self, value: &Value) -> EvaluationResult<Value> {
        self.evaluator.evaluate_recursive(value, self)
    }

    fn enter(&self, key: &str) -> EvaluationResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(EvaluationError::RecursionLimit(key.to_string()));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("vars", &self.vars).finish_non_exhaustive()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}
