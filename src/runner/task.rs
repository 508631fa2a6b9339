//! Task execution types and logic
//!
//! This module contains the runtime representation of tasks: their
//! parameters, the control-flow signals they raise and the loop, guard and
//! error handling shared by every task kind.

use crate::config::{describe, ControlParams, KindSpec, ParamType};
use crate::error::{
    DefinitionError, DefinitionResult, EvaluationError, EvaluationResult, ExecutionError, TaskError,
};
use crate::runner::{evaluate_when_list, Engine, Kind, Scope};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one task run, or of one loop iteration.
///
/// Serializes as the output keys followed by the status fields, which win
/// over output keys of the same name.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Outcome {
    /// Data returned by the task body
    #[serde(flatten)]
    pub output: Map<String, Value>,

    pub succeeded: bool,
    pub failed: bool,

    /// Failure description, when the failure was ignored
    pub failure: Option<String>,

    /// Whether the guard prevented the body from running
    pub skipped: bool,
}

impl Outcome {
    /// A successful run with the given output
    pub fn success(output: Map<String, Value>) -> Self {
        Outcome {
            succeeded: true,
            output,
            ..Default::default()
        }
    }

    /// An ignored failure
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome {
            failed: true,
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// A run stopped by the guard
    pub fn skipped() -> Self {
        Outcome {
            succeeded: true,
            skipped: true,
            ..Default::default()
        }
    }

    /// Data form stored by `register`: the output keys plus the status fields
    pub fn to_value(&self) -> Value {
        // Plain maps and scalars always serialize
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parameters of a task.
///
/// Raw values keep their definition order and are evaluated on every read.
/// Values cast during validation are stored resolved and returned as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    task: String,
    raw: Map<String, Value>,
    resolved: HashMap<String, Value>,
}

impl Params {
    pub fn new(task: impl Into<String>, raw: Map<String, Value>) -> Self {
        Params {
            task: task.into(),
            raw,
            resolved: HashMap::new(),
        }
    }

    /// Name of the task owning these parameters
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    /// Parameter names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The value as written in the definition
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// Read a parameter, evaluating templates against the scope
    pub fn get(&self, name: &str, scope: &Scope) -> EvaluationResult<Option<Value>> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(Some(value.clone()));
        }
        match self.raw.get(name) {
            Some(value) => scope.evaluate_recursive(value).map(Some),
            None => Ok(None),
        }
    }

    /// Read a parameter that must be present
    pub fn require(&self, name: &str, scope: &Scope) -> Result<Value, TaskError> {
        self.get(name, scope)?.ok_or_else(|| {
            TaskError::Definition(DefinitionError::MissingParams {
                task: self.task.clone(),
                params: name.to_string(),
            })
        })
    }

    /// Store an evaluated value for a parameter
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !self.raw.contains_key(&name) {
            self.raw.insert(name.clone(), Value::Null);
        }
        self.resolved.insert(name, value);
    }

    /// Evaluate every parameter, in definition order
    pub fn resolve_all(&self, scope: &Scope) -> EvaluationResult<Map<String, Value>> {
        let mut result = Map::new();
        for name in self.names() {
            if let Some(value) = self.get(name, scope)? {
                result.insert(name.to_string(), value);
            }
        }
        Ok(result)
    }

    /// Evaluate and cast every declared, typed parameter that is present
    pub fn cast_declared(&mut self, spec: &KindSpec, scope: &Scope) -> Result<(), TaskError> {
        for (name, ty) in spec.declared() {
            if ty == ParamType::Any || !self.contains(name) {
                continue;
            }
            let value = match (self.resolved.get(name), self.raw.get(name)) {
                (Some(value), _) => Some(value.clone()),
                (None, Some(Value::String(template))) => scope.try_evaluate(template)?,
                (None, Some(other)) => Some(scope.evaluate_recursive(other)?),
                (None, None) => Some(Value::Null),
            };
            // An undefined value renders as an empty string
            let value = match (value, ty) {
                (None, ParamType::String) => Value::String(String::new()),
                (value, _) => value.unwrap_or(Value::Null),
            };
            let value = ty.cast(value).map_err(|reason| DefinitionError::InvalidValue {
                task: self.task.clone(),
                param: name.to_string(),
                reason,
            })?;
            self.set(name, value);
        }
        Ok(())
    }
}

/// Ways a task body can stop early
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// End the whole script with a value; `None` when the value is undefined
    Finish(Option<Value>),

    /// The body failed
    Error(TaskError),
}

impl From<TaskError> for Interrupt {
    fn from(err: TaskError) -> Self {
        Interrupt::Error(err)
    }
}

impl From<EvaluationError> for Interrupt {
    fn from(err: EvaluationError) -> Self {
        Interrupt::Error(err.into())
    }
}

impl From<DefinitionError> for Interrupt {
    fn from(err: DefinitionError) -> Self {
        Interrupt::Error(err.into())
    }
}

impl From<ExecutionError> for Interrupt {
    fn from(err: ExecutionError) -> Self {
        Interrupt::Error(err.into())
    }
}

impl From<Signal> for Interrupt {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Finish(value) => Interrupt::Finish(value),
            Signal::Failed(err) => Interrupt::Error(TaskError::Execution(err)),
        }
    }
}

/// Ways a task stops the script
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The script finished with a value; `None` when the value is undefined
    Finish(Option<Value>),

    /// The script failed
    Failed(ExecutionError),
}

/// Runtime task representation
#[derive(Clone)]
pub struct Task {
    name: String,
    kind_name: String,
    kind: Arc<dyn Kind>,
    params: Params,
    children: Vec<Task>,
    when: Vec<String>,
    ignore_errors: bool,
    register: Option<String>,
    loop_items: Option<Value>,
}

impl Task {
    /// Create a task from a definition whose kind key has been identified
    pub(crate) fn from_definition(
        kind_name: &str,
        kind: Arc<dyn Kind>,
        definition: &Map<String, Value>,
        engine: &Engine,
    ) -> DefinitionResult<Self> {
        let payload = definition.get(kind_name).cloned().unwrap_or(Value::Null);
        let mut top_level: Map<String, Value> = definition
            .iter()
            .filter(|(key, _)| key.as_str() != kind_name)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let control = ControlParams::extract(kind_name, &mut top_level)?;
        let name = control.name.unwrap_or_else(|| kind_name.to_string());

        let spec = kind.spec();
        let params = spec.normalize(&name, payload)?;
        let evaluator = engine.evaluator();
        let is_template = |value: &Value| match value {
            Value::String(s) => evaluator.is_template(s),
            _ => false,
        };
        let mut params = spec.validate(&name, params, &is_template)?;

        let children = match spec.subtasks {
            Some(param) => match params.remove(param) {
                Some(Value::Array(definitions)) => definitions
                    .iter()
                    .map(|definition| engine.load_task(definition))
                    .collect::<DefinitionResult<Vec<_>>>()?,
                other => {
                    return Err(DefinitionError::InvalidValue {
                        task: name,
                        param: param.to_string(),
                        reason: format!(
                            "expected a list of tasks, got {}",
                            other.as_ref().map(describe).unwrap_or_else(|| "nothing".to_string())
                        ),
                    })
                }
            },
            None => Vec::new(),
        };

        Ok(Task {
            params: Params::new(name.clone(), params),
            name,
            kind_name: kind_name.to_string(),
            kind,
            children,
            when: control.when,
            ignore_errors: control.ignore_errors,
            register: control.register,
            loop_items: control.loop_items,
        })
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the kind key that selected this task's behavior
    pub fn kind_name(&self) -> &str {
        &self.kind_name
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Nested tasks, for container kinds
    pub fn children(&self) -> &[Task] {
        &self.children
    }

    pub fn when(&self) -> &[String] {
        &self.when
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    pub fn register(&self) -> Option<&str> {
        self.register.as_deref()
    }

    pub fn loop_items(&self) -> Option<&Value> {
        self.loop_items.as_ref()
    }

    /// Execute the task in the given scope.
    ///
    /// Returns one outcome per iteration; a task without a loop yields
    /// exactly one. The registered variable, if any, is written to `scope`.
    pub fn execute(&self, scope: &mut Scope) -> Result<Vec<Outcome>, Signal> {
        debug!(task = %self.name, "Running task");

        let outcomes = match &self.loop_items {
            None => {
                let outcome = self.run_once(scope)?;
                if let Some(register) = &self.register {
                    scope.set_resolved(register.clone(), outcome.to_value());
                }
                vec![outcome]
            }
            Some(items) => {
                let items = self.loop_values(items, scope)?;
                let mut outcomes = Vec::with_capacity(items.len());
                for item in items {
                    debug!(task = %self.name, %item, "Loop iteration");
                    let mut iteration = scope.copy();
                    iteration.set_resolved("item", item);
                    outcomes.push(self.run_once(&mut iteration)?);
                }
                if let Some(register) = &self.register {
                    let results: Vec<Value> = outcomes.iter().map(Outcome::to_value).collect();
                    scope.set_resolved(register.clone(), json!({ "results": results }));
                }
                outcomes
            }
        };

        Ok(outcomes)
    }

    fn loop_values(&self, items: &Value, scope: &Scope) -> Result<Vec<Value>, Signal> {
        let loop_error = |reason: String| {
            Signal::Failed(ExecutionError::Loop {
                task: self.name.clone(),
                reason,
            })
        };

        match scope.evaluate_recursive(items) {
            Ok(Value::Array(values)) => Ok(values),
            Ok(other) => Err(loop_error(format!("expected a list, got {}", describe(&other)))),
            Err(err) => Err(loop_error(err.to_string())),
        }
    }

    fn run_once(&self, scope: &mut Scope) -> Result<Outcome, Signal> {
        let passed = evaluate_when_list(&self.when, scope).map_err(|source| {
            Signal::Failed(ExecutionError::Condition {
                task: self.name.clone(),
                source,
            })
        })?;
        if !passed {
            debug!(task = %self.name, "Skipping task, condition is false");
            return Ok(Outcome::skipped());
        }

        let mut params = self.params.clone();
        let result = self
            .kind
            .validate(&mut params, scope)
            .map_err(Interrupt::from)
            .and_then(|()| self.kind.execute(self, &params, scope));

        match result {
            Ok(None) | Ok(Some(Value::Null)) => Ok(Outcome::success(Map::new())),
            Ok(Some(Value::Object(output))) => Ok(Outcome::success(output)),
            Ok(Some(other)) => Err(Signal::Failed(ExecutionError::InvalidOutput {
                task: self.name.clone(),
                got: describe(&other),
            })),
            Err(Interrupt::Finish(value)) => Err(Signal::Finish(value)),
            Err(Interrupt::Error(err)) if self.ignore_errors => {
                warn!(task = %self.name, "Ignoring failure: {}", err);
                Ok(Outcome::failure(format!("{}: {}", err.class(), err)))
            }
            Err(Interrupt::Error(err)) => Err(Signal::Failed(err.into_execution(&self.name))),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind_name)
            .field("params", &self.params)
            .field("children", &self.children)
            .field("when", &self.when)
            .field("ignore_errors", &self.ignore_errors)
            .field("register", &self.register)
            .field("loop", &self.loop_items)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the `object` parameter of every call
    #[derive(Default, Clone)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Value>>>,
    }

    impl Kind for Recorder {
        fn spec(&self) -> KindSpec {
            KindSpec {
                required: &[("object", ParamType::Any)],
                optional: &[("number", ParamType::Integer)],
                ..KindSpec::DEFAULT
            }
        }

        fn execute(
            &self,
            _task: &Task,
            params: &Params,
            scope: &mut Scope,
        ) -> Result<Option<Value>, Interrupt> {
            let object = params.require("object", scope)?;
            self.calls.lock().unwrap().push(object.clone());
            if object == json!("boom") {
                return Err(TaskError::Failed("boom".to_string()).into());
            }
            if object == json!("scalar") {
                return Ok(Some(json!(42)));
            }
            Ok(Some(json!({ "echo": object })))
        }
    }

    fn setup() -> (Engine, Recorder) {
        let recorder = Recorder::default();
        let engine = Engine::builder().kind("record", recorder.clone()).build().unwrap();
        (engine, recorder)
    }

    fn load(engine: &Engine, definition: Value) -> Task {
        engine.load_task(&definition).unwrap()
    }

    #[test]
    fn test_outcome_value_shape() {
        let mut output = Map::new();
        output.insert("succeeded".to_string(), json!("overridden"));
        output.insert("data".to_string(), json!(1));

        assert_eq!(
            Outcome::success(output).to_value(),
            json!({
                "succeeded": true,
                "data": 1,
                "failed": false,
                "failure": null,
                "skipped": false
            })
        );
    }

    #[test]
    fn test_register_stores_outcome() {
        let (engine, recorder) = setup();
        let task = load(&engine, json!({"record": {"object": "{{ answer }}"}, "register": "out"}));
        let mut scope = engine.new_scope();
        scope.set("answer", json!(42));

        task.execute(&mut scope).unwrap();

        assert_eq!(*recorder.calls.lock().unwrap(), vec![json!(42)]);
        let registered = scope.get("out").unwrap().unwrap();
        assert_eq!(registered["echo"], json!(42));
        assert_eq!(registered["succeeded"], json!(true));
    }

    #[test]
    fn test_false_guard_skips() {
        let (engine, recorder) = setup();
        let task = load(
            &engine,
            json!({"record": {"object": 1}, "when": "answer == 0", "register": "out"}),
        );
        let mut scope = engine.new_scope();
        scope.set("answer", json!(42));

        let outcomes = task.execute(&mut scope).unwrap();

        assert_eq!(outcomes, vec![Outcome::skipped()]);
        assert!(recorder.calls.lock().unwrap().is_empty());
        assert_eq!(scope.get("out").unwrap().unwrap()["skipped"], json!(true));
    }

    #[test]
    fn test_guard_failure_is_fatal() {
        let (engine, _) = setup();
        let task = load(
            &engine,
            json!({"record": {"object": 1}, "when": "{{ 1 + }}", "ignore_errors": true}),
        );
        let mut scope = engine.new_scope();

        let err = task.execute(&mut scope).unwrap_err();
        assert!(matches!(err, Signal::Failed(ExecutionError::Condition { .. })));
    }

    #[test]
    fn test_ignored_failure() {
        let (engine, _) = setup();
        let task = load(
            &engine,
            json!({"record": {"object": "boom"}, "ignore_errors": true, "register": "out"}),
        );
        let mut scope = engine.new_scope();

        let outcomes = task.execute(&mut scope).unwrap();
        assert!(outcomes[0].failed);
        assert!(!outcomes[0].succeeded);
        assert_eq!(outcomes[0].failure.as_deref(), Some("TaskError: boom"));
    }

    #[test]
    fn test_unignored_failure() {
        let (engine, _) = setup();
        let task = load(&engine, json!({"name": "exploding", "record": {"object": "boom"}}));
        let mut scope = engine.new_scope();

        let err = task.execute(&mut scope).unwrap_err();
        let Signal::Failed(err) = err else {
            panic!("expected a failure");
        };
        assert_eq!(err.to_string(), "Failed to execute task exploding. TaskError: boom");
    }

    #[test]
    fn test_scalar_output_is_rejected() {
        let (engine, _) = setup();
        let task = load(&engine, json!({"record": {"object": "scalar"}, "ignore_errors": true}));
        let mut scope = engine.new_scope();

        let err = task.execute(&mut scope).unwrap_err();
        assert!(matches!(err, Signal::Failed(ExecutionError::InvalidOutput { .. })));
    }

    #[test]
    fn test_loop_runs_per_item() {
        let (engine, recorder) = setup();
        let task = load(
            &engine,
            json!({"record": {"object": "{{ item }}"}, "loop": [1, 2, null], "register": "out"}),
        );
        let mut scope = engine.new_scope();

        let outcomes = task.execute(&mut scope).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(*recorder.calls.lock().unwrap(), vec![json!(1), json!(2), json!(null)]);
        assert!(!scope.contains_key("item"));

        let registered = scope.get("out").unwrap().unwrap();
        assert_eq!(registered["results"].as_array().unwrap().len(), 3);
        assert_eq!(registered["results"][1]["echo"], json!(2));
    }

    #[test]
    fn test_loop_with_guard() {
        let (engine, recorder) = setup();
        let task = load(
            &engine,
            json!({
                "record": {"object": "{{ item }}"},
                "loop": [1, 2, null],
                "when": "item is not none"
            }),
        );
        let mut scope = engine.new_scope();

        let outcomes = task.execute(&mut scope).unwrap();

        assert_eq!(*recorder.calls.lock().unwrap(), vec![json!(1), json!(2)]);
        assert!(outcomes[2].skipped);
    }

    #[test]
    fn test_loop_over_template() {
        let (engine, recorder) = setup();
        let task = load(
            &engine,
            json!({"record": {"object": "{{ item }}"}, "loop": "{{ items }}"}),
        );
        let mut scope = engine.new_scope();
        scope.set("answer", json!(42));
        scope.set("items", json!(["{{ answer }}", 43]));

        task.execute(&mut scope).unwrap();

        assert_eq!(*recorder.calls.lock().unwrap(), vec![json!(42), json!(43)]);
    }

    #[test]
    fn test_loop_over_non_list() {
        let (engine, _) = setup();
        let task = load(&engine, json!({"record": {"object": 1}, "loop": "{{ answer }}"}));
        let mut scope = engine.new_scope();
        scope.set("answer", json!(42));

        let err = task.execute(&mut scope).unwrap_err();
        assert!(matches!(err, Signal::Failed(ExecutionError::Loop { .. })));
    }

    #[test]
    fn test_cast_failure_during_loop() {
        let (engine, _) = setup();
        let task = load(
            &engine,
            json!({
                "record": {"object": 1, "number": "{{ item }}"},
                "loop": [1, null],
                "ignore_errors": true,
                "register": "out"
            }),
        );
        let mut scope = engine.new_scope();

        let outcomes = task.execute(&mut scope).unwrap();

        assert!(outcomes[0].succeeded);
        assert!(outcomes[1].failed);
        assert!(outcomes[1].failure.as_deref().unwrap().contains("a number"));
    }

    #[test]
    fn test_params_resolution() {
        let (engine, _) = setup();
        let task = load(&engine, json!({"record": {"object": "{{ answer }}", "number": "7"}}));
        let mut scope = engine.new_scope();
        scope.set("answer", json!(42));

        let params = task.params();
        assert_eq!(params.raw("object"), Some(&json!("{{ answer }}")));
        assert_eq!(params.raw("number"), Some(&json!(7)));
        assert_eq!(
            Value::Object(params.resolve_all(&scope).unwrap()),
            json!({"object": 42, "number": 7})
        );
    }
}
