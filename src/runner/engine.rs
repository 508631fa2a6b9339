//! Script engine
//!
//! The engine owns the registry of task kinds and the template evaluator.
//! It turns script sources into [`Script`]s and runs them against a [`Scope`].

use crate::config::{describe, is_reserved, script_tasks};
use crate::error::{DefinitionError, DefinitionResult, ExecutionError, Result, ScriptError};
use crate::runner::{builtin_kinds, Evaluator, JinjaEvaluator, Kind, Scope, Signal, Task};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

/// Registry of task kinds plus the evaluator shared by every script
pub struct Engine {
    name: String,
    kinds: HashMap<String, Arc<dyn Kind>>,
    evaluator: Arc<dyn Evaluator>,
}

impl Engine {
    /// Create an engine with the built-in kinds and the Jinja evaluator
    pub fn new() -> Self {
        Engine {
            name: "taskscript".to_string(),
            kinds: builtin_kinds()
                .into_iter()
                .map(|(name, kind)| (name.to_string(), kind))
                .collect(),
            evaluator: Arc::new(JinjaEvaluator::new()),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Name used in log records
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Registered kind names, sorted
    pub fn kind_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn kind(&self, name: &str) -> Option<&Arc<dyn Kind>> {
        self.kinds.get(name)
    }

    /// Create an empty scope bound to this engine's evaluator
    pub fn new_scope(&self) -> Scope {
        Scope::new(Arc::clone(&self.evaluator))
    }

    /// Resolve a single task definition.
    ///
    /// The definition must contain exactly one key naming a registered kind.
    pub fn load_task(&self, definition: &Value) -> DefinitionResult<Task> {
        let Value::Object(definition) = definition else {
            return Err(DefinitionError::NotAMapping(describe(definition)));
        };

        let matching: Vec<&str> = definition
            .keys()
            .map(String::as_str)
            .filter(|key| self.kinds.contains_key(*key))
            .collect();

        match matching.as_slice() {
            [kind_name] => {
                let kind = Arc::clone(&self.kinds[*kind_name]);
                Task::from_definition(kind_name, kind, definition, self)
            }
            [] => {
                let keys: Vec<&str> = definition.keys().map(String::as_str).collect();
                Err(DefinitionError::UnknownKind(keys.join(", ")))
            }
            _ => Err(DefinitionError::Ambiguous(matching.join(", "))),
        }
    }

    /// Load a script without running it
    pub fn load(&self, source: Value) -> Result<Script<'_>> {
        Script::new(self, source)
    }

    /// Load and run a script.
    ///
    /// Without a caller scope a fresh one is used. Returns the value given to
    /// `return`, or null when the script ends without one.
    pub fn execute(&self, source: Value, scope: Option<&mut Scope>) -> Result<Value> {
        let script = self.load(source)?;
        match scope {
            Some(scope) => script.run(scope),
            None => script.run(&mut self.new_scope()),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("kinds", &self.kind_names())
            .finish_non_exhaustive()
    }
}

/// Builder for an [`Engine`] with custom kinds or a custom evaluator
pub struct EngineBuilder {
    name: String,
    kinds: Vec<(String, Arc<dyn Kind>)>,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            name: "taskscript".to_string(),
            kinds: Vec::new(),
            evaluator: None,
        }
    }

    /// Set the name used in log records
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a kind, replacing a built-in with the same name
    pub fn kind(self, name: impl Into<String>, kind: impl Kind + 'static) -> Self {
        self.kind_arc(name, Arc::new(kind))
    }

    /// Register a shared kind
    pub fn kind_arc(mut self, name: impl Into<String>, kind: Arc<dyn Kind>) -> Self {
        self.kinds.push((name.into(), kind));
        self
    }

    /// Replace the template evaluator
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Validate the registered kinds and build the engine
    pub fn build(self) -> Result<Engine> {
        let mut engine = Engine::new();
        engine.name = self.name;
        if let Some(evaluator) = self.evaluator {
            engine.evaluator = evaluator;
        }

        for (name, kind) in self.kinds {
            if is_reserved(&name) {
                return Err(ScriptError::ReservedKindName(name));
            }
            kind.spec()
                .check()
                .map_err(|reason| ScriptError::InvalidKind {
                    name: name.clone(),
                    reason,
                })?;
            engine.kinds.insert(name, kind);
        }

        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A loaded script, ready to run
#[derive(Debug)]
pub struct Script<'e> {
    engine: &'e Engine,
    tasks: Vec<Task>,
}

impl<'e> Script<'e> {
    /// Load every task definition of a script source.
    ///
    /// Nothing is executed; any definition error aborts loading.
    pub fn new(engine: &'e Engine, source: Value) -> Result<Self> {
        let tasks = script_tasks(source)?
            .iter()
            .map(|definition| engine.load_task(definition))
            .collect::<DefinitionResult<Vec<_>>>()?;

        Ok(Script { engine, tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// Run the tasks in order against a scope
    pub fn run(&self, scope: &mut Scope) -> Result<Value> {
        let span = info_span!("script", engine = %self.engine.name);
        let _enter = span.enter();

        for task in &self.tasks {
            debug!(task = task.name(), "Executing task");
            match task.execute(scope) {
                Ok(_) => {}
                Err(Signal::Finish(Some(value))) => {
                    info!("Execution finished with result {}", value);
                    return Ok(value);
                }
                Err(Signal::Finish(None)) => {
                    let err = ExecutionError::UndefinedResult;
                    error!("Execution failed: {}", err);
                    return Err(err.into());
                }
                Err(Signal::Failed(err)) => {
                    error!("Execution failed: {}", err);
                    return Err(err.into());
                }
            }
        }

        info!("Execution finished without a result");
        Ok(Value::Null)
    }
}
