//! Task kinds
//!
//! A kind gives a task its behavior. The engine selects it by the single
//! non-control key of a task definition. Custom kinds implement [`Kind`] and
//! are registered through [`EngineBuilder::kind`](crate::runner::EngineBuilder::kind).

use crate::config::{KindSpec, ParamType};
use crate::error::TaskError;
use crate::runner::{Interrupt, Params, Scope, Task};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Behavior and parameter metadata of a task kind
pub trait Kind: Send + Sync {
    /// Parameter metadata used to validate definitions
    fn spec(&self) -> KindSpec;

    /// Prepare parameters right before execution.
    ///
    /// The default evaluates and casts every declared, typed parameter.
    fn validate(&self, params: &mut Params, scope: &Scope) -> Result<(), TaskError> {
        params.cast_declared(&self.spec(), scope)
    }

    /// Run the task body.
    ///
    /// Returning an object exposes its keys in the registered result.
    fn execute(
        &self,
        task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt>;
}

/// Built-in kinds, by name
pub fn builtin_kinds() -> Vec<(&'static str, Arc<dyn Kind>)> {
    vec![
        ("block", Arc::new(Block)),
        ("fail", Arc::new(Fail)),
        ("log", Arc::new(Log)),
        ("return", Arc::new(Return)),
        ("vars", Arc::new(Vars)),
    ]
}

/// Run nested tasks in order, sharing the enclosing scope
#[derive(Debug, Clone, Copy, Default)]
pub struct Block;

impl Kind for Block {
    fn spec(&self) -> KindSpec {
        KindSpec {
            required: &[("tasks", ParamType::List)],
            singleton: Some("tasks"),
            subtasks: Some("tasks"),
            ..KindSpec::DEFAULT
        }
    }

    fn execute(
        &self,
        task: &Task,
        _params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        for child in task.children() {
            child.execute(scope)?;
        }
        Ok(None)
    }
}

/// Abort the script with a message
#[derive(Debug, Clone, Copy, Default)]
pub struct Fail;

impl Kind for Fail {
    fn spec(&self) -> KindSpec {
        KindSpec {
            required: &[("msg", ParamType::String)],
            singleton: Some("msg"),
            ..KindSpec::DEFAULT
        }
    }

    fn execute(
        &self,
        _task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        let msg = params.require("msg", scope)?;
        let msg = match msg {
            Value::String(msg) => msg,
            other => other.to_string(),
        };
        Err(TaskError::Aborted(msg).into())
    }
}

/// Emit messages at the given log levels
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

impl Kind for Log {
    fn spec(&self) -> KindSpec {
        KindSpec {
            optional: &[
                ("debug", ParamType::String),
                ("info", ParamType::String),
                ("warning", ParamType::String),
                ("error", ParamType::String),
            ],
            allow_empty: false,
            ..KindSpec::DEFAULT
        }
    }

    fn execute(
        &self,
        task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        for (level, message) in params.resolve_all(scope)? {
            let message = match message {
                Value::String(message) => message,
                other => other.to_string(),
            };
            match level.as_str() {
                "debug" => debug!(target: "taskscript::script", task = task.name(), "{}", message),
                "info" => info!(target: "taskscript::script", task = task.name(), "{}", message),
                "warning" => warn!(target: "taskscript::script", task = task.name(), "{}", message),
                _ => error!(target: "taskscript::script", task = task.name(), "{}", message),
            }
        }
        Ok(None)
    }
}

/// Finish the script with a value
#[derive(Debug, Clone, Copy, Default)]
pub struct Return;

impl Kind for Return {
    fn spec(&self) -> KindSpec {
        KindSpec {
            optional: &[("result", ParamType::Any)],
            singleton: Some("result"),
            ..KindSpec::DEFAULT
        }
    }

    fn execute(
        &self,
        _task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        let result = match params.raw("result") {
            None => Some(Value::Null),
            Some(Value::String(template)) => scope.try_evaluate(template)?,
            Some(other) => Some(scope.evaluate_recursive(other)?),
        };
        Err(Interrupt::Finish(result))
    }
}

/// Assign variables in the current scope
#[derive(Debug, Clone, Copy, Default)]
pub struct Vars;

impl Kind for Vars {
    fn spec(&self) -> KindSpec {
        KindSpec {
            free_form: true,
            ..KindSpec::DEFAULT
        }
    }

    fn execute(
        &self,
        _task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        let names: Vec<String> = params.names().map(str::to_string).collect();
        for name in names {
            // Earlier assignments are visible to later ones
            let value = params.get(&name, scope)?.unwrap_or(Value::Null);
            scope.set_resolved(name, value);
        }
        Ok(None)
    }
}
