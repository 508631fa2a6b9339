//! Common test utilities

#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use taskscript::config::{CastTiming, KindSpec, ParamType};
use taskscript::error::TaskError;
use taskscript::{Engine, Interrupt, Kind, Params, Scope, Task};
use tempfile::TempDir;

/// Create a temporary directory holding a script file
pub fn create_test_script(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let script_path = temp_dir.path().join(name);
    fs::write(&script_path, content).unwrap();
    (temp_dir, script_path)
}

/// Kind that records the `object` parameter of every call and echoes it back
#[derive(Clone, Default)]
pub struct Spy {
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl Spy {
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

impl Kind for Spy {
    fn spec(&self) -> KindSpec {
        KindSpec {
            required: &[("object", ParamType::Any)],
            optional: &[("message", ParamType::String), ("number", ParamType::Integer)],
            cast: CastTiming::Deferred,
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
        Ok(Some(json!({ "result": object })))
    }
}

/// Kind that sums a list of integers
#[derive(Clone, Copy, Default)]
pub struct Add;

impl Kind for Add {
    fn spec(&self) -> KindSpec {
        KindSpec {
            required: &[("values", ParamType::List)],
            ..KindSpec::DEFAULT
        }
    }

    fn validate(&self, params: &mut Params, scope: &Scope) -> Result<(), TaskError> {
        params.cast_declared(&self.spec(), scope)?;
        let values = params.require("values", scope)?;
        let numbers = values
            .as_array()
            .into_iter()
            .flatten()
            .map(|value| {
                ParamType::Integer
                    .cast(value.clone())
                    .map_err(TaskError::Failed)
            })
            .collect::<Result<Vec<_>, _>>()?;
        params.set("values", Value::Array(numbers));
        Ok(())
    }

    fn execute(
        &self,
        _task: &Task,
        params: &Params,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Interrupt> {
        let values = params.require("values", scope)?;
        let sum: i64 = values
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_i64)
            .sum();
        Ok(Some(json!({ "sum": sum })))
    }
}

/// Engine with the built-in kinds plus `test` (a [`Spy`]) and `add`
pub fn engine_with_spy() -> (Engine, Spy) {
    let spy = Spy::default();
    let engine = Engine::builder()
        .kind("test", spy.clone())
        .kind("add", Add)
        .build()
        .unwrap();
    (engine, spy)
}
