//! Parameter schema for task kinds
//!
//! Every task kind describes the shape of its parameters with a [`KindSpec`].
//! The loader uses it to normalize and validate a definition before the task
//! is ever executed.

use crate::config::types::describe;
use crate::error::{DefinitionError, DefinitionResult};
use serde_json::{Map, Value};

/// Declared type of a task parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Accept any value unchanged
    Any,
    String,
    Integer,
    Float,
    Bool,
    List,
    Mapping,
}

impl ParamType {
    /// Coerce a value to this type, or explain why it cannot be
    pub fn cast(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (ParamType::Any, value) => Ok(value),

            (ParamType::String, Value::String(s)) => Ok(Value::String(s)),
            (ParamType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (ParamType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Ok(Value::Number(n))
            }
            (ParamType::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(format!("{} is not an integer", n)),
            },
            (ParamType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("invalid literal for an integer: '{}'", s)),

            (ParamType::Float, Value::Number(n)) => n
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("{} is not a valid number", n)),
            (ParamType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("invalid literal for a float: '{}'", s)),

            (ParamType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamType::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            (ParamType::Bool, Value::Number(n)) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
            (ParamType::Bool, Value::Number(n)) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),

            (ParamType::List, Value::Array(items)) => Ok(Value::Array(items)),
            (ParamType::Mapping, Value::Object(map)) => Ok(Value::Object(map)),

            (ty, other) => Err(format!(
                "expected {}, got {}",
                ty.describe(),
                describe_typed(&other)
            )),
        }
    }

    /// Human readable name used in error messages
    pub fn describe(self) -> &'static str {
        match self {
            ParamType::Any => "any value",
            ParamType::String => "a string",
            ParamType::Integer => "a number",
            ParamType::Float => "a number",
            ParamType::Bool => "a boolean",
            ParamType::List => "a list",
            ParamType::Mapping => "an object",
        }
    }
}

fn describe_typed(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => format!("'{}'", s),
        other => describe(other),
    }
}

/// When declared parameters are cast to their types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastTiming {
    /// Cast non-template values at load time and template values before execution
    #[default]
    Eager,

    /// Cast everything right before execution
    Deferred,
}

/// Parameter metadata of a task kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindSpec {
    /// Parameters that must be present
    pub required: &'static [(&'static str, ParamType)],

    /// Parameters that may be present
    pub optional: &'static [(&'static str, ParamType)],

    /// Parameter receiving a non-object payload
    pub singleton: Option<&'static str>,

    /// Accept any parameter name
    pub free_form: bool,

    /// Accept a definition where no optional parameter is given
    pub allow_empty: bool,

    pub cast: CastTiming,

    /// Required list parameter holding nested task definitions
    pub subtasks: Option<&'static str>,
}

impl KindSpec {
    /// A kind without parameters
    pub const DEFAULT: KindSpec = KindSpec {
        required: &[],
        optional: &[],
        singleton: None,
        free_form: false,
        allow_empty: true,
        cast: CastTiming::Eager,
        subtasks: None,
    };

    /// Declared type of a parameter, if any
    pub fn param_type(&self, name: &str) -> Option<ParamType> {
        self.required
            .iter()
            .chain(self.optional)
            .find(|(param, _)| *param == name)
            .map(|(_, ty)| *ty)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.param_type(name).is_some()
    }

    /// Iterate over every declared parameter
    pub fn declared(&self) -> impl Iterator<Item = (&'static str, ParamType)> + '_ {
        self.required.iter().chain(self.optional).copied()
    }

    /// Check that the metadata is consistent
    pub fn check(&self) -> Result<(), String> {
        if let Some(singleton) = self.singleton {
            if !self.free_form && !self.is_declared(singleton) {
                return Err(format!(
                    "singleton parameter '{}' is not a declared parameter",
                    singleton
                ));
            }
        }

        if let Some(subtasks) = self.subtasks {
            if !self.required.iter().any(|(param, _)| *param == subtasks) {
                return Err(format!(
                    "subtasks parameter '{}' is not a required parameter",
                    subtasks
                ));
            }
        }

        Ok(())
    }

    /// Turn a kind payload into a parameter object.
    ///
    /// Null means no parameters. A non-object payload goes into the singleton
    /// parameter when the kind has one.
    pub fn normalize(&self, task: &str, payload: Value) -> DefinitionResult<Map<String, Value>> {
        match payload {
            Value::Null => Ok(Map::new()),
            Value::Object(params) => Ok(params),
            other => match self.singleton {
                Some(param) => {
                    let mut params = Map::new();
                    params.insert(param.to_string(), other);
                    Ok(params)
                }
                None => Err(DefinitionError::NotAnObject {
                    task: task.to_string(),
                    got: describe(&other),
                }),
            },
        }
    }

    /// Validate parameter names and cast eager values.
    ///
    /// Values for which `is_template` holds are left untouched here; they are
    /// cast after evaluation, right before the task body runs.
    pub fn validate(
        &self,
        task: &str,
        mut params: Map<String, Value>,
        is_template: &dyn Fn(&Value) -> bool,
    ) -> DefinitionResult<Map<String, Value>> {
        if !self.free_form {
            let unknown: Vec<&str> = params
                .keys()
                .map(String::as_str)
                .filter(|name| !self.is_declared(name))
                .collect();
            if !unknown.is_empty() {
                return Err(DefinitionError::UnknownParams {
                    task: task.to_string(),
                    params: unknown.join(", "),
                });
            }
        }

        let missing: Vec<&str> = self
            .required
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !params.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(DefinitionError::MissingParams {
                task: task.to_string(),
                params: missing.join(", "),
            });
        }

        if self.required.is_empty()
            && !self.allow_empty
            && !self.optional.iter().any(|(name, _)| params.contains_key(*name))
        {
            let options: Vec<&str> = self.optional.iter().map(|(name, _)| *name).collect();
            return Err(DefinitionError::EmptyParams {
                task: task.to_string(),
                options: options.join(", "),
            });
        }

        if self.cast == CastTiming::Eager {
            for (name, ty) in self.declared() {
                if ty == ParamType::Any {
                    continue;
                }
                if let Some(value) = params.get_mut(name) {
                    if is_template(value) {
                        continue;
                    }
                    *value = ty.cast(value.take()).map_err(|reason| DefinitionError::InvalidValue {
                        task: task.to_string(),
                        param: name.to_string(),
                        reason,
                    })?;
                }
            }
        }

        Ok(params)
    }
}

impl Default for KindSpec {
    fn default() -> Self {
        Self::DEFAULT
    }
}
