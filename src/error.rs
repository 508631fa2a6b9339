//! Error types for taskscript

use std::io;
use thiserror::Error;

/// Result type alias for taskscript operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Main error type returned to callers of the engine
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Script-shape errors, raised before any task executes
    #[error("Invalid script: {0}")]
    InvalidScript(String),

    /// Task definition and parameter-shape errors
    #[error("Invalid task: {0}")]
    InvalidTask(#[from] DefinitionError),

    /// Runtime errors during script execution
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A caller-supplied kind uses a reserved control key as its name
    #[error("Task kind '{0}' conflicts with a built-in parameter")]
    ReservedKindName(String),

    /// A caller-supplied kind declares inconsistent metadata
    #[error("Invalid task kind '{name}': {reason}")]
    InvalidKind { name: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptError {
    /// Whether this error is an execution failure (as opposed to a load error)
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, ScriptError::Execution(_))
    }
}

/// Task definition errors (the "invalid task" family)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Task defined by one of {0} is not known")]
    UnknownKind(String),

    #[error("Item with keys {0} is ambiguous")]
    Ambiguous(String),

    #[error("The {param} parameter must be {expected} for task {task}, got {got}")]
    ControlType {
        param: String,
        expected: String,
        task: String,
        got: String,
    },

    #[error("Unknown top-level parameters {params} for task {task}")]
    UnknownTopLevel { task: String, params: String },

    #[error("Task {task} accepts an object, not {got}")]
    NotAnObject { task: String, got: String },

    #[error("A task definition must be an object, got {0}")]
    NotAMapping(String),

    #[error("Parameter(s) {params} are not recognized for task {task}")]
    UnknownParams { task: String, params: String },

    #[error("Parameter(s) {params} are required for task {task}")]
    MissingParams { task: String, params: String },

    #[error("Invalid value for parameter {param} of task {task}: {reason}")]
    InvalidValue {
        task: String,
        param: String,
        reason: String,
    },

    #[error("At least one of {options} is required for task {task}")]
    EmptyParams { task: String, options: String },
}

/// Runtime execution errors (the "execution failed" family)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Failed to evaluate condition for {task}: {source}")]
    Condition {
        task: String,
        #[source]
        source: EvaluationError,
    },

    #[error("Failed to evaluate loop for {task}: {reason}")]
    Loop { task: String, reason: String },

    #[error("Failed to execute task {task}. {class}: {message}")]
    TaskFailed {
        task: String,
        class: String,
        message: String,
    },

    #[error("Execution aborted: {0}")]
    Aborted(String),

    #[error("Task {task} returned {got} instead of an object or nothing")]
    InvalidOutput { task: String, got: String },

    #[error("Script returned undefined value")]
    UndefinedResult,
}

/// Template evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("{0}")]
    Template(String),

    #[error("Recursive evaluation of variable '{0}' exceeded the nesting limit")]
    RecursionLimit(String),
}

impl From<minijinja::Error> for EvaluationError {
    fn from(err: minijinja::Error) -> Self {
        EvaluationError::Template(err.to_string())
    }
}

/// A failure raised inside a task body
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl TaskError {
    /// Short class name reported when the failure is wrapped or ignored
    pub fn class(&self) -> &'static str {
        match self {
            TaskError::Evaluation(_) => "EvaluationError",
            TaskError::Definition(_) => "InvalidTask",
            TaskError::Aborted(_) => "Aborted",
            TaskError::Failed(_) => "TaskError",
            TaskError::Execution(_) => "ExecutionFailed",
        }
    }

    /// Translate into the execution error that terminates a script.
    ///
    /// Aborts keep their message verbatim and nested execution failures pass
    /// through unchanged; everything else is decorated with the task name.
    pub fn into_execution(self, task: &str) -> ExecutionError {
        match self {
            TaskError::Aborted(msg) => ExecutionError::Aborted(msg),
            TaskError::Execution(err) => err,
            other => ExecutionError::TaskFailed {
                task: task.to_string(),
                class: other.class().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Specialized result type for definition loading
pub type DefinitionResult<T> = std::result::Result<T, DefinitionError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for template evaluation
pub type EvaluationResult<T> = std::result::Result<T, EvaluationError>;
