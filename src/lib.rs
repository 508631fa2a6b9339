//! Taskscript - a declarative task-execution engine
//!
//! Scripts are ordered lists of tasks written as YAML or JSON data. Each task
//! selects a kind (`log`, `vars`, `block`, `fail`, `return`, or one supplied
//! by the caller), and may carry a `when` guard, a `loop`, `ignore_errors`
//! and a `register` variable. String values are Jinja templates evaluated
//! against a variable scope.
//!
//! ```no_run
//! use serde_json::json;
//! use taskscript::Engine;
//!
//! let engine = Engine::new();
//! let result = engine
//!     .execute(json!([{"vars": {"a": 1, "b": 2}}, {"return": "{{ a + b }}"}]), None)
//!     .unwrap();
//! assert_eq!(result, json!(3));
//! ```

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

// Re-export commonly used types
pub use error::{Result, ScriptError};
pub use runner::{
    Engine, EngineBuilder, Interrupt, Kind, Outcome, Params, Scope, Script, Signal, Task,
};

/// Current version of taskscript
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
