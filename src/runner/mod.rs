//! Task execution engine
//!
//! This module handles loading and running scripts: template evaluation,
//! variable scopes, conditional logic, loops and the built-in task kinds.

pub mod engine;
pub mod filters;
pub mod interpolate;
pub mod kinds;
pub mod scope;
pub mod task;
pub mod when;

// Re-export main types
pub use engine::*;
pub use interpolate::*;
pub use kinds::*;
pub use scope::*;
pub use task::*;
pub use when::*;
