//! Script parsing and validation
//!
//! This module handles parsing of script sources and the parameter
//! schema that task kinds use to validate their definitions.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
