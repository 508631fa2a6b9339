//! CLI interface and argument parsing
//!
//! This module handles command-line parsing and runs a script file
//! with variables given on the command line.

pub mod app;

// Re-export main types
pub use app::*;
