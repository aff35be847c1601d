//! Execution engine for orgform
//!
//! The engine covers the terminal side of a run:
//! 1. Diffing - Display classified bindings and planned tasks
//! 2. Executing - Confirm, drive the task runner, report progress and results

pub mod differ;
pub mod executor;

pub use executor::{confirm_proceed, execute};
