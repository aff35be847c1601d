//! Error types for task graph runs

use crate::types::RunSummary;
use std::fmt::{Debug, Display};
use thiserror::Error;

/// Fatal outcome of a run
///
/// Individual task failures are not errors; they are counted in the summary
/// until the tolerance is exceeded.
#[derive(Error, Debug)]
pub enum RunError<K: Debug + Display> {
    /// A task lists itself among its dependencies
    #[error("task {key} depends on itself")]
    SelfDependency { key: K },

    /// Tasks that block each other so none can ever become ready
    #[error("circular dependency between tasks: {}", join_keys(.keys))]
    CircularDependency { keys: Vec<K> },

    /// More tasks failed than the run allows
    #[error("number of failed tasks {failed} exceeded tolerance for failed tasks {tolerance}")]
    ToleranceExceeded {
        failed: usize,
        tolerance: usize,
        summary: RunSummary,
    },
}

impl<K: Debug + Display> RunError<K> {
    /// Check if the error was raised before any task was dispatched
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::SelfDependency { .. } | Self::CircularDependency { .. }
        )
    }
}

fn join_keys<K: Display>(keys: &[K]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
