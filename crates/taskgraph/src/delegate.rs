//! Run delegate
//!
//! The runner reports every state transition worth surfacing through this
//! trait, so callers decide how to log, render progress, or collect results.

use crate::task::Task;
use crate::types::TaskOutput;

/// Observer and reporter bundle for a run
///
/// Every method defaults to a no-op.
pub trait RunDelegate<T: Task> {
    /// Called when a task is handed to the scheduler's in-flight set
    fn on_task_started(&self, _task: &T) {}

    /// Called when a task finished successfully
    fn on_task_succeeded(&self, _task: &T, _output: &TaskOutput) {}

    /// Called when a task returned an error
    fn on_task_failed(&self, _task: &T, _error: &anyhow::Error) {}

    /// Called for each task skipped because `failed` (an ancestor) failed
    fn on_task_skipped(&self, _task: &T, _failed: &T) {}

    /// Called once, before dispatch, with every task caught in a cycle
    fn on_circular_dependency(&self, _tasks: &[&T]) {}

    /// Called once, before dispatch, for a task that depends on itself
    fn on_self_dependency(&self, _task: &T) {}

    /// Called once when failures exceed the tolerance
    fn on_tolerance_exceeded(&self, _failed: usize, _tolerance: usize) {}
}

/// Delegate that ignores everything
pub struct NoopDelegate;

impl<T: Task> RunDelegate<T> for NoopDelegate {}
