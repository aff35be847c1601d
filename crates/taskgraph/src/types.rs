//! Core types for task graph execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a task inside its [`TaskGraph`](crate::TaskGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Position of the task in insertion order
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a task during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not yet examined by the scheduler
    Pending,
    /// Blocked on at least one unfinished dependency
    Waiting,
    /// All dependencies succeeded, queued for dispatch
    Ready,
    /// `perform` is in flight
    Running,
    /// `perform` returned a value
    Succeeded,
    /// `perform` returned an error
    Failed,
    /// Never attempted because an ancestor failed
    Skipped,
}

impl TaskStatus {
    /// Check if the status is final for this run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Value produced by a successful task
///
/// Producers and consumers agree on the variant; the runner only stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutput {
    /// Nothing worth handing to dependents
    #[default]
    None,
    /// Identifier issued by the remote side for a created resource
    PhysicalId(String),
    /// Result of attaching one resource to another
    Attachment { target_id: String, related_id: String },
}

impl TaskOutput {
    /// Physical id carried by this output, if any
    pub fn physical_id(&self) -> Option<&str> {
        match self {
            Self::PhysicalId(id) => Some(id),
            _ => None,
        }
    }
}

/// Counts of terminal task states after a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Check if every dispatched task succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of tasks that reached a terminal state
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Record a terminal status
    pub fn add_status(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            _ => {}
        }
    }
}

/// Options for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on task bodies in flight at once (0 is treated as 1)
    pub max_concurrent_tasks: usize,
    /// Number of failed tasks allowed before the run is aborted
    pub failed_tasks_tolerance: usize,
}

impl RunOptions {
    pub fn new(max_concurrent_tasks: usize, failed_tasks_tolerance: usize) -> Self {
        Self {
            max_concurrent_tasks,
            failed_tasks_tolerance,
        }
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 1,
            failed_tasks_tolerance: 0,
        }
    }
}
