//! # Taskgraph
//!
//! Dependency-ordered execution of async task graphs.
//!
//! The runner knows nothing about what the tasks do. It only needs each task
//! to expose a key and a `perform` body, and it guarantees:
//!
//! - a task starts only after all of its dependencies succeeded
//! - at most `max_concurrent_tasks` bodies are in flight at once
//! - a failed task skips all of its transitive dependents
//! - once failures exceed `failed_tasks_tolerance`, nothing new starts
//! - self-dependencies and cycles are rejected before anything starts
//!
//! ## Core Concepts
//!
//! - **Task**: an atomic unit of work with a typed key
//! - **TaskGraph**: tasks plus explicit and deferred (key-matched) edges
//! - **TaskOutput**: the single value a task hands to its dependents
//! - **RunDelegate**: observers for success, failure, skips and fatal reports
//!
//! ## Example
//!
//! ```ignore
//! use taskgraph::{run, Inputs, NoopDelegate, RunOptions, Task, TaskGraph, TaskOutput};
//!
//! struct Step(&'static str);
//!
//! #[async_trait::async_trait]
//! impl Task for Step {
//!     type Key = &'static str;
//!     fn key(&self) -> Self::Key { self.0 }
//!     async fn perform(&self, _inputs: &Inputs<'_, Self::Key>) -> anyhow::Result<TaskOutput> {
//!         Ok(TaskOutput::None)
//!     }
//! }
//!
//! let mut graph = TaskGraph::new();
//! let build = graph.add(Step("build"));
//! let deploy = graph.add(Step("deploy"));
//! graph.after(deploy, build);
//!
//! let summary = run(&graph, &RunOptions::new(4, 0), &NoopDelegate).await?;
//! ```

pub mod delegate;
pub mod error;
pub mod graph;
pub mod runner;
pub mod task;
pub mod types;

// Re-export main types at crate root
pub use delegate::{NoopDelegate, RunDelegate};
pub use error::RunError;
pub use graph::TaskGraph;
pub use runner::run;
pub use task::{Inputs, Task};
pub use types::{RunOptions, RunSummary, TaskId, TaskOutput, TaskStatus};
