//! Execution engine - runs a task graph with bounded concurrency
//!
//! A single loop owns all scheduling state. Task bodies are polled together
//! through a `FuturesUnordered` set, so a body waiting on I/O never blocks the
//! dispatch of other ready tasks, while every status transition happens on
//! the loop itself, one completion at a time.

use crate::delegate::RunDelegate;
use crate::error::RunError;
use crate::graph::TaskGraph;
use crate::task::{Inputs, Task};
use crate::types::{RunOptions, RunSummary, TaskOutput, TaskStatus};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;

/// Run every task in `graph`
///
/// A task starts only after all of its explicit and deferred dependencies
/// succeeded. When a task fails, all of its transitive dependents are skipped.
/// Once the number of failures exceeds `options.failed_tasks_tolerance`, no
/// further task is started; bodies already in flight still finish and are
/// recorded before [`RunError::ToleranceExceeded`] is returned.
///
/// Self-dependencies and cycles are rejected before any task is started.
pub async fn run<T, D>(
    graph: &TaskGraph<T>,
    options: &RunOptions,
    delegate: &D,
) -> Result<RunSummary, RunError<T::Key>>
where
    T: Task,
    D: RunDelegate<T> + ?Sized,
{
    let edges = graph.resolve_edges();
    if let Err((err, offenders)) = graph.check_structure(&edges) {
        report_structural(graph, &err, &offenders, delegate);
        return Err(err);
    }

    let limit = options.concurrency();
    let mut scheduler = Scheduler::new(&edges);
    let mut in_flight = FuturesUnordered::new();
    let mut aborted = false;

    log::debug!(
        "Running {} tasks (max concurrent: {}, failure tolerance: {})",
        graph.len(),
        limit,
        options.failed_tasks_tolerance
    );

    loop {
        while !aborted && in_flight.len() < limit {
            let Some(index) = scheduler.ready.pop_front() else {
                break;
            };
            let task = &graph.node(index).task;
            scheduler.transition(graph, index, TaskStatus::Running);
            delegate.on_task_started(task);
            in_flight.push(execute(index, task, scheduler.inputs(graph, index)));
        }

        let Some((index, outcome)) = in_flight.next().await else {
            break;
        };

        let node = graph.node(index);
        match outcome {
            Ok(output) => {
                let stored = node.result.get_or_init(|| output);
                scheduler.transition(graph, index, TaskStatus::Succeeded);
                delegate.on_task_succeeded(&node.task, stored);
                scheduler.release_dependents(graph, index);
            }
            Err(err) => {
                scheduler.transition(graph, index, TaskStatus::Failed);
                delegate.on_task_failed(&node.task, &err);
                scheduler.skip_dependents(graph, index, delegate);
            }
        }

        if !aborted && scheduler.summary.failed > options.failed_tasks_tolerance {
            aborted = true;
            log::debug!(
                "Failure tolerance exceeded, draining {} in-flight tasks",
                in_flight.len()
            );
        }
    }

    if aborted {
        let failed = scheduler.summary.failed;
        let tolerance = options.failed_tasks_tolerance;
        delegate.on_tolerance_exceeded(failed, tolerance);
        return Err(RunError::ToleranceExceeded {
            failed,
            tolerance,
            summary: scheduler.summary,
        });
    }

    // Structural checks make this unreachable, but a stuck task must never
    // turn into a silent success.
    let stuck: Vec<usize> = scheduler
        .status
        .iter()
        .enumerate()
        .filter(|(_, status)| !status.is_terminal())
        .map(|(i, _)| i)
        .collect();
    if !stuck.is_empty() {
        let err = RunError::CircularDependency {
            keys: stuck.iter().map(|&i| graph.node(i).task.key()).collect(),
        };
        report_structural(graph, &err, &stuck, delegate);
        return Err(err);
    }

    Ok(scheduler.summary)
}

async fn execute<'a, T: Task>(
    index: usize,
    task: &'a T,
    inputs: Inputs<'a, T::Key>,
) -> (usize, anyhow::Result<TaskOutput>) {
    let outcome = task.perform(&inputs).await;
    (index, outcome)
}

fn report_structural<T, D>(
    graph: &TaskGraph<T>,
    err: &RunError<T::Key>,
    offenders: &[usize],
    delegate: &D,
) where
    T: Task,
    D: RunDelegate<T> + ?Sized,
{
    match err {
        RunError::SelfDependency { .. } => {
            for &i in offenders {
                delegate.on_self_dependency(&graph.node(i).task);
            }
        }
        RunError::CircularDependency { .. } => {
            let tasks: Vec<&T> = offenders.iter().map(|&i| &graph.node(i).task).collect();
            delegate.on_circular_dependency(&tasks);
        }
        RunError::ToleranceExceeded { .. } => {}
    }
}

/// Bookkeeping owned by the run loop
struct Scheduler<'e> {
    edges: &'e [Vec<usize>],
    dependents: Vec<Vec<usize>>,
    remaining: Vec<usize>,
    status: Vec<TaskStatus>,
    ready: VecDeque<usize>,
    summary: RunSummary,
}

impl<'e> Scheduler<'e> {
    fn new(edges: &'e [Vec<usize>]) -> Self {
        let mut dependents = vec![Vec::new(); edges.len()];
        for (i, deps) in edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(i);
            }
        }

        let remaining: Vec<usize> = edges.iter().map(Vec::len).collect();
        let mut status = vec![TaskStatus::Pending; edges.len()];
        let mut ready = VecDeque::new();
        for (i, count) in remaining.iter().enumerate() {
            if *count == 0 {
                status[i] = TaskStatus::Ready;
                ready.push_back(i);
            } else {
                status[i] = TaskStatus::Waiting;
            }
        }

        Self {
            edges,
            dependents,
            remaining,
            status,
            ready,
            summary: RunSummary::default(),
        }
    }

    fn transition<T: Task>(&mut self, graph: &TaskGraph<T>, index: usize, next: TaskStatus) {
        log::debug!(
            "Task {}: {:?} -> {:?}",
            graph.node(index).task.key(),
            self.status[index],
            next
        );
        self.status[index] = next;
        self.summary.add_status(next);
    }

    /// Outputs of the dependencies of `index`, all of which have succeeded
    fn inputs<'g, T: Task>(&self, graph: &'g TaskGraph<T>, index: usize) -> Inputs<'g, T::Key> {
        let entries = self.edges[index]
            .iter()
            .filter_map(|&dep| {
                let node = graph.node(dep);
                node.result.get().map(|output| (node.task.key(), output))
            })
            .collect();
        Inputs::new(entries)
    }

    fn release_dependents<T: Task>(&mut self, graph: &TaskGraph<T>, index: usize) {
        for i in 0..self.dependents[index].len() {
            let dependent = self.dependents[index][i];
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 && self.status[dependent] == TaskStatus::Waiting {
                self.transition(graph, dependent, TaskStatus::Ready);
                self.ready.push_back(dependent);
            }
        }
    }

    fn skip_dependents<T, D>(&mut self, graph: &TaskGraph<T>, failed: usize, delegate: &D)
    where
        T: Task,
        D: RunDelegate<T> + ?Sized,
    {
        let failed_task = &graph.node(failed).task;
        let mut stack = self.dependents[failed].clone();
        while let Some(i) = stack.pop() {
            if self.status[i] != TaskStatus::Waiting {
                continue;
            }
            self.transition(graph, i, TaskStatus::Skipped);
            delegate.on_task_skipped(&graph.node(i).task, failed_task);
            stack.extend_from_slice(&self.dependents[i]);
        }
    }
}
