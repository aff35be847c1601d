//! Task graph construction and structural checks

use crate::error::RunError;
use crate::task::Task;
use crate::types::{TaskId, TaskOutput};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::OnceLock;

pub(crate) struct Node<T: Task> {
    pub(crate) task: T,
    after: Vec<TaskId>,
    deferred: Vec<T::Key>,
    pub(crate) result: OnceLock<TaskOutput>,
}

/// The set of tasks for one run
///
/// Tasks are appended while the graph is assembled. Edges come in two forms:
/// explicit edges to a known [`TaskId`], and deferred edges naming a task key
/// that may only be added later. Deferred edges are resolved against the
/// complete node set when the run starts; a key no task carries imposes no
/// ordering.
pub struct TaskGraph<T: Task> {
    nodes: Vec<Node<T>>,
}

impl<T: Task> Default for TaskGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> TaskGraph<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append a task with no dependencies
    pub fn add(&mut self, task: T) -> TaskId {
        self.nodes.push(Node {
            task,
            after: Vec::new(),
            deferred: Vec::new(),
            result: OnceLock::new(),
        });
        TaskId(self.nodes.len() - 1)
    }

    /// Run `task` only after `dependency` has finished
    pub fn after(&mut self, task: TaskId, dependency: TaskId) {
        let after = &mut self.nodes[task.0].after;
        if !after.contains(&dependency) {
            after.push(dependency);
        }
    }

    /// Run `task` only after every task whose key equals `key`
    pub fn defer(&mut self, task: TaskId, key: T::Key) {
        let deferred = &mut self.nodes[task.0].deferred;
        if !deferred.contains(&key) {
            deferred.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn task(&self, id: TaskId) -> &T {
        &self.nodes[id.0].task
    }

    /// Iterate over tasks in insertion order
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &T)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (TaskId(i), &node.task))
    }

    /// Explicit dependencies of a task
    pub fn explicit_dependencies(&self, id: TaskId) -> &[TaskId] {
        &self.nodes[id.0].after
    }

    /// Deferred dependency keys of a task
    pub fn deferred_dependencies(&self, id: TaskId) -> &[T::Key] {
        &self.nodes[id.0].deferred
    }

    /// Output stored for a task that succeeded
    pub fn output(&self, id: TaskId) -> Option<&TaskOutput> {
        self.nodes[id.0].result.get()
    }

    /// Find tasks by key
    pub fn find(&self, key: &T::Key) -> Vec<TaskId> {
        self.tasks()
            .filter(|(_, task)| &task.key() == key)
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn node(&self, index: usize) -> &Node<T> {
        &self.nodes[index]
    }

    /// Dependencies of every task, with deferred keys resolved to indices
    pub(crate) fn resolve_edges(&self) -> Vec<Vec<usize>> {
        let mut by_key: HashMap<T::Key, Vec<usize>> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            by_key.entry(node.task.key()).or_default().push(i);
        }

        self.nodes
            .iter()
            .map(|node| {
                let mut deps: Vec<usize> = node.after.iter().map(|id| id.0).collect();
                for key in &node.deferred {
                    if let Some(matches) = by_key.get(key) {
                        deps.extend(matches);
                    }
                }
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect()
    }

    /// Reject graphs that could never finish
    ///
    /// Returns the offending task indices alongside the error so callers can
    /// report the tasks themselves.
    pub(crate) fn check_structure(
        &self,
        edges: &[Vec<usize>],
    ) -> Result<(), (RunError<T::Key>, Vec<usize>)> {
        for (i, deps) in edges.iter().enumerate() {
            if deps.contains(&i) {
                let key = self.nodes[i].task.key();
                return Err((RunError::SelfDependency { key }, vec![i]));
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.nodes.len(), 0);
        let indices: Vec<NodeIndex> = (0..self.nodes.len()).map(|i| graph.add_node(i)).collect();
        for (i, deps) in edges.iter().enumerate() {
            for &dep in deps {
                graph.add_edge(indices[dep], indices[i], ());
            }
        }

        let mut cyclic: Vec<usize> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .map(|idx| graph[idx])
            .collect();

        if cyclic.is_empty() {
            return Ok(());
        }

        cyclic.sort_unstable();
        let keys = cyclic.iter().map(|&i| self.nodes[i].task.key()).collect();
        Err((RunError::CircularDependency { keys }, cyclic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Inputs;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Task for Named {
        type Key = &'static str;

        fn key(&self) -> Self::Key {
            self.0
        }

        async fn perform(&self, _inputs: &Inputs<'_, Self::Key>) -> anyhow::Result<TaskOutput> {
            Ok(TaskOutput::None)
        }
    }

    #[test]
    fn test_deferred_edges_resolve_to_all_matches() {
        let mut graph = TaskGraph::new();
        let relate = graph.add(Named("relate"));
        graph.defer(relate, "create");
        let first = graph.add(Named("create"));
        let second = graph.add(Named("create"));

        let edges = graph.resolve_edges();
        assert_eq!(edges[relate.index()], vec![first.index(), second.index()]);
        assert!(edges[first.index()].is_empty());
    }

    #[test]
    fn test_deferred_edge_without_match_is_dropped() {
        let mut graph = TaskGraph::new();
        let relate = graph.add(Named("relate"));
        graph.defer(relate, "never-created");

        assert!(graph.resolve_edges()[relate.index()].is_empty());
        assert!(graph.check_structure(&graph.resolve_edges()).is_ok());
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let mut graph = TaskGraph::new();
        let a = graph.add(Named("a"));
        let b = graph.add(Named("b"));
        graph.after(b, a);
        graph.after(b, a);
        graph.defer(b, "a");

        assert_eq!(graph.explicit_dependencies(b), &[a]);
        assert_eq!(graph.resolve_edges()[b.index()], vec![a.index()]);
    }

    #[test]
    fn test_self_dependency_detected() {
        let mut graph = TaskGraph::new();
        let a = graph.add(Named("a"));
        graph.after(a, a);

        let (err, offenders) = graph.check_structure(&graph.resolve_edges()).unwrap_err();
        assert!(matches!(err, RunError::SelfDependency { key: "a" }));
        assert_eq!(offenders, vec![0]);
    }

    #[test]
    fn test_deferred_edge_on_own_key_is_self_dependency() {
        let mut graph = TaskGraph::new();
        let a = graph.add(Named("a"));
        graph.defer(a, "a");

        let (err, _) = graph.check_structure(&graph.resolve_edges()).unwrap_err();
        assert!(matches!(err, RunError::SelfDependency { .. }));
    }

    #[test]
    fn test_cycle_reports_all_members() {
        let mut graph = TaskGraph::new();
        let x = graph.add(Named("x"));
        let y = graph.add(Named("y"));
        let z = graph.add(Named("z"));
        let free = graph.add(Named("free"));
        graph.after(x, z);
        graph.after(y, x);
        graph.after(z, y);
        graph.after(free, x);

        let (err, offenders) = graph.check_structure(&graph.resolve_edges()).unwrap_err();
        match err {
            RunError::CircularDependency { keys } => assert_eq!(keys, vec!["x", "y", "z"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(offenders, vec![0, 1, 2]);
    }

    #[test]
    fn test_find_by_key() {
        let mut graph = TaskGraph::new();
        graph.add(Named("a"));
        let b = graph.add(Named("b"));
        assert_eq!(graph.find(&"b"), vec![b]);
        assert!(graph.find(&"c").is_empty());
        assert_eq!(graph.len(), 2);
    }
}
