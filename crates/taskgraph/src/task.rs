//! The task contract

use crate::types::TaskOutput;
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// An atomic unit of work in a [`TaskGraph`](crate::TaskGraph)
///
/// The key identifies what the task acts on. Several tasks may share a key
/// (for example two attachments made for the same resource); deferred edges
/// match every task carrying the key.
#[async_trait]
pub trait Task: Send + Sync {
    /// Typed identity used for deferred edges and error reporting
    type Key: Clone + Eq + Hash + Debug + Display + Send + Sync;

    /// Identity of this task
    fn key(&self) -> Self::Key;

    /// Do the work
    ///
    /// `inputs` holds the outputs of every dependency. The returned value is
    /// stored once by the runner and handed to dependents.
    async fn perform(&self, inputs: &Inputs<'_, Self::Key>) -> anyhow::Result<TaskOutput>;
}

/// Outputs of the dependencies of a running task
#[derive(Debug)]
pub struct Inputs<'a, K> {
    entries: Vec<(K, &'a TaskOutput)>,
}

impl<'a, K: PartialEq> Inputs<'a, K> {
    pub(crate) fn new(entries: Vec<(K, &'a TaskOutput)>) -> Self {
        Self { entries }
    }

    /// An empty input set, for driving a task body directly
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// First output produced by a dependency with the given key
    pub fn get(&self, key: &K) -> Option<&'a TaskOutput> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, output)| *output)
    }

    /// Iterate over all dependency outputs
    pub fn iter(&self) -> impl Iterator<Item = (&K, &'a TaskOutput)> {
        self.entries.iter().map(|(k, output)| (k, *output))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
