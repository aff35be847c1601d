//! Deployment-plugin workloads
//!
//! A workload is deployed once per (account, region) target. Targets are
//! tracked in state with the hash of the workload definition, so the same
//! four-way classification applies per target and the resulting tasks run on
//! the same task runner as organization updates.

use crate::state::{StateAccessor, TargetBinding, target_key};
use crate::tasks::TaskAction;
use async_trait::async_trait;
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use taskgraph::{Inputs, Task, TaskGraph, TaskOutput};

/// A named, hashed workload of some plugin type
#[derive(Debug, Clone, PartialEq)]
pub struct PluginWorkload {
    pub plugin_type: String,
    pub name: String,
    pub hash: String,
    /// Plugin-specific settings
    pub definition: serde_json::Value,
}

impl PluginWorkload {
    /// Workload whose hash covers its type, name and definition
    pub fn new(plugin_type: impl Into<String>, name: impl Into<String>, definition: serde_json::Value) -> Self {
        let plugin_type = plugin_type.into();
        let name = name.into();
        let hash = workload_hash(&plugin_type, &name, &definition);
        Self {
            plugin_type,
            name,
            hash,
            definition,
        }
    }
}

/// Digest of everything that makes two deployments of a workload equal
pub fn workload_hash(plugin_type: &str, name: &str, definition: &serde_json::Value) -> String {
    let mut hasher = Hasher::new();
    for part in [plugin_type, name, &definition.to_string()] {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1e");
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PluginTarget {
    pub account_id: String,
    pub region: String,
}

impl fmt::Display for PluginTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.region)
    }
}

/// Deploys and removes workloads on one target
#[async_trait]
pub trait PluginExecutor: Send + Sync {
    async fn perform_create_or_update(
        &self,
        workload: &PluginWorkload,
        target: &PluginTarget,
    ) -> anyhow::Result<()>;

    async fn perform_delete(&self, workload: &PluginWorkload, target: &PluginTarget) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginTaskKey {
    pub plugin_type: String,
    pub name: String,
    pub target: PluginTarget,
    pub action: TaskAction,
}

impl fmt::Display for PluginTaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} workload {} in account {} ({})",
            self.action, self.plugin_type, self.name, self.target.account_id, self.target.region
        )
    }
}

/// Deploys or removes a workload on one target, then records the outcome
pub struct PluginTask {
    key: PluginTaskKey,
    workload: Arc<PluginWorkload>,
    executor: Arc<dyn PluginExecutor>,
    state: Arc<dyn StateAccessor>,
}

impl PluginTask {
    pub fn target(&self) -> &PluginTarget {
        &self.key.target
    }
}

#[async_trait]
impl Task for PluginTask {
    type Key = PluginTaskKey;

    fn key(&self) -> PluginTaskKey {
        self.key.clone()
    }

    async fn perform(&self, _inputs: &Inputs<'_, PluginTaskKey>) -> anyhow::Result<TaskOutput> {
        let workload = self.workload.as_ref();
        let target = &self.key.target;

        if self.key.action == TaskAction::Delete {
            self.executor.perform_delete(workload, target).await?;
            self.state.remove_target(&target_key(
                &workload.plugin_type,
                &workload.name,
                &target.account_id,
                &target.region,
            ));
        } else {
            self.executor.perform_create_or_update(workload, target).await?;
            self.state.set_target(TargetBinding {
                plugin_type: workload.plugin_type.clone(),
                name: workload.name.clone(),
                account_id: target.account_id.clone(),
                region: target.region.clone(),
                last_committed_hash: workload.hash.clone(),
            });
        }
        Ok(TaskOutput::None)
    }
}

/// Binds a workload to its selected targets
pub struct PluginBinder {
    workload: Arc<PluginWorkload>,
    targets: Vec<PluginTarget>,
    state: Arc<dyn StateAccessor>,
    executor: Arc<dyn PluginExecutor>,
}

impl PluginBinder {
    pub fn new(
        workload: PluginWorkload,
        targets: Vec<PluginTarget>,
        state: Arc<dyn StateAccessor>,
        executor: Arc<dyn PluginExecutor>,
    ) -> Self {
        Self {
            workload: Arc::new(workload),
            targets,
            state,
            executor,
        }
    }

    /// Required action per target; unchanged targets are left out
    pub fn changes(&self) -> Vec<(PluginTarget, TaskAction)> {
        let workload = &self.workload;
        let mut changes = Vec::new();
        let mut selected = HashSet::new();

        for target in &self.targets {
            if !selected.insert(target.clone()) {
                continue;
            }
            let key = target_key(&workload.plugin_type, &workload.name, &target.account_id, &target.region);
            match self.state.get_target(&key) {
                None => changes.push((target.clone(), TaskAction::Create)),
                Some(bound) if bound.last_committed_hash != workload.hash => {
                    changes.push((target.clone(), TaskAction::Update));
                }
                Some(_) => {}
            }
        }

        let mut removed: Vec<PluginTarget> = self
            .state
            .enum_targets(&workload.plugin_type, &workload.name)
            .into_iter()
            .map(|bound| PluginTarget {
                account_id: bound.account_id,
                region: bound.region,
            })
            .filter(|target| !selected.contains(target))
            .collect();
        removed.sort();
        changes.extend(removed.into_iter().map(|t| (t, TaskAction::Delete)));
        changes
    }

    /// One task per target that needs a change, with no edges between them
    pub fn enum_tasks(&self) -> TaskGraph<PluginTask> {
        let mut graph = TaskGraph::new();
        for (target, action) in self.changes() {
            graph.add(PluginTask {
                key: PluginTaskKey {
                    plugin_type: self.workload.plugin_type.clone(),
                    name: self.workload.name.clone(),
                    target,
                    action,
                },
                workload: Arc::clone(&self.workload),
                executor: Arc::clone(&self.executor),
                state: Arc::clone(&self.state),
            });
        }
        graph
    }
}
