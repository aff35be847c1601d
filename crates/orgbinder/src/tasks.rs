//! Task provider
//!
//! Expands classified bindings into tasks. Every resource gets a subgraph of
//! the shape
//!
//! ```text
//! Create / Update ──► Relate (attach / detach) ──► CommitHash
//! ```
//!
//! where `CommitHash` depends on every other task for the resource, so the
//! binding is only committed once all of them succeeded. A `Relate` task whose
//! related resource is created in the same run carries a deferred edge on that
//! resource's `Create` task and reads the issued id from its output.
//!
//! Deletions run last for what they release: a deleted policy waits for its
//! detach tasks, a deleted organizational unit for the moves of its former
//! accounts.

use crate::model::{
    AccountResource, OrganizationRootResource, OrganizationalUnitResource, PolicyResource,
    Reference, ResourceType, TemplateRoot,
};
use crate::state::{StateAccessor, StateBinding};
use crate::writer::OrganizationWriter;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use taskgraph::{Inputs, Task, TaskGraph, TaskId, TaskOutput};

/// What a task does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskAction {
    Create,
    Update,
    Delete,
    Relate,
    Forget,
    CommitHash,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Relate => "Relate",
            Self::Forget => "Forget",
            Self::CommitHash => "CommitHash",
        };
        f.write_str(name)
    }
}

/// Identity of an organization task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrgTaskKey {
    pub resource_type: ResourceType,
    pub logical_id: String,
    pub action: TaskAction,
}

impl OrgTaskKey {
    pub fn new(resource_type: ResourceType, logical_id: impl Into<String>, action: TaskAction) -> Self {
        Self {
            resource_type,
            logical_id: logical_id.into(),
            action,
        }
    }
}

impl fmt::Display for OrgTaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.action, self.logical_id, self.resource_type)
    }
}

/// Collaborators every task body needs
pub(crate) struct TaskContext {
    writer: Arc<dyn OrganizationWriter>,
    state: Arc<dyn StateAccessor>,
}

/// Where the id of the resource being changed comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Already bound
    Known(String),
    /// Issued by a `Create` task this task depends on
    CreatedBy(OrgTaskKey),
}

impl Target {
    fn resolve(&self, inputs: &Inputs<'_, OrgTaskKey>) -> anyhow::Result<String> {
        match self {
            Self::Known(id) => Ok(id.clone()),
            Self::CreatedBy(key) => inputs
                .get(key)
                .and_then(TaskOutput::physical_id)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("{key} did not produce a physical id")),
        }
    }
}

/// Where the id of the other side of a relationship comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Related {
    Physical(String),
    /// Resolved when the task runs: from the related resource's `Create`
    /// output if it ran in this graph, else from its committed binding
    Logical {
        resource_type: ResourceType,
        logical_id: String,
    },
}

impl Related {
    fn resolve(
        &self,
        inputs: &Inputs<'_, OrgTaskKey>,
        state: &dyn StateAccessor,
    ) -> anyhow::Result<String> {
        match self {
            Self::Physical(id) => Ok(id.clone()),
            Self::Logical {
                resource_type,
                logical_id,
            } => {
                let create = OrgTaskKey::new(*resource_type, logical_id.clone(), TaskAction::Create);
                if let Some(id) = inputs.get(&create).and_then(TaskOutput::physical_id) {
                    return Ok(id.to_string());
                }
                state
                    .get_binding(*resource_type, logical_id)
                    .map(|b| b.physical_id)
                    .ok_or_else(|| anyhow!("{} {logical_id} has no physical id", resource_type.label()))
            }
        }
    }
}

/// The remote call or state change a task makes
#[derive(Debug, Clone)]
pub enum Operation {
    EnsureRoot,
    CreateOrganizationalUnit(OrganizationalUnitResource),
    UpdateOrganizationalUnit {
        resource: OrganizationalUnitResource,
        physical_id: String,
    },
    DeleteOrganizationalUnit(StateBinding),
    CreateAccount(AccountResource),
    UpdateAccount {
        resource: AccountResource,
        physical_id: String,
    },
    CreatePolicy(PolicyResource),
    UpdatePolicy {
        resource: PolicyResource,
        physical_id: String,
    },
    DeletePolicy(StateBinding),
    /// Drop the binding without touching the remote resource
    Forget(StateBinding),
    AttachPolicy { target: Target, policy: Related },
    DetachPolicy { target_id: String, policy_id: String },
    AttachAccount { target: Target, account: Related },
    DetachAccount { target_id: String, account_id: String },
    CommitHash { target: Target, hash: String },
}

/// One step of an organization update
pub struct OrgTask {
    key: OrgTaskKey,
    operation: Operation,
    ctx: Arc<TaskContext>,
}

impl OrgTask {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// One-line description for plans and logs
    pub fn describe(&self) -> String {
        match &self.operation {
            Operation::EnsureRoot => "ensure organization root".into(),
            Operation::CreateOrganizationalUnit(ou) => format!("create organizational unit '{}'", ou.name),
            Operation::UpdateOrganizationalUnit { resource, physical_id } => {
                format!("rename organizational unit {physical_id} to '{}'", resource.name)
            }
            Operation::DeleteOrganizationalUnit(b) => format!("delete organizational unit {}", b.physical_id),
            Operation::CreateAccount(a) => format!("create account '{}'", a.name),
            Operation::UpdateAccount { physical_id, .. } => format!("update account {physical_id}"),
            Operation::CreatePolicy(p) => format!("create policy '{}'", p.name),
            Operation::UpdatePolicy { physical_id, .. } => format!("update policy {physical_id}"),
            Operation::DeletePolicy(b) => format!("delete policy {}", b.physical_id),
            Operation::Forget(b) => format!("forget {} {}", b.resource_type.label(), b.physical_id),
            Operation::AttachPolicy { policy, .. } => format!("attach policy {}", describe_related(policy)),
            Operation::DetachPolicy { policy_id, .. } => format!("detach policy {policy_id}"),
            Operation::AttachAccount { account, .. } => format!("attach account {}", describe_related(account)),
            Operation::DetachAccount { account_id, .. } => format!("detach account {account_id}"),
            Operation::CommitHash { .. } => "commit state".into(),
        }
    }
}

fn describe_related(related: &Related) -> String {
    match related {
        Related::Physical(id) => id.clone(),
        Related::Logical { logical_id, .. } => logical_id.clone(),
    }
}

impl fmt::Debug for OrgTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgTask")
            .field("key", &self.key)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for OrgTask {
    type Key = OrgTaskKey;

    fn key(&self) -> OrgTaskKey {
        self.key.clone()
    }

    async fn perform(&self, inputs: &Inputs<'_, OrgTaskKey>) -> anyhow::Result<TaskOutput> {
        let writer = self.ctx.writer.as_ref();
        let state = self.ctx.state.as_ref();

        match &self.operation {
            Operation::EnsureRoot => Ok(TaskOutput::PhysicalId(writer.ensure_root().await?)),
            Operation::CreateOrganizationalUnit(resource) => {
                let id = writer
                    .create_organizational_unit(resource)
                    .await
                    .with_context(|| format!("creating organizational unit {}", resource.name))?;
                Ok(TaskOutput::PhysicalId(id))
            }
            Operation::UpdateOrganizationalUnit {
                resource,
                physical_id,
            } => {
                writer
                    .update_organizational_unit(resource, physical_id)
                    .await
                    .with_context(|| format!("updating organizational unit {physical_id}"))?;
                Ok(TaskOutput::None)
            }
            Operation::DeleteOrganizationalUnit(binding) => {
                writer
                    .delete_organizational_unit(&binding.physical_id)
                    .await
                    .with_context(|| format!("deleting organizational unit {}", binding.physical_id))?;
                state.remove_binding(binding.resource_type, &binding.logical_id);
                Ok(TaskOutput::None)
            }
            Operation::CreateAccount(resource) => {
                let id = writer
                    .create_account(resource)
                    .await
                    .with_context(|| format!("creating account {}", resource.name))?;
                Ok(TaskOutput::PhysicalId(id))
            }
            Operation::UpdateAccount {
                resource,
                physical_id,
            } => {
                writer
                    .update_account(resource, physical_id)
                    .await
                    .with_context(|| format!("updating account {physical_id}"))?;
                Ok(TaskOutput::None)
            }
            Operation::CreatePolicy(resource) => {
                let id = writer
                    .create_policy(resource)
                    .await
                    .with_context(|| format!("creating policy {}", resource.name))?;
                Ok(TaskOutput::PhysicalId(id))
            }
            Operation::UpdatePolicy {
                resource,
                physical_id,
            } => {
                writer
                    .update_policy(resource, physical_id)
                    .await
                    .with_context(|| format!("updating policy {physical_id}"))?;
                Ok(TaskOutput::None)
            }
            Operation::DeletePolicy(binding) => {
                writer
                    .delete_policy(&binding.physical_id)
                    .await
                    .with_context(|| format!("deleting policy {}", binding.physical_id))?;
                state.remove_binding(binding.resource_type, &binding.logical_id);
                Ok(TaskOutput::None)
            }
            Operation::Forget(binding) => {
                state.remove_binding(binding.resource_type, &binding.logical_id);
                Ok(TaskOutput::None)
            }
            Operation::AttachPolicy { target, policy } => {
                let target_id = target.resolve(inputs)?;
                let policy_id = policy.resolve(inputs, state)?;
                writer
                    .attach_policy(&target_id, &policy_id)
                    .await
                    .with_context(|| format!("attaching policy {policy_id} to {target_id}"))?;
                Ok(TaskOutput::Attachment {
                    target_id,
                    related_id: policy_id,
                })
            }
            Operation::DetachPolicy {
                target_id,
                policy_id,
            } => {
                writer
                    .detach_policy(target_id, policy_id)
                    .await
                    .with_context(|| format!("detaching policy {policy_id} from {target_id}"))?;
                Ok(TaskOutput::None)
            }
            Operation::AttachAccount { target, account } => {
                let target_id = target.resolve(inputs)?;
                let account_id = account.resolve(inputs, state)?;
                writer
                    .attach_account(&target_id, &account_id)
                    .await
                    .with_context(|| format!("moving account {account_id} to {target_id}"))?;
                Ok(TaskOutput::Attachment {
                    target_id,
                    related_id: account_id,
                })
            }
            Operation::DetachAccount {
                target_id,
                account_id,
            } => {
                writer
                    .detach_account(target_id, account_id)
                    .await
                    .with_context(|| format!("moving account {account_id} out of {target_id}"))?;
                Ok(TaskOutput::None)
            }
            Operation::CommitHash { target, hash } => {
                let physical_id = target.resolve(inputs)?;
                state.set_binding(StateBinding {
                    resource_type: self.key.resource_type,
                    logical_id: self.key.logical_id.clone(),
                    physical_id,
                    last_committed_hash: hash.clone(),
                });
                Ok(TaskOutput::None)
            }
        }
    }
}

/// References split by whether an id is known when the graph is built
#[derive(Debug, Default, PartialEq, Eq)]
struct ResolvedIds {
    /// Sorted, deduplicated physical ids
    physical_ids: Vec<String>,
    /// Logical ids with no binding yet
    unresolved: Vec<String>,
}

/// Builds the tasks for classified bindings
pub struct TaskProvider {
    ctx: Arc<TaskContext>,
    previous: TemplateRoot,
    master_logical_ids: Vec<String>,
}

impl TaskProvider {
    /// Create a provider for `current`
    ///
    /// The previous template is read from state; without one, every update is
    /// diffed against empty reference sets.
    pub fn new(
        current: &TemplateRoot,
        state: Arc<dyn StateAccessor>,
        writer: Arc<dyn OrganizationWriter>,
    ) -> crate::Result<Self> {
        let previous = match state.previous_template() {
            Some(text) => TemplateRoot::from_json(&text)?,
            None => TemplateRoot::empty(),
        };
        let master_logical_ids = current
            .organization
            .master_account
            .iter()
            .chain(previous.organization.master_account.iter())
            .map(|m| m.logical_id.clone())
            .collect();

        Ok(Self {
            ctx: Arc::new(TaskContext { writer, state }),
            previous,
            master_logical_ids,
        })
    }

    fn state(&self) -> &dyn StateAccessor {
        self.ctx.state.as_ref()
    }

    fn task(
        &self,
        resource_type: ResourceType,
        logical_id: &str,
        action: TaskAction,
        operation: Operation,
    ) -> OrgTask {
        OrgTask {
            key: OrgTaskKey::new(resource_type, logical_id, action),
            operation,
            ctx: Arc::clone(&self.ctx),
        }
    }

    fn account_type(&self, logical_id: &str) -> ResourceType {
        if self.master_logical_ids.iter().any(|id| id == logical_id) {
            ResourceType::MasterAccount
        } else {
            ResourceType::Account
        }
    }

    /// Split references into known physical ids and unbound logical ids
    fn resolve_ids(&self, references: &[Reference], kind: impl Fn(&str) -> ResourceType) -> ResolvedIds {
        let mut resolved = ResolvedIds::default();
        for reference in references {
            match reference {
                Reference::Physical { physical_id } => resolved.physical_ids.push(physical_id.clone()),
                Reference::Logical { logical_id } => {
                    match self.state().get_binding(kind(logical_id), logical_id) {
                        Some(binding) => resolved.physical_ids.push(binding.physical_id),
                        None => resolved.unresolved.push(logical_id.clone()),
                    }
                }
            }
        }
        resolved.physical_ids.sort();
        resolved.physical_ids.dedup();
        resolved
    }

    fn related(&self, reference: &Reference, kind: ResourceType) -> Related {
        match reference {
            Reference::Physical { physical_id } => Related::Physical(physical_id.clone()),
            Reference::Logical { logical_id } => Related::Logical {
                resource_type: kind,
                logical_id: logical_id.clone(),
            },
        }
    }

    /// Add a relate task, deferring on the related resource's creation when
    /// it has no binding yet
    fn add_relate(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        owner: (ResourceType, &str),
        operation: Operation,
        after: Option<TaskId>,
    ) -> TaskId {
        let pending = match &operation {
            Operation::AttachPolicy {
                policy: Related::Logical {
                    resource_type,
                    logical_id,
                },
                ..
            }
            | Operation::AttachAccount {
                account: Related::Logical {
                    resource_type,
                    logical_id,
                },
                ..
            } if self.state().get_binding(*resource_type, logical_id).is_none() => Some(
                OrgTaskKey::new(*resource_type, logical_id.clone(), TaskAction::Create),
            ),
            _ => None,
        };

        let id = graph.add(self.task(owner.0, owner.1, TaskAction::Relate, operation));
        if let Some(dependency) = after {
            graph.after(id, dependency);
        }
        if let Some(key) = pending {
            graph.defer(id, key);
        }
        id
    }

    fn add_commit(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        owner: (ResourceType, &str),
        target: Target,
        hash: &str,
        dependencies: &[TaskId],
    ) -> TaskId {
        let id = graph.add(self.task(
            owner.0,
            owner.1,
            TaskAction::CommitHash,
            Operation::CommitHash {
                target,
                hash: hash.to_string(),
            },
        ));
        for &dependency in dependencies {
            graph.after(id, dependency);
        }
        id
    }

    /// Attach/detach tasks that turn `previous` into `current`
    fn diff_policies(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        owner: (ResourceType, &str),
        physical_id: &str,
        previous: &[Reference],
        current: &[Reference],
    ) -> Vec<TaskId> {
        let policy_kind = |_: &str| ResourceType::ServiceControlPolicy;
        let before = self.resolve_ids(previous, policy_kind);
        let after = self.resolve_ids(current, policy_kind);
        let mut tasks = Vec::new();

        for id in after.physical_ids.iter().filter(|id| !before.physical_ids.contains(id)) {
            tasks.push(self.add_relate(
                graph,
                owner,
                Operation::AttachPolicy {
                    target: Target::Known(physical_id.to_string()),
                    policy: Related::Physical(id.clone()),
                },
                None,
            ));
        }
        for logical_id in &after.unresolved {
            tasks.push(self.add_relate(
                graph,
                owner,
                Operation::AttachPolicy {
                    target: Target::Known(physical_id.to_string()),
                    policy: Related::Logical {
                        resource_type: ResourceType::ServiceControlPolicy,
                        logical_id: logical_id.clone(),
                    },
                },
                None,
            ));
        }
        for id in before.physical_ids.iter().filter(|id| !after.physical_ids.contains(id)) {
            tasks.push(graph.add(self.task(
                owner.0,
                owner.1,
                TaskAction::Relate,
                Operation::DetachPolicy {
                    target_id: physical_id.to_string(),
                    policy_id: id.clone(),
                },
            )));
        }
        tasks
    }

    /// Attach tasks for every reference of a resource created in this run
    fn attach_policies_to_new(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        owner: (ResourceType, &str),
        create: TaskId,
        policies: &[Reference],
    ) -> Vec<TaskId> {
        let target = Target::CreatedBy(OrgTaskKey::new(owner.0, owner.1, TaskAction::Create));
        policies
            .iter()
            .map(|reference| {
                self.add_relate(
                    graph,
                    owner,
                    Operation::AttachPolicy {
                        target: target.clone(),
                        policy: self.related(reference, ResourceType::ServiceControlPolicy),
                    },
                    Some(create),
                )
            })
            .collect()
    }

    // ========================================================================
    // Organization root
    // ========================================================================

    pub fn root_create(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &OrganizationRootResource,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::OrganizationRoot, resource.logical_id.as_str());
        let create = graph.add(self.task(owner.0, owner.1, TaskAction::Create, Operation::EnsureRoot));
        let mut tasks = vec![create];
        tasks.extend(self.attach_policies_to_new(graph, owner, create, &resource.policies));

        let target = Target::CreatedBy(OrgTaskKey::new(owner.0, owner.1, TaskAction::Create));
        let commit = self.add_commit(graph, owner, target, hash, &tasks);
        tasks.push(commit);
        tasks
    }

    pub fn root_update(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &OrganizationRootResource,
        physical_id: &str,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::OrganizationRoot, resource.logical_id.as_str());
        let previous = self
            .previous
            .organization
            .organization_root
            .as_ref()
            .map(|r| r.policies.as_slice())
            .unwrap_or_default();

        let mut tasks = self.diff_policies(graph, owner, physical_id, previous, &resource.policies);
        let commit = self.add_commit(graph, owner, Target::Known(physical_id.into()), hash, &tasks);
        tasks.push(commit);
        tasks
    }

    // ========================================================================
    // Policies
    // ========================================================================

    pub fn policy_create(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &PolicyResource,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::ServiceControlPolicy, resource.logical_id.as_str());
        let create = graph.add(self.task(
            owner.0,
            owner.1,
            TaskAction::Create,
            Operation::CreatePolicy(resource.clone()),
        ));
        let target = Target::CreatedBy(OrgTaskKey::new(owner.0, owner.1, TaskAction::Create));
        let commit = self.add_commit(graph, owner, target, hash, &[create]);
        vec![create, commit]
    }

    pub fn policy_update(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &PolicyResource,
        physical_id: &str,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::ServiceControlPolicy, resource.logical_id.as_str());
        let update = graph.add(self.task(
            owner.0,
            owner.1,
            TaskAction::Update,
            Operation::UpdatePolicy {
                resource: resource.clone(),
                physical_id: physical_id.to_string(),
            },
        ));
        let commit = self.add_commit(graph, owner, Target::Known(physical_id.into()), hash, &[update]);
        vec![update, commit]
    }

    pub fn policy_delete(&self, graph: &mut TaskGraph<OrgTask>, binding: &StateBinding) -> Vec<TaskId> {
        vec![graph.add(self.task(
            binding.resource_type,
            &binding.logical_id,
            TaskAction::Delete,
            Operation::DeletePolicy(binding.clone()),
        ))]
    }

    // ========================================================================
    // Organizational units
    // ========================================================================

    pub fn organizational_unit_create(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &OrganizationalUnitResource,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::OrganizationalUnit, resource.logical_id.as_str());
        let create = graph.add(self.task(
            owner.0,
            owner.1,
            TaskAction::Create,
            Operation::CreateOrganizationalUnit(resource.clone()),
        ));
        let target = Target::CreatedBy(OrgTaskKey::new(owner.0, owner.1, TaskAction::Create));

        let mut tasks = vec![create];
        tasks.extend(self.attach_policies_to_new(graph, owner, create, &resource.policies));
        for reference in &resource.accounts {
            let kind = reference
                .logical_id()
                .map_or(ResourceType::Account, |id| self.account_type(id));
            tasks.push(self.add_relate(
                graph,
                owner,
                Operation::AttachAccount {
                    target: target.clone(),
                    account: self.related(reference, kind),
                },
                Some(create),
            ));
        }

        let commit = self.add_commit(graph, owner, target, hash, &tasks);
        tasks.push(commit);
        tasks
    }

    pub fn organizational_unit_update(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource: &OrganizationalUnitResource,
        physical_id: &str,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (ResourceType::OrganizationalUnit, resource.logical_id.as_str());
        let previous = self.previous.organizational_unit(&resource.logical_id);
        let mut tasks = Vec::new();

        if previous.is_none_or(|p| p.name != resource.name) {
            tasks.push(graph.add(self.task(
                owner.0,
                owner.1,
                TaskAction::Update,
                Operation::UpdateOrganizationalUnit {
                    resource: resource.clone(),
                    physical_id: physical_id.to_string(),
                },
            )));
        }

        let previous_policies = previous.map(|p| p.policies.as_slice()).unwrap_or_default();
        tasks.extend(self.diff_policies(graph, owner, physical_id, previous_policies, &resource.policies));

        let previous_accounts = previous.map(|p| p.accounts.as_slice()).unwrap_or_default();
        let account_kind = |id: &str| self.account_type(id);
        let before = self.resolve_ids(previous_accounts, account_kind);
        let after = self.resolve_ids(&resource.accounts, account_kind);

        for id in after.physical_ids.iter().filter(|id| !before.physical_ids.contains(id)) {
            tasks.push(self.add_relate(
                graph,
                owner,
                Operation::AttachAccount {
                    target: Target::Known(physical_id.to_string()),
                    account: Related::Physical(id.clone()),
                },
                None,
            ));
        }
        for logical_id in &after.unresolved {
            tasks.push(self.add_relate(
                graph,
                owner,
                Operation::AttachAccount {
                    target: Target::Known(physical_id.to_string()),
                    account: Related::Logical {
                        resource_type: self.account_type(logical_id),
                        logical_id: logical_id.clone(),
                    },
                },
                None,
            ));
        }
        for id in before.physical_ids.iter().filter(|id| !after.physical_ids.contains(id)) {
            tasks.push(graph.add(self.task(
                owner.0,
                owner.1,
                TaskAction::Relate,
                Operation::DetachAccount {
                    target_id: physical_id.to_string(),
                    account_id: id.clone(),
                },
            )));
        }

        let commit = self.add_commit(graph, owner, Target::Known(physical_id.into()), hash, &tasks);
        tasks.push(commit);
        tasks
    }

    pub fn organizational_unit_delete(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        binding: &StateBinding,
    ) -> Vec<TaskId> {
        vec![graph.add(self.task(
            binding.resource_type,
            &binding.logical_id,
            TaskAction::Delete,
            Operation::DeleteOrganizationalUnit(binding.clone()),
        ))]
    }

    // ========================================================================
    // Accounts (including the master account)
    // ========================================================================

    pub fn account_create(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource_type: ResourceType,
        resource: &AccountResource,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (resource_type, resource.logical_id.as_str());
        let create = graph.add(self.task(
            owner.0,
            owner.1,
            TaskAction::Create,
            Operation::CreateAccount(resource.clone()),
        ));
        let mut tasks = vec![create];
        tasks.extend(self.attach_policies_to_new(graph, owner, create, &resource.policies));

        let target = Target::CreatedBy(OrgTaskKey::new(owner.0, owner.1, TaskAction::Create));
        let commit = self.add_commit(graph, owner, target, hash, &tasks);
        tasks.push(commit);
        tasks
    }

    pub fn account_update(
        &self,
        graph: &mut TaskGraph<OrgTask>,
        resource_type: ResourceType,
        resource: &AccountResource,
        physical_id: &str,
        hash: &str,
    ) -> Vec<TaskId> {
        let owner = (resource_type, resource.logical_id.as_str());
        let previous = if resource_type == ResourceType::MasterAccount {
            self.previous.organization.master_account.as_ref()
        } else {
            self.previous.account(&resource.logical_id)
        };
        let mut tasks = Vec::new();

        if previous.is_none_or(|p| p.name != resource.name || p.tags != resource.tags) {
            tasks.push(graph.add(self.task(
                owner.0,
                owner.1,
                TaskAction::Update,
                Operation::UpdateAccount {
                    resource: resource.clone(),
                    physical_id: physical_id.to_string(),
                },
            )));
        }

        let previous_policies = previous.map(|p| p.policies.as_slice()).unwrap_or_default();
        tasks.extend(self.diff_policies(graph, owner, physical_id, previous_policies, &resource.policies));

        let commit = self.add_commit(graph, owner, Target::Known(physical_id.into()), hash, &tasks);
        tasks.push(commit);
        tasks
    }

    /// Drop a binding, leaving the remote resource in place
    pub fn forget(&self, graph: &mut TaskGraph<OrgTask>, binding: &StateBinding) -> Vec<TaskId> {
        vec![graph.add(self.task(
            binding.resource_type,
            &binding.logical_id,
            TaskAction::Forget,
            Operation::Forget(binding.clone()),
        ))]
    }

    // ========================================================================
    // Ordering across resources
    // ========================================================================

    /// Make every deletion wait for the tasks that release the deleted resource
    ///
    /// A policy is deleted only after every detach of that policy, and an
    /// organizational unit only after the accounts it held in the previous
    /// template have been moved elsewhere.
    pub fn order_deletions(&self, graph: &mut TaskGraph<OrgTask>) {
        let mut edges = Vec::new();
        for (delete, task) in graph.tasks() {
            let releases: Box<dyn Fn(&Operation) -> bool + '_> = match task.operation() {
                Operation::DeletePolicy(binding) => {
                    let policy = binding.physical_id.as_str();
                    Box::new(move |op| {
                        matches!(op, Operation::DetachPolicy { policy_id, .. } if policy_id == policy)
                    })
                }
                Operation::DeleteOrganizationalUnit(binding) => {
                    let members = self.previous_members(&binding.logical_id);
                    Box::new(move |op| match op {
                        Operation::AttachAccount { account, .. } => members.contains(account),
                        _ => false,
                    })
                }
                _ => continue,
            };

            edges.extend(
                graph
                    .tasks()
                    .filter(|(_, other)| releases(other.operation()))
                    .map(|(release, _)| (delete, release)),
            );
        }

        for (delete, release) in edges {
            graph.after(delete, release);
        }
    }

    /// Accounts an organizational unit held in the previous template
    fn previous_members(&self, logical_id: &str) -> Members {
        let mut members = Members::default();
        let Some(previous) = self.previous.organizational_unit(logical_id) else {
            return members;
        };
        for reference in &previous.accounts {
            match reference {
                Reference::Physical { physical_id } => {
                    members.physical_ids.push(physical_id.clone());
                }
                Reference::Logical { logical_id } => {
                    if let Some(binding) = self.state().get_binding(self.account_type(logical_id), logical_id) {
                        members.physical_ids.push(binding.physical_id);
                    }
                    members.logical_ids.push(logical_id.clone());
                }
            }
        }
        members
    }
}

#[derive(Debug, Default)]
struct Members {
    physical_ids: Vec<String>,
    logical_ids: Vec<String>,
}

impl Members {
    fn contains(&self, account: &Related) -> bool {
        match account {
            Related::Physical(id) => self.physical_ids.contains(id),
            Related::Logical { logical_id, .. } => self.logical_ids.contains(logical_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SharedState;
    use crate::writer::InMemoryOrganization;
    use std::collections::BTreeMap;

    fn policy(logical_id: &str) -> PolicyResource {
        PolicyResource {
            logical_id: logical_id.into(),
            name: logical_id.to_lowercase(),
            description: None,
            document: serde_json::json!({}),
            tags: BTreeMap::new(),
        }
    }

    fn ou(logical_id: &str, policies: Vec<Reference>, accounts: Vec<Reference>) -> OrganizationalUnitResource {
        OrganizationalUnitResource {
            logical_id: logical_id.into(),
            name: logical_id.into(),
            policies,
            accounts,
        }
    }

    fn bind(state: &SharedState, resource_type: ResourceType, logical_id: &str, physical_id: &str) {
        state.set_binding(StateBinding {
            resource_type,
            logical_id: logical_id.into(),
            physical_id: physical_id.into(),
            last_committed_hash: "old".into(),
        });
    }

    fn provider(current: &TemplateRoot, state: &SharedState) -> TaskProvider {
        TaskProvider::new(
            current,
            Arc::new(state.clone()),
            Arc::new(InMemoryOrganization::new()),
        )
        .unwrap()
    }

    fn keys(graph: &TaskGraph<OrgTask>, ids: &[TaskId]) -> Vec<String> {
        ids.iter().map(|&id| graph.task(id).key().to_string()).collect()
    }

    #[test]
    fn test_policy_create_is_create_then_commit() {
        let state = SharedState::default();
        let provider = provider(&TemplateRoot::empty(), &state);
        let mut graph = TaskGraph::new();

        let ids = provider.policy_create(&mut graph, &policy("DenyRoot"), "h1");
        assert_eq!(
            keys(&graph, &ids),
            vec![
                "Create DenyRoot (OC::ORG::ServiceControlPolicy)",
                "CommitHash DenyRoot (OC::ORG::ServiceControlPolicy)"
            ]
        );
        assert_eq!(graph.explicit_dependencies(ids[1]), &[ids[0]]);
    }

    #[test]
    fn test_ou_create_defers_on_unbound_policy() {
        let state = SharedState::default();
        bind(&state, ResourceType::ServiceControlPolicy, "Bound", "p-bound");
        let provider = provider(&TemplateRoot::empty(), &state);
        let mut graph = TaskGraph::new();

        let resource = ou(
            "Engineering",
            vec![Reference::logical("DenyRoot"), Reference::logical("Bound")],
            vec![],
        );
        let ids = provider.organizational_unit_create(&mut graph, &resource, "h");

        assert_eq!(ids.len(), 4);
        let unbound = ids[1];
        let bound = ids[2];
        assert_eq!(graph.explicit_dependencies(unbound), &[ids[0]]);
        assert_eq!(
            graph.deferred_dependencies(unbound),
            &[OrgTaskKey::new(
                ResourceType::ServiceControlPolicy,
                "DenyRoot",
                TaskAction::Create
            )]
        );
        assert!(graph.deferred_dependencies(bound).is_empty());
        assert_eq!(graph.explicit_dependencies(ids[3]), &ids[..3]);
    }

    #[test]
    fn test_ou_create_attaches_master_account_by_type() {
        let state = SharedState::default();
        let current: TemplateRoot = TemplateRoot::from_json(
            r#"{"organization":{"master_account":{"logical_id":"Master","account_id":"111","name":"m"}}}"#,
        )
        .unwrap();
        let provider = provider(&current, &state);
        let mut graph = TaskGraph::new();

        let resource = ou("Eng", vec![], vec![Reference::logical("Master")]);
        let ids = provider.organizational_unit_create(&mut graph, &resource, "h");
        assert_eq!(
            graph.deferred_dependencies(ids[1]),
            &[OrgTaskKey::new(ResourceType::MasterAccount, "Master", TaskAction::Create)]
        );
    }

    #[test]
    fn test_ou_update_detach_only() {
        let state = SharedState::default();
        bind(&state, ResourceType::Account, "Dev", "222");
        let previous = TemplateRoot {
            organization: crate::model::Organization {
                organizational_units: vec![ou("Eng", vec![], vec![Reference::logical("Dev")])],
                ..Default::default()
            },
        };
        state.set_previous_template(previous.to_json().unwrap());
        let provider = provider(&TemplateRoot::empty(), &state);
        let mut graph = TaskGraph::new();

        let ids = provider.organizational_unit_update(&mut graph, &ou("Eng", vec![], vec![]), "ou-1", "h2");

        assert_eq!(ids.len(), 2);
        assert!(matches!(
            graph.task(ids[0]).operation(),
            Operation::DetachAccount { target_id, account_id } if target_id == "ou-1" && account_id == "222"
        ));
        assert_eq!(graph.task(ids[1]).key().action, TaskAction::CommitHash);
    }

    #[test]
    fn test_update_without_previous_definition() {
        let state = SharedState::default();
        bind(&state, ResourceType::ServiceControlPolicy, "Deny", "p-1");
        let provider = provider(&TemplateRoot::empty(), &state);
        let mut graph = TaskGraph::new();

        let resource = ou("Eng", vec![Reference::logical("Deny")], vec![]);
        let ids = provider.organizational_unit_update(&mut graph, &resource, "ou-1", "h");

        let actions: Vec<_> = ids.iter().map(|&id| graph.task(id).key().action).collect();
        assert_eq!(
            actions,
            vec![TaskAction::Update, TaskAction::Relate, TaskAction::CommitHash]
        );
        assert!(matches!(
            graph.task(ids[1]).operation(),
            Operation::AttachPolicy { policy: Related::Physical(id), .. } if id == "p-1"
        ));
    }

    #[test]
    fn test_account_update_skips_update_when_scalars_match() {
        let state = SharedState::default();
        let account = AccountResource {
            logical_id: "Dev".into(),
            account_id: None,
            name: "dev".into(),
            email: Some("dev@example.com".into()),
            tags: BTreeMap::new(),
            policies: vec![Reference::physical("p-1")],
        };
        let previous = TemplateRoot {
            organization: crate::model::Organization {
                accounts: vec![AccountResource {
                    policies: vec![Reference::physical("p-0")],
                    ..account.clone()
                }],
                ..Default::default()
            },
        };
        state.set_previous_template(previous.to_json().unwrap());
        let provider = provider(&TemplateRoot::empty(), &state);
        let mut graph = TaskGraph::new();

        let ids = provider.account_update(&mut graph, ResourceType::Account, &account, "222", "h");

        let descriptions: Vec<_> = ids.iter().map(|&id| graph.task(id).describe()).collect();
        assert_eq!(
            descriptions,
            vec!["attach policy p-1", "detach policy p-0", "commit state"]
        );
    }

    #[test]
    fn test_resolve_ids_sorts_and_splits() {
        let state = SharedState::default();
        bind(&state, ResourceType::ServiceControlPolicy, "A", "p-a");
        let provider = provider(&TemplateRoot::empty(), &state);

        let resolved = provider.resolve_ids(
            &[
                Reference::physical("p-z"),
                Reference::logical("A"),
                Reference::logical("B"),
                Reference::physical("p-a"),
            ],
            |_| ResourceType::ServiceControlPolicy,
        );
        assert_eq!(resolved.physical_ids, vec!["p-a", "p-z"]);
        assert_eq!(resolved.unresolved, vec!["B"]);
    }

    #[tokio::test]
    async fn test_policy_create_commits_issued_id() {
        let state = SharedState::default();
        bind(&state, ResourceType::ServiceControlPolicy, "Deny", "p-stale");
        let related = Related::Logical {
            resource_type: ResourceType::ServiceControlPolicy,
            logical_id: "Deny".into(),
        };

        assert_eq!(related.resolve(&Inputs::empty(), &state).unwrap(), "p-stale");

        let mut graph = TaskGraph::new();
        let provider = provider(&TemplateRoot::empty(), &state);
        let created = provider.policy_create(&mut graph, &policy("Deny"), "h");
        taskgraph::run(&graph, &taskgraph::RunOptions::default(), &taskgraph::NoopDelegate)
            .await
            .unwrap();
        let fresh = graph.output(created[0]).unwrap().physical_id().unwrap().to_string();
        assert_ne!(fresh, "p-stale");
        assert_eq!(
            state
                .get_binding(ResourceType::ServiceControlPolicy, "Deny")
                .unwrap()
                .physical_id,
            fresh
        );
    }

    #[test]
    fn test_unresolvable_target_fails() {
        let key = OrgTaskKey::new(ResourceType::OrganizationalUnit, "Eng", TaskAction::Create);
        let err = Target::CreatedBy(key).resolve(&Inputs::empty()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Create Eng (OC::ORG::OrganizationalUnit) did not produce a physical id"
        );
    }
}
