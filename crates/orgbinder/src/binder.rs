//! Binder - classifies template resources against recorded state
//!
//! Every resource kind goes through the same four-way classification:
//!
//! | template | state | hash      | action   |
//! |----------|-------|-----------|----------|
//! | present  | none  |           | `Create` |
//! | present  | bound | differs   | `Update` |
//! | present  | bound | equal     | `None`   |
//! | absent   | bound |           | `Delete` |

use crate::error::{Error, Result};
use crate::model::{
    AccountResource, OrganizationRootResource, OrganizationalUnitResource, PolicyResource,
    Resource, ResourceType, TemplateRoot,
};
use crate::state::{StateAccessor, StateBinding};
use crate::tasks::{OrgTask, TaskProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use taskgraph::TaskGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingAction {
    Create,
    Update,
    Delete,
    None,
}

impl fmt::Display for BindingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::None => "None",
        };
        f.write_str(name)
    }
}

/// Outcome of classifying one resource
#[derive(Debug, Clone)]
pub enum Change<'t, R> {
    Create {
        resource: &'t R,
        hash: String,
    },
    Update {
        resource: &'t R,
        state: StateBinding,
        hash: String,
    },
    Delete {
        state: StateBinding,
    },
    Unchanged {
        resource: &'t R,
        state: StateBinding,
    },
}

/// A classified resource
#[derive(Debug, Clone)]
pub struct Binding<'t, R> {
    pub resource_type: ResourceType,
    pub logical_id: String,
    pub change: Change<'t, R>,
}

impl<'t, R> Binding<'t, R> {
    pub fn action(&self) -> BindingAction {
        match self.change {
            Change::Create { .. } => BindingAction::Create,
            Change::Update { .. } => BindingAction::Update,
            Change::Delete { .. } => BindingAction::Delete,
            Change::Unchanged { .. } => BindingAction::None,
        }
    }

    /// Template resource, absent for deletions
    pub fn template(&self) -> Option<&'t R> {
        match self.change {
            Change::Create { resource, .. }
            | Change::Update { resource, .. }
            | Change::Unchanged { resource, .. } => Some(resource),
            Change::Delete { .. } => None,
        }
    }

    /// Recorded binding, absent for creations
    pub fn state(&self) -> Option<&StateBinding> {
        match &self.change {
            Change::Update { state, .. }
            | Change::Delete { state }
            | Change::Unchanged { state, .. } => Some(state),
            Change::Create { .. } => None,
        }
    }

    /// Hash to commit once the change has been applied
    pub fn hash(&self) -> Option<&str> {
        match &self.change {
            Change::Create { hash, .. } | Change::Update { hash, .. } => Some(hash.as_str()),
            Change::Unchanged { state, .. } => Some(state.last_committed_hash.as_str()),
            Change::Delete { .. } => None,
        }
    }
}

/// Classify every resource of one kind
///
/// Bindings for template resources come first, in template order, followed
/// by deletions ordered by logical id.
pub fn classify<'t, R, I>(
    resource_type: ResourceType,
    resources: I,
    state: &dyn StateAccessor,
) -> Vec<Binding<'t, R>>
where
    R: Resource + 't,
    I: IntoIterator<Item = &'t R>,
{
    let mut bindings = Vec::new();
    let mut present = HashSet::new();

    for resource in resources {
        let logical_id = resource.logical_id().to_string();
        present.insert(logical_id.clone());
        let hash = resource.content_hash();

        let change = match state.get_binding(resource_type, &logical_id) {
            None => Change::Create { resource, hash },
            Some(recorded) if recorded.last_committed_hash != hash => Change::Update {
                resource,
                state: recorded,
                hash,
            },
            Some(recorded) => Change::Unchanged {
                resource,
                state: recorded,
            },
        };
        bindings.push(Binding {
            resource_type,
            logical_id,
            change,
        });
    }

    for recorded in state.enum_bindings(resource_type) {
        if !present.contains(&recorded.logical_id) {
            bindings.push(Binding {
                resource_type,
                logical_id: recorded.logical_id.clone(),
                change: Change::Delete { state: recorded },
            });
        }
    }

    bindings
}

/// Type, id and action of a binding, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSummary {
    pub resource_type: ResourceType,
    pub logical_id: String,
    pub action: BindingAction,
}

/// Bindings for every category of an organization
#[derive(Debug, Clone)]
pub struct OrganizationBindings<'t> {
    pub policies: Vec<Binding<'t, PolicyResource>>,
    pub accounts: Vec<Binding<'t, AccountResource>>,
    pub organizational_units: Vec<Binding<'t, OrganizationalUnitResource>>,
    pub master_account: Vec<Binding<'t, AccountResource>>,
    pub organization_root: Vec<Binding<'t, OrganizationRootResource>>,
}

impl OrganizationBindings<'_> {
    /// Every binding in task order, unchanged ones included
    pub fn summaries(&self) -> Vec<BindingSummary> {
        fn collect<R>(out: &mut Vec<BindingSummary>, bindings: &[Binding<'_, R>]) {
            out.extend(bindings.iter().map(|b| BindingSummary {
                resource_type: b.resource_type,
                logical_id: b.logical_id.clone(),
                action: b.action(),
            }));
        }

        let mut out = Vec::new();
        collect(&mut out, &self.policies);
        collect(&mut out, &self.accounts);
        collect(&mut out, &self.organizational_units);
        collect(&mut out, &self.master_account);
        collect(&mut out, &self.organization_root);
        out
    }

    /// Whether anything needs to change
    pub fn has_changes(&self) -> bool {
        self.summaries()
            .iter()
            .any(|s| s.action != BindingAction::None)
    }
}

/// Binds one template to recorded state and plans the update
pub struct OrganizationBinder<'t> {
    template: &'t TemplateRoot,
    state: Arc<dyn StateAccessor>,
    provider: TaskProvider,
}

impl<'t> OrganizationBinder<'t> {
    /// Refuses state recorded for another organization and invalid templates
    pub fn new(
        template: &'t TemplateRoot,
        state: Arc<dyn StateAccessor>,
        provider: TaskProvider,
    ) -> Result<Self> {
        if let (Some(recorded), Some(current)) =
            (state.master_account_id(), template.master_account_id())
            && recorded != current
        {
            return Err(Error::OrganizationMismatch {
                state: recorded,
                template: current.to_string(),
            });
        }
        template.validate()?;

        Ok(Self {
            template,
            state,
            provider,
        })
    }

    pub fn bindings(&self) -> OrganizationBindings<'t> {
        let template: &'t TemplateRoot = self.template;
        let org = &template.organization;
        let state = self.state.as_ref();
        OrganizationBindings {
            policies: classify(ResourceType::ServiceControlPolicy, &org.policies, state),
            accounts: classify(ResourceType::Account, &org.accounts, state),
            organizational_units: classify(
                ResourceType::OrganizationalUnit,
                &org.organizational_units,
                state,
            ),
            master_account: classify(
                ResourceType::MasterAccount,
                org.master_account.as_ref(),
                state,
            ),
            organization_root: classify(
                ResourceType::OrganizationRoot,
                org.organization_root.as_ref(),
                state,
            ),
        }
    }

    /// Build the task graph for every binding that needs a change
    pub fn enum_tasks(&self) -> TaskGraph<OrgTask> {
        let bindings = self.bindings();
        let provider = &self.provider;
        let mut graph = TaskGraph::new();

        for binding in &bindings.policies {
            match &binding.change {
                Change::Create { resource, hash } => {
                    provider.policy_create(&mut graph, resource, hash);
                }
                Change::Update {
                    resource,
                    state,
                    hash,
                } => {
                    provider.policy_update(&mut graph, resource, &state.physical_id, hash);
                }
                Change::Delete { state } => {
                    provider.policy_delete(&mut graph, state);
                }
                Change::Unchanged { .. } => {}
            }
        }

        for binding in bindings.accounts.iter().chain(&bindings.master_account) {
            match &binding.change {
                Change::Create { resource, hash } => {
                    provider.account_create(&mut graph, binding.resource_type, resource, hash);
                }
                Change::Update {
                    resource,
                    state,
                    hash,
                } => {
                    provider.account_update(
                        &mut graph,
                        binding.resource_type,
                        resource,
                        &state.physical_id,
                        hash,
                    );
                }
                Change::Delete { state } => {
                    provider.forget(&mut graph, state);
                }
                Change::Unchanged { .. } => {}
            }
        }

        for binding in &bindings.organizational_units {
            match &binding.change {
                Change::Create { resource, hash } => {
                    provider.organizational_unit_create(&mut graph, resource, hash);
                }
                Change::Update {
                    resource,
                    state,
                    hash,
                } => {
                    provider.organizational_unit_update(&mut graph, resource, &state.physical_id, hash);
                }
                Change::Delete { state } => {
                    provider.organizational_unit_delete(&mut graph, state);
                }
                Change::Unchanged { .. } => {}
            }
        }

        for binding in &bindings.organization_root {
            match &binding.change {
                Change::Create { resource, hash } => {
                    provider.root_create(&mut graph, resource, hash);
                }
                Change::Update {
                    resource,
                    state,
                    hash,
                } => {
                    provider.root_update(&mut graph, resource, &state.physical_id, hash);
                }
                Change::Delete { state } => {
                    provider.forget(&mut graph, state);
                }
                Change::Unchanged { .. } => {}
            }
        }

        provider.order_deletions(&mut graph);
        log::debug!("Planned {} tasks", graph.len());
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;
    use crate::state::SharedState;
    use crate::tasks::TaskAction;
    use crate::writer::InMemoryOrganization;
    use std::sync::Mutex;
    use taskgraph::{RunDelegate, RunError, RunOptions, Task, TaskOutput};

    const ENGINEERING: &str = r#"
[[organization.organizational_units]]
logical_id = "Engineering"
name = "Engineering"
policies = [{ ref = "DenyRoot" }]

[[organization.policies]]
logical_id = "DenyRoot"
name = "deny-root"
document = { Statement = [] }
"#;

    struct Fixture {
        state: SharedState,
        org: Arc<InMemoryOrganization>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: SharedState::default(),
                org: Arc::new(InMemoryOrganization::new()),
            }
        }

        fn binder<'t>(&self, template: &'t TemplateRoot) -> Result<OrganizationBinder<'t>> {
            let state: Arc<dyn StateAccessor> = Arc::new(self.state.clone());
            let provider = TaskProvider::new(template, Arc::clone(&state), self.org.clone())?;
            OrganizationBinder::new(template, state, provider)
        }

        /// Plan and run `template`, recording it as the previous template
        async fn apply(&self, template: &TemplateRoot) -> Vec<String> {
            let graph = self.binder(template).unwrap().enum_tasks();
            let journal = Journal::default();
            let summary = taskgraph::run(&graph, &RunOptions::new(4, 0), &journal)
                .await
                .unwrap();
            assert_eq!(summary.failed, 0);
            self.state.set_previous_template(template.to_json().unwrap());
            journal.events()
        }
    }

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
    }

    impl Journal {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RunDelegate<OrgTask> for Journal {
        fn on_task_started(&self, task: &OrgTask) {
            self.events.lock().unwrap().push(format!("start {}", task.key()));
        }

        fn on_task_succeeded(&self, task: &OrgTask, _output: &TaskOutput) {
            self.events.lock().unwrap().push(format!("done {}", task.key()));
        }

        fn on_task_failed(&self, task: &OrgTask, _error: &anyhow::Error) {
            self.events.lock().unwrap().push(format!("failed {}", task.key()));
        }

        fn on_task_skipped(&self, task: &OrgTask, _failed: &OrgTask) {
            self.events.lock().unwrap().push(format!("skipped {}", task.key()));
        }
    }

    fn position(events: &[String], event: &str) -> usize {
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing {event} in {events:?}"))
    }

    fn keys(graph: &TaskGraph<OrgTask>) -> Vec<String> {
        graph.tasks().map(|(_, t)| t.key().to_string()).collect()
    }

    #[test]
    fn test_everything_is_created_without_state() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        let bindings = fixture.binder(&template).unwrap().bindings();

        let actions: Vec<_> = bindings.summaries().iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![BindingAction::Create, BindingAction::Create]);
        assert!(bindings.policies[0].state().is_none());
        assert!(bindings.policies[0].hash().is_some());
    }

    #[test]
    fn test_engineering_task_shape() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        let graph = fixture.binder(&template).unwrap().enum_tasks();

        assert_eq!(
            keys(&graph),
            vec![
                "Create DenyRoot (OC::ORG::ServiceControlPolicy)",
                "CommitHash DenyRoot (OC::ORG::ServiceControlPolicy)",
                "Create Engineering (OC::ORG::OrganizationalUnit)",
                "Relate Engineering (OC::ORG::OrganizationalUnit)",
                "CommitHash Engineering (OC::ORG::OrganizationalUnit)",
            ]
        );
    }

    #[tokio::test]
    async fn test_engineering_runs_in_dependency_order() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        let events = fixture.apply(&template).await;

        let policy_created = position(&events, "done Create DenyRoot (OC::ORG::ServiceControlPolicy)");
        let relate_started = position(&events, "start Relate Engineering (OC::ORG::OrganizationalUnit)");
        let ou_created = position(&events, "done Create Engineering (OC::ORG::OrganizationalUnit)");
        assert!(policy_created < relate_started);
        assert!(ou_created < relate_started);
        let relate_done = position(&events, "done Relate Engineering (OC::ORG::OrganizationalUnit)");
        let ou_commit = position(&events, "start CommitHash Engineering (OC::ORG::OrganizationalUnit)");
        assert!(relate_done < ou_commit);

        let ou = fixture
            .state
            .get_binding(ResourceType::OrganizationalUnit, "Engineering")
            .unwrap();
        let policy = fixture
            .state
            .get_binding(ResourceType::ServiceControlPolicy, "DenyRoot")
            .unwrap();
        assert_eq!(fixture.org.attached_policies(&ou.physical_id), vec![policy.physical_id]);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        fixture.apply(&template).await;

        let binder = fixture.binder(&template).unwrap();
        let bindings = binder.bindings();
        assert!(!bindings.has_changes());
        assert!(bindings.summaries().iter().all(|s| s.action == BindingAction::None));
        assert!(binder.enum_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_removed_resources_are_deleted_or_forgotten() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        fixture.apply(&template).await;
        fixture.state.set_binding(StateBinding {
            resource_type: ResourceType::Account,
            logical_id: "Legacy".into(),
            physical_id: "999".into(),
            last_committed_hash: "h".into(),
        });

        let empty = TemplateRoot::empty();
        let binder = fixture.binder(&empty).unwrap();
        let actions: Vec<_> = binder.bindings().summaries().iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![BindingAction::Delete; 3]);

        let graph = binder.enum_tasks();
        assert_eq!(
            keys(&graph),
            vec![
                "Delete DenyRoot (OC::ORG::ServiceControlPolicy)",
                "Forget Legacy (OC::ORG::Account)",
                "Delete Engineering (OC::ORG::OrganizationalUnit)",
            ]
        );

        taskgraph::run(&graph, &RunOptions::new(1, 0), &taskgraph::NoopDelegate)
            .await
            .unwrap();
        assert_eq!(fixture.state.snapshot().binding_count(), 0);
        assert!(fixture.org.snapshot().policies.is_empty());
    }

    #[tokio::test]
    async fn test_removing_account_from_ou_emits_single_detach() {
        let fixture = Fixture::new();
        let with_member = TemplateRoot::from_toml(
            r#"
[[organization.accounts]]
logical_id = "Dev"
name = "dev"
email = "dev@example.com"

[[organization.organizational_units]]
logical_id = "Engineering"
name = "Engineering"
accounts = [{ ref = "Dev" }]
"#,
        )
        .unwrap();
        let events = fixture.apply(&with_member).await;
        assert!(
            position(&events, "done Create Dev (OC::ORG::Account)")
                < position(&events, "start Relate Engineering (OC::ORG::OrganizationalUnit)")
        );
        let dev = fixture.state.get_binding(ResourceType::Account, "Dev").unwrap();
        let ou = fixture
            .state
            .get_binding(ResourceType::OrganizationalUnit, "Engineering")
            .unwrap();
        assert_eq!(fixture.org.parent_of(&dev.physical_id), Some(ou.physical_id.clone()));

        let mut without_member = with_member.clone();
        without_member.organization.organizational_units[0].accounts.clear();
        let graph = fixture.binder(&without_member).unwrap().enum_tasks();
        let actions: Vec<_> = graph.tasks().map(|(_, t)| t.key().action).collect();
        assert_eq!(actions, vec![TaskAction::Relate, TaskAction::CommitHash]);

        taskgraph::run(&graph, &RunOptions::default(), &taskgraph::NoopDelegate)
            .await
            .unwrap();
        assert_ne!(fixture.org.parent_of(&dev.physical_id), Some(ou.physical_id));
    }

    #[tokio::test]
    async fn test_policy_is_deleted_after_its_last_detach() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        fixture.apply(&template).await;

        let mut without_policy = template.clone();
        without_policy.organization.policies.clear();
        without_policy.organization.organizational_units[0].policies.clear();
        let graph = fixture.binder(&without_policy).unwrap().enum_tasks();
        assert_eq!(
            keys(&graph),
            vec![
                "Delete DenyRoot (OC::ORG::ServiceControlPolicy)",
                "Relate Engineering (OC::ORG::OrganizationalUnit)",
                "CommitHash Engineering (OC::ORG::OrganizationalUnit)",
            ]
        );

        let events = fixture.apply(&without_policy).await;
        assert!(
            position(&events, "done Relate Engineering (OC::ORG::OrganizationalUnit)")
                < position(&events, "start Delete DenyRoot (OC::ORG::ServiceControlPolicy)")
        );
        let organization = fixture.org.snapshot();
        assert!(organization.policies.is_empty());
        assert!(organization.attachments.is_empty());
        assert!(
            fixture
                .state
                .get_binding(ResourceType::ServiceControlPolicy, "DenyRoot")
                .is_none()
        );
        assert!(!fixture.binder(&without_policy).unwrap().bindings().has_changes());
    }

    #[tokio::test]
    async fn test_unit_is_deleted_after_its_accounts_move_out() {
        let fixture = Fixture::new();
        let before = TemplateRoot::from_toml(
            r#"
[[organization.accounts]]
logical_id = "Dev"
name = "dev"
email = "dev@example.com"

[[organization.organizational_units]]
logical_id = "Legacy"
name = "Legacy"
accounts = [{ ref = "Dev" }]

[[organization.organizational_units]]
logical_id = "Platform"
name = "Platform"
"#,
        )
        .unwrap();
        fixture.apply(&before).await;

        let mut after = before.clone();
        after.organization.organizational_units.remove(0);
        after.organization.organizational_units[0]
            .accounts
            .push(Reference::logical("Dev"));
        let graph = fixture.binder(&after).unwrap().enum_tasks();
        assert_eq!(
            keys(&graph),
            vec![
                "Relate Platform (OC::ORG::OrganizationalUnit)",
                "CommitHash Platform (OC::ORG::OrganizationalUnit)",
                "Delete Legacy (OC::ORG::OrganizationalUnit)",
            ]
        );

        let events = fixture.apply(&after).await;
        assert!(
            position(&events, "done Relate Platform (OC::ORG::OrganizationalUnit)")
                < position(&events, "start Delete Legacy (OC::ORG::OrganizationalUnit)")
        );
        let dev = fixture.state.get_binding(ResourceType::Account, "Dev").unwrap();
        let platform = fixture
            .state
            .get_binding(ResourceType::OrganizationalUnit, "Platform")
            .unwrap();
        assert_eq!(fixture.org.parent_of(&dev.physical_id), Some(platform.physical_id));
        assert!(
            fixture
                .state
                .get_binding(ResourceType::OrganizationalUnit, "Legacy")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_policy_skips_its_attachment() {
        let fixture = Fixture::new();
        fixture.org.fail_on("create_policy");
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        let graph = fixture.binder(&template).unwrap().enum_tasks();
        let journal = Journal::default();

        let summary = taskgraph::run(&graph, &RunOptions::new(4, 1), &journal)
            .await
            .unwrap();

        assert_eq!((summary.succeeded, summary.failed, summary.skipped), (1, 1, 3));
        let events = journal.events();
        assert!(events.contains(&"skipped Relate Engineering (OC::ORG::OrganizationalUnit)".to_string()));
        assert!(events.contains(&"skipped CommitHash DenyRoot (OC::ORG::ServiceControlPolicy)".to_string()));
        assert!(fixture.state.snapshot().bindings.is_empty());
    }

    #[tokio::test]
    async fn test_failure_over_tolerance_is_reported() {
        let fixture = Fixture::new();
        fixture.org.fail_on("create_policy");
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        let graph = fixture.binder(&template).unwrap().enum_tasks();

        let err = taskgraph::run(&graph, &RunOptions::new(1, 0), &taskgraph::NoopDelegate)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::ToleranceExceeded { failed: 1, tolerance: 0, .. }));
    }

    #[test]
    fn test_changed_hash_is_update() {
        let fixture = Fixture::new();
        let template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        fixture.state.set_binding(StateBinding {
            resource_type: ResourceType::ServiceControlPolicy,
            logical_id: "DenyRoot".into(),
            physical_id: "p-1".into(),
            last_committed_hash: "stale".into(),
        });

        let bindings = fixture.binder(&template).unwrap().bindings();
        assert_eq!(bindings.policies[0].action(), BindingAction::Update);
        assert_eq!(bindings.policies[0].state().unwrap().physical_id, "p-1");
    }

    #[test]
    fn test_organization_mismatch_is_refused() {
        let fixture = Fixture::new();
        fixture.state.set_master_account_id("222222222222".into());
        let template = TemplateRoot::from_json(
            r#"{"organization":{"master_account":{"logical_id":"Master","account_id":"111111111111","name":"m"}}}"#,
        )
        .unwrap();

        let err = fixture.binder(&template).err().unwrap();
        assert!(matches!(err, Error::OrganizationMismatch { .. }));
        assert!(err.to_string().contains("same organization"));
    }

    #[test]
    fn test_invalid_template_is_refused() {
        let fixture = Fixture::new();
        let mut template = TemplateRoot::from_toml(ENGINEERING).unwrap();
        template.organization.organizational_units[0]
            .policies
            .push(Reference::logical("Nope"));

        assert!(matches!(fixture.binder(&template).err(), Some(Error::InvalidTemplate(_))));
    }

    #[test]
    fn test_singletons_follow_four_way_classification() {
        let fixture = Fixture::new();
        fixture.state.set_binding(StateBinding {
            resource_type: ResourceType::OrganizationRoot,
            logical_id: "Root".into(),
            physical_id: "r-1".into(),
            last_committed_hash: "h".into(),
        });
        let template = TemplateRoot::empty();
        let binder = fixture.binder(&template).unwrap();

        let bindings = binder.bindings();
        assert_eq!(bindings.organization_root.len(), 1);
        assert_eq!(bindings.organization_root[0].action(), BindingAction::Delete);
        assert_eq!(keys(&binder.enum_tasks()), vec!["Forget Root (OC::ORG::OrganizationRoot)"]);
    }
}
