//! # Orgbinder
//!
//! Reconciles an organization template (accounts, organizational units,
//! service control policies, root) against recorded state and turns the
//! differences into a task graph for [`taskgraph::run`].
//!
//! ## Flow
//!
//! 1. [`OrganizationBinder::new`] validates the template and checks that the
//!    state belongs to the same organization.
//! 2. [`OrganizationBinder::bindings`] classifies every resource as create,
//!    update, delete or unchanged by comparing content hashes.
//! 3. [`OrganizationBinder::enum_tasks`] asks the [`TaskProvider`] for the
//!    tasks of each changed binding and wires their dependencies.
//! 4. Tasks write through an [`OrganizationWriter`] and commit bindings back
//!    through a [`StateAccessor`].
//!
//! Plugin workloads ([`PluginBinder`]) follow the same pattern per
//! account/region target.

pub mod binder;
pub mod error;
pub mod model;
pub mod plugin;
pub mod state;
pub mod tasks;
pub mod writer;

pub use binder::{BindingAction, BindingSummary, OrganizationBinder, OrganizationBindings};
pub use error::{Error, Result};
pub use model::{
    AccountResource, Organization, OrganizationRootResource, OrganizationalUnitResource, PolicyResource,
    Reference, Resource, ResourceType, TemplateRoot,
};
pub use plugin::{PluginBinder, PluginExecutor, PluginTarget, PluginTask, PluginWorkload};
pub use state::{PersistedState, SharedState, StateAccessor, StateBinding, TargetBinding};
pub use tasks::{OrgTask, OrgTaskKey, TaskAction, TaskProvider};
pub use writer::{InMemoryOrganization, OrganizationWriter, SimulatedOrganization};
