//! Command implementations

pub mod plan;
pub mod state;
pub mod update;
pub mod workload;

use anyhow::Result;
use orgbinder::{
    InMemoryOrganization, OrganizationBinder, OrganizationWriter, SharedState, StateAccessor,
    TaskProvider, TemplateRoot,
};
use std::fmt::{Debug, Display};
use std::path::PathBuf;
use std::sync::Arc;
use taskgraph::RunError;

use crate::Context;
use crate::config::Settings;
use crate::state::{self as state_file, StateFile};

/// Settings, state file and simulated organization for one command
pub struct Session {
    pub settings: Settings,
    pub state_path: PathBuf,
    pub file: StateFile,
    pub shared: SharedState,
    pub organization: Arc<InMemoryOrganization>,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let settings = Settings::load()?;
        let state_path = match &ctx.state {
            Some(path) => path.clone(),
            None => settings.state_path()?,
        };
        let file = StateFile::load(&state_path)?;
        let shared = file.shared();
        let organization = Arc::new(InMemoryOrganization::from_snapshot(
            state_file::load_organization(&state_path)?,
        ));

        Ok(Self {
            settings,
            state_path,
            file,
            shared,
            organization,
        })
    }

    /// Bind `template` against the recorded state, writing to the simulated organization
    pub fn bind<'t>(&self, template: &'t TemplateRoot) -> Result<OrganizationBinder<'t>> {
        let state: Arc<dyn StateAccessor> = Arc::new(self.shared.clone());
        let writer: Arc<dyn OrganizationWriter> = self.organization.clone();
        let provider = TaskProvider::new(template, Arc::clone(&state), writer)?;
        Ok(OrganizationBinder::new(template, state, provider)?)
    }

    /// Write state and the simulated organization back to disk
    pub fn flush(&mut self) -> Result<()> {
        self.file.save(&self.state_path, &self.shared)?;
        state_file::save_organization(&self.state_path, &self.organization.snapshot())
    }
}

/// Whether the run was refused before any task was dispatched
///
/// Such runs leave the state file untouched.
pub fn never_started<K, T>(result: &Result<T>) -> bool
where
    K: Debug + Display + Send + Sync + 'static,
{
    result.as_ref().is_err_and(|err| {
        err.downcast_ref::<RunError<K>>()
            .is_some_and(RunError::is_structural)
    })
}

/// Combine a run outcome with the flush that follows it
///
/// A run error wins over a flush error; the flush error is still logged.
pub fn after_flush<T>(result: Result<T>, flushed: Result<()>) -> Result<T> {
    match (result, flushed) {
        (Err(run), Err(flush)) => {
            log::error!("Failed to save state: {flush:#}");
            Err(run)
        }
        (Err(run), Ok(())) => Err(run),
        (Ok(_), Err(flush)) => Err(flush),
        (Ok(value), Ok(())) => Ok(value),
    }
}
