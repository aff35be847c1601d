//! State file persistence
//!
//! The state file holds the recorded bindings plus a last-updated timestamp.
//! The simulated organization used by local runs lives beside it, in
//! `<state>.org.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use orgbinder::{PersistedState, SharedState, SimulatedOrganization};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub state: PersistedState,
}

impl StateFile {
    /// Load state from disk, or return an empty state if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, starting empty", path.display());
            return Ok(Self {
                last_updated: None,
                state: PersistedState::default(),
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let file: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!(
            "Loaded {} bindings from {}",
            file.state.binding_count(),
            path.display()
        );
        Ok(file)
    }

    /// Stamp and write the current contents of `shared`
    pub fn save(&mut self, path: &Path, shared: &SharedState) -> Result<()> {
        self.state = shared.snapshot();
        self.last_updated = Some(Utc::now());

        write_json(path, self).context("Failed to write state file")?;
        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn shared(&self) -> SharedState {
        SharedState::new(self.state.clone())
    }
}

/// Path of the simulated organization kept beside `state_path`
pub fn organization_path(state_path: &Path) -> PathBuf {
    state_path.with_extension("org.json")
}

pub fn load_organization(state_path: &Path) -> Result<SimulatedOrganization> {
    let path = organization_path(state_path);
    if !path.exists() {
        return Ok(SimulatedOrganization::default());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_organization(state_path: &Path, organization: &SimulatedOrganization) -> Result<()> {
    write_json(&organization_path(state_path), organization)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let content = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
