use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taskgraph::RunOptions;

use crate::paths;

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }
}

/// Find `<name>.toml` or `<name>.json` in `dir`, TOML first
pub fn find_config_file(dir: &Path, name: &str) -> Option<(PathBuf, ConfigFormat)> {
    [ConfigFormat::Toml, ConfigFormat::Json]
        .into_iter()
        .map(|format| (dir.join(format!("{name}.{}", format.extension())), format))
        .find(|(path, _)| path.exists())
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// State file path; `~` and env vars are expanded
    pub state_file: Option<String>,
    pub max_concurrent_tasks: usize,
    pub failed_tasks_tolerance: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = RunOptions::default();
        Self {
            state_file: None,
            max_concurrent_tasks: defaults.max_concurrent_tasks,
            failed_tasks_tolerance: defaults.failed_tasks_tolerance,
        }
    }
}

impl Settings {
    /// Load `config.{toml,json}` from the config directory, or defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?)
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let Some((path, format)) = find_config_file(dir, "config") else {
            log::debug!("No config file in {}, using defaults", dir.display());
            return Ok(Self::default());
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings = match format {
            ConfigFormat::Toml => toml::from_str(&content)
                .with_context(|| format!("Invalid config format in {}", path.display()))?,
            ConfigFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Invalid config format in {}", path.display()))?,
        };
        log::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Resolved state file path
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(file) => Ok(paths::expand(file)),
            None => paths::default_state_file(),
        }
    }

    /// Run options, with command-line values taking precedence
    pub fn run_options(
        &self,
        max_concurrent_tasks: Option<usize>,
        failed_tasks_tolerance: Option<usize>,
    ) -> RunOptions {
        RunOptions::new(
            max_concurrent_tasks.unwrap_or(self.max_concurrent_tasks),
            failed_tasks_tolerance.unwrap_or(self.failed_tasks_tolerance),
        )
    }
}
