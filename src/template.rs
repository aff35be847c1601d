//! Template and workload file loading

use anyhow::{Context, Result};
use orgbinder::{PluginTarget, PluginWorkload, TemplateRoot};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Load an organization template; `.toml` files are TOML, anything else JSON
pub fn load(path: &Path) -> Result<TemplateRoot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read template {}", path.display()))?;
    let template = if is_toml(path) {
        TemplateRoot::from_toml(&content)
    } else {
        TemplateRoot::from_json(&content)
    };
    template.with_context(|| format!("Invalid template {}", path.display()))
}

/// A workload definition file
///
/// ```toml
/// plugin_type = "shell"
/// name = "bootstrap"
/// command = "./deploy.sh"
/// delete_command = "./teardown.sh"
///
/// [[targets]]
/// account_id = "111111111111"
/// region = "eu-west-1"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadFile {
    #[serde(default = "default_plugin_type")]
    pub plugin_type: String,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub delete_command: Option<String>,
    #[serde(default)]
    pub targets: Vec<PluginTarget>,
    /// Extra settings handed to the commands; part of the workload hash
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

fn default_plugin_type() -> String {
    "shell".to_string()
}

impl WorkloadFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read workload {}", path.display()))?;
        if is_toml(path) {
            toml::from_str(&content).with_context(|| format!("Invalid workload {}", path.display()))
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid workload {}", path.display()))
        }
    }

    /// The hashed workload; commands and parameters all count as its definition
    pub fn workload(&self) -> PluginWorkload {
        let definition = serde_json::json!({
            "command": self.command,
            "delete_command": self.delete_command,
            "parameters": self.parameters,
        });
        PluginWorkload::new(self.plugin_type.clone(), self.name.clone(), definition)
    }
}
