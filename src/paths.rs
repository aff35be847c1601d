//! Where orgform keeps its configuration and recorded state
//!
//! Each directory is taken from the first of: its `ORGFORM_*` override, the
//! matching XDG base directory, the platform default under the home directory.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Overrides the directory holding `config.toml` / `config.json`
pub const ENV_CONFIG_DIR: &str = "ORGFORM_CONFIG_DIR";

/// Overrides the directory holding the default state file
pub const ENV_STATE_DIR: &str = "ORGFORM_STATE_DIR";

const APP_DIR: &str = "orgform";
const STATE_FILE: &str = "state.json";

struct Location {
    env: &'static str,
    xdg: &'static str,
    home_relative: &'static [&'static str],
}

const CONFIG: Location = Location {
    env: ENV_CONFIG_DIR,
    xdg: "XDG_CONFIG_HOME",
    home_relative: &[".config"],
};

const STATE: Location = Location {
    env: ENV_STATE_DIR,
    xdg: "XDG_STATE_HOME",
    home_relative: &[".local", "state"],
};

fn resolve(location: &Location) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(location.env) {
        let path = expand(&dir);
        log::debug!("Using {} from {}", path.display(), location.env);
        return Ok(path);
    }
    if let Ok(base) = std::env::var(location.xdg) {
        return Ok(PathBuf::from(base).join(APP_DIR));
    }

    let mut path = dirs::home_dir().context("Could not determine home directory")?;
    path.extend(location.home_relative);
    Ok(path.join(APP_DIR))
}

pub fn config_dir() -> Result<PathBuf> {
    resolve(&CONFIG)
}

/// State file used when neither the command line nor the config names one
pub fn default_state_file() -> Result<PathBuf> {
    Ok(resolve(&STATE)?.join(STATE_FILE))
}

/// Expand `~` and environment variables; unknown variables are left as written
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
