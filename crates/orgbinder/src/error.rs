//! Error types for organization reconciliation.

use thiserror::Error;

/// Errors raised before any task runs.
#[derive(Error, Debug)]
pub enum Error {
    /// The recorded state was written for a different organization
    #[error(
        "state and template do not belong to the same organization (state: {state}, template: {template})"
    )]
    OrganizationMismatch { state: String, template: String },

    /// The template is structurally unusable
    #[error("invalid template: {}", .0.join("; "))]
    InvalidTemplate(Vec<String>),

    /// Template or state text is not valid JSON
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Template text is not valid TOML
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for organization reconciliation.
pub type Result<T> = std::result::Result<T, Error>;
