use anyhow::Result;
use colored::Colorize;
use orgbinder::{ResourceType, StateAccessor};

use super::Session;
use crate::Context;
use crate::ui;

const TYPES: [ResourceType; 5] = [
    ResourceType::MasterAccount,
    ResourceType::OrganizationRoot,
    ResourceType::OrganizationalUnit,
    ResourceType::Account,
    ResourceType::ServiceControlPolicy,
];

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub fn show(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    let shared = &session.shared;

    ui::header("Recorded State");
    ui::kv("State file", &session.state_path.display().to_string());
    ui::kv(
        "Last updated",
        &session
            .file
            .last_updated
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
    );
    ui::kv(
        "Master account",
        shared.master_account_id().as_deref().unwrap_or("(none)"),
    );
    ui::kv(
        "Previous template",
        if shared.previous_template().is_some() {
            "recorded"
        } else {
            "none"
        },
    );

    for resource_type in TYPES {
        let bindings = shared.enum_bindings(resource_type);
        if bindings.is_empty() {
            continue;
        }
        ui::section(&format!("{} ({})", resource_type.label(), bindings.len()));
        for binding in bindings {
            println!(
                "  {:<30} {} {}",
                binding.logical_id,
                binding.physical_id,
                short_hash(&binding.last_committed_hash).dimmed()
            );
        }
    }

    let targets = &session.file.state.targets;
    if !targets.is_empty() {
        ui::section(&format!("Workload targets ({})", targets.len()));
        for target in targets.values() {
            println!(
                "  {} {} {}/{} {}",
                target.plugin_type,
                target.name,
                target.account_id,
                target.region,
                short_hash(&target.last_committed_hash).dimmed()
            );
        }
    }

    let organization = session.organization.snapshot();
    ui::section("Simulated organization");
    ui::kv("Root", organization.root_id.as_deref().unwrap_or("(none)"));
    ui::kv(
        "Organizational units",
        &organization.organizational_units.len().to_string(),
    );
    ui::kv("Accounts", &organization.accounts.len().to_string());
    ui::kv("Policies", &organization.policies.len().to_string());
    ui::kv("Attachments", &organization.attachments.len().to_string());
    Ok(())
}
