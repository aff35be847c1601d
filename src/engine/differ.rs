//! Binding diff display

use colored::Colorize;
use orgbinder::binder::Binding;
use orgbinder::{BindingAction, OrgTask, OrganizationBindings, ResourceType};
use taskgraph::TaskGraph;

/// One displayable line of a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRow {
    pub resource_type: ResourceType,
    pub logical_id: String,
    pub action: BindingAction,
    pub physical_id: Option<String>,
}

fn rows_of<R>(out: &mut Vec<DiffRow>, bindings: &[Binding<'_, R>]) {
    out.extend(bindings.iter().map(|binding| DiffRow {
        resource_type: binding.resource_type,
        logical_id: binding.logical_id.clone(),
        action: binding.action(),
        physical_id: binding.state().map(|s| s.physical_id.clone()),
    }));
}

/// Rows for every binding that needs a change, in task order
pub fn compute_rows(bindings: &OrganizationBindings<'_>) -> Vec<DiffRow> {
    let mut rows = Vec::new();
    rows_of(&mut rows, &bindings.policies);
    rows_of(&mut rows, &bindings.accounts);
    rows_of(&mut rows, &bindings.master_account);
    rows_of(&mut rows, &bindings.organizational_units);
    rows_of(&mut rows, &bindings.organization_root);
    rows.retain(|row| row.action != BindingAction::None);
    rows
}

fn type_name(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::MasterAccount => "Master account",
        ResourceType::Account => "Accounts",
        ResourceType::OrganizationalUnit => "Organizational units",
        ResourceType::ServiceControlPolicy => "Service control policies",
        ResourceType::OrganizationRoot => "Organization root",
    }
}

/// Display a list of diff rows grouped by resource type
pub fn display_diff(rows: &[DiffRow]) {
    if rows.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Organization Diff".bold()
    );

    let mut current = None;
    for row in rows {
        if current != Some(row.resource_type) {
            current = Some(row.resource_type);
            println!("│");
            println!("│ {}", type_name(row.resource_type).bold());
        }

        let symbol = match row.action {
            BindingAction::Create => "+".green(),
            BindingAction::Update => "~".yellow(),
            BindingAction::Delete => "-".red(),
            BindingAction::None => " ".normal(),
        };
        let detail = match (row.action, &row.physical_id) {
            (BindingAction::Create, _) => "(will create)".to_string(),
            (BindingAction::Delete, Some(id)) => format!("{id} (will remove)"),
            (_, Some(id)) => id.clone(),
            (_, None) => String::new(),
        };
        println!("│   {} {:<30} {}", symbol, row.logical_id, detail.dimmed());
    }

    let count = |action| rows.iter().filter(|r| r.action == action).count();
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to remove",
        count(BindingAction::Create).to_string().green(),
        count(BindingAction::Update).to_string().yellow(),
        count(BindingAction::Delete).to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print planned tasks with their dependencies
pub fn display_tasks(graph: &TaskGraph<OrgTask>) {
    if graph.is_empty() {
        return;
    }

    println!();
    println!("{}", "Planned tasks".bold());
    for (id, task) in graph.tasks() {
        println!("  {} {}", id.to_string().dimmed(), task.describe());

        let mut after: Vec<String> = graph
            .explicit_dependencies(id)
            .iter()
            .map(ToString::to_string)
            .collect();
        after.extend(graph.deferred_dependencies(id).iter().map(ToString::to_string));
        if !after.is_empty() {
            println!("      {} {}", "after".dimmed(), after.join(", ").dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgbinder::binder::classify;
    use orgbinder::{AccountResource, SharedState, StateAccessor, StateBinding};

    fn account(logical_id: &str, name: &str) -> AccountResource {
        AccountResource {
            logical_id: logical_id.into(),
            account_id: None,
            name: name.into(),
            email: Some(format!("{logical_id}@example.com")),
            tags: Default::default(),
            policies: Vec::new(),
        }
    }

    #[test]
    fn test_rows_skip_unchanged_and_carry_physical_ids() {
        let state = SharedState::default();
        let kept = account("Kept", "kept");
        let added = account("Added", "added");
        state.set_binding(StateBinding {
            resource_type: ResourceType::Account,
            logical_id: "Kept".into(),
            physical_id: "222222222222".into(),
            last_committed_hash: orgbinder::Resource::content_hash(&kept),
        });
        state.set_binding(StateBinding {
            resource_type: ResourceType::Account,
            logical_id: "Gone".into(),
            physical_id: "333333333333".into(),
            last_committed_hash: "old".into(),
        });

        let accounts = vec![kept, added];
        let bindings = OrganizationBindings {
            policies: Vec::new(),
            accounts: classify(ResourceType::Account, &accounts, &state),
            organizational_units: Vec::new(),
            master_account: Vec::new(),
            organization_root: Vec::new(),
        };

        let rows = compute_rows(&bindings);
        assert_eq!(
            rows,
            vec![
                DiffRow {
                    resource_type: ResourceType::Account,
                    logical_id: "Added".into(),
                    action: BindingAction::Create,
                    physical_id: None,
                },
                DiffRow {
                    resource_type: ResourceType::Account,
                    logical_id: "Gone".into(),
                    action: BindingAction::Delete,
                    physical_id: Some("333333333333".into()),
                },
            ]
        );
    }
}
