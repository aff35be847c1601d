//! Remote writer contract and an in-memory control plane

use crate::model::{AccountResource, OrganizationalUnitResource, PolicyResource};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Performs calls against the organization control plane
///
/// Creates return the physical id issued for the new resource.
#[async_trait]
pub trait OrganizationWriter: Send + Sync {
    async fn ensure_root(&self) -> Result<String>;

    async fn create_organizational_unit(&self, resource: &OrganizationalUnitResource)
    -> Result<String>;

    async fn update_organizational_unit(
        &self,
        resource: &OrganizationalUnitResource,
        physical_id: &str,
    ) -> Result<()>;

    async fn delete_organizational_unit(&self, physical_id: &str) -> Result<()>;

    async fn create_account(&self, resource: &AccountResource) -> Result<String>;

    async fn update_account(&self, resource: &AccountResource, physical_id: &str) -> Result<()>;

    async fn create_policy(&self, resource: &PolicyResource) -> Result<String>;

    async fn update_policy(&self, resource: &PolicyResource, physical_id: &str) -> Result<()>;

    async fn delete_policy(&self, physical_id: &str) -> Result<()>;

    async fn attach_policy(&self, target_id: &str, policy_id: &str) -> Result<()>;

    async fn detach_policy(&self, target_id: &str, policy_id: &str) -> Result<()>;

    /// Move an account under `target_id`
    async fn attach_account(&self, target_id: &str, account_id: &str) -> Result<()>;

    /// Move an account from `target_id` back under the root
    async fn detach_account(&self, target_id: &str, account_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedUnit {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedAccount {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Parent container (root or organizational unit id)
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPolicy {
    pub name: String,
    #[serde(default)]
    pub document: serde_json::Value,
}

/// Everything the in-memory control plane knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedOrganization {
    pub root_id: Option<String>,
    pub organizational_units: BTreeMap<String, SimulatedUnit>,
    pub accounts: BTreeMap<String, SimulatedAccount>,
    pub policies: BTreeMap<String, SimulatedPolicy>,
    /// (target id, policy id)
    pub attachments: BTreeSet<(String, String)>,
    pub next_id: u64,
}

impl SimulatedOrganization {
    fn issue(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn issue_account_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:012}", self.next_id)
    }

    fn is_target(&self, id: &str) -> bool {
        self.root_id.as_deref() == Some(id)
            || self.organizational_units.contains_key(id)
            || self.accounts.contains_key(id)
    }

    fn require_policy(&self, policy_id: &str) -> Result<()> {
        if !self.policies.contains_key(policy_id) {
            bail!("policy {policy_id} not found");
        }
        Ok(())
    }

    fn require_target(&self, target_id: &str) -> Result<()> {
        if !self.is_target(target_id) {
            bail!("target {target_id} not found");
        }
        Ok(())
    }
}

/// A control plane held in memory
///
/// Enforces referential integrity the way a real organization service does:
/// attaching to or from an unknown id fails. Individual operations can be
/// made to fail for rehearsing partial failures.
#[derive(Debug, Default)]
pub struct InMemoryOrganization {
    model: Mutex<SimulatedOrganization>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
}

impl InMemoryOrganization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously saved model
    pub fn from_snapshot(model: SimulatedOrganization) -> Self {
        Self {
            model: Mutex::new(model),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> SimulatedOrganization {
        self.model().clone()
    }

    /// Make every call whose description starts with `prefix` fail
    ///
    /// Descriptions look like `create_policy deny-root` or
    /// `attach_policy ou-00000002 p-00000001`.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.into());
    }

    /// Descriptions of every call made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attached_policies(&self, target_id: &str) -> Vec<String> {
        self.model()
            .attachments
            .iter()
            .filter(|(target, _)| target == target_id)
            .map(|(_, policy)| policy.clone())
            .collect()
    }

    pub fn parent_of(&self, account_id: &str) -> Option<String> {
        self.model()
            .accounts
            .get(account_id)
            .and_then(|a| a.parent.clone())
    }

    fn model(&self) -> MutexGuard<'_, SimulatedOrganization> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) -> Result<()> {
        log::debug!("organization call: {call}");
        let injected = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|prefix| call.starts_with(prefix.as_str()));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.clone());
        if injected {
            bail!("{call} rejected by the organization service");
        }
        Ok(())
    }
}

#[async_trait]
impl OrganizationWriter for InMemoryOrganization {
    async fn ensure_root(&self) -> Result<String> {
        self.record("ensure_root".into())?;
        let mut model = self.model();
        if let Some(root) = &model.root_id {
            return Ok(root.clone());
        }
        let root = model.issue("r");
        model.root_id = Some(root.clone());
        Ok(root)
    }

    async fn create_organizational_unit(
        &self,
        resource: &OrganizationalUnitResource,
    ) -> Result<String> {
        self.record(format!("create_organizational_unit {}", resource.name))?;
        let mut model = self.model();
        if model.organizational_units.values().any(|ou| ou.name == resource.name) {
            bail!("organizational unit {} already exists", resource.name);
        }
        let id = model.issue("ou");
        model.organizational_units.insert(
            id.clone(),
            SimulatedUnit {
                name: resource.name.clone(),
            },
        );
        Ok(id)
    }

    async fn update_organizational_unit(
        &self,
        resource: &OrganizationalUnitResource,
        physical_id: &str,
    ) -> Result<()> {
        self.record(format!("update_organizational_unit {physical_id}"))?;
        let mut model = self.model();
        let unit = model
            .organizational_units
            .get_mut(physical_id)
            .with_context(|| format!("organizational unit {physical_id} not found"))?;
        unit.name = resource.name.clone();
        Ok(())
    }

    async fn delete_organizational_unit(&self, physical_id: &str) -> Result<()> {
        self.record(format!("delete_organizational_unit {physical_id}"))?;
        let mut model = self.model();
        if model.organizational_units.remove(physical_id).is_none() {
            bail!("organizational unit {physical_id} not found");
        }
        let root = model.root_id.clone();
        for account in model.accounts.values_mut() {
            if account.parent.as_deref() == Some(physical_id) {
                account.parent = root.clone();
            }
        }
        model.attachments.retain(|(target, _)| target != physical_id);
        Ok(())
    }

    async fn create_account(&self, resource: &AccountResource) -> Result<String> {
        self.record(format!("create_account {}", resource.name))?;
        let mut model = self.model();
        let id = match &resource.account_id {
            Some(existing) => existing.clone(),
            None => model.issue_account_id(),
        };
        let parent = model.root_id.clone();
        model.accounts.insert(
            id.clone(),
            SimulatedAccount {
                name: resource.name.clone(),
                email: resource.email.clone(),
                tags: resource.tags.clone(),
                parent,
            },
        );
        Ok(id)
    }

    async fn update_account(&self, resource: &AccountResource, physical_id: &str) -> Result<()> {
        self.record(format!("update_account {physical_id}"))?;
        let mut model = self.model();
        let account = model
            .accounts
            .get_mut(physical_id)
            .with_context(|| format!("account {physical_id} not found"))?;
        account.name = resource.name.clone();
        account.tags = resource.tags.clone();
        Ok(())
    }

    async fn create_policy(&self, resource: &PolicyResource) -> Result<String> {
        self.record(format!("create_policy {}", resource.name))?;
        let mut model = self.model();
        let id = model.issue("p");
        model.policies.insert(
            id.clone(),
            SimulatedPolicy {
                name: resource.name.clone(),
                document: resource.document.clone(),
            },
        );
        Ok(id)
    }

    async fn update_policy(&self, resource: &PolicyResource, physical_id: &str) -> Result<()> {
        self.record(format!("update_policy {physical_id}"))?;
        let mut model = self.model();
        let policy = model
            .policies
            .get_mut(physical_id)
            .with_context(|| format!("policy {physical_id} not found"))?;
        policy.name = resource.name.clone();
        policy.document = resource.document.clone();
        Ok(())
    }

    async fn delete_policy(&self, physical_id: &str) -> Result<()> {
        self.record(format!("delete_policy {physical_id}"))?;
        let mut model = self.model();
        if model.policies.remove(physical_id).is_none() {
            bail!("policy {physical_id} not found");
        }
        model.attachments.retain(|(_, policy)| policy != physical_id);
        Ok(())
    }

    async fn attach_policy(&self, target_id: &str, policy_id: &str) -> Result<()> {
        self.record(format!("attach_policy {target_id} {policy_id}"))?;
        let mut model = self.model();
        model.require_target(target_id)?;
        model.require_policy(policy_id)?;
        model
            .attachments
            .insert((target_id.to_string(), policy_id.to_string()));
        Ok(())
    }

    async fn detach_policy(&self, target_id: &str, policy_id: &str) -> Result<()> {
        self.record(format!("detach_policy {target_id} {policy_id}"))?;
        let mut model = self.model();
        if !model
            .attachments
            .remove(&(target_id.to_string(), policy_id.to_string()))
        {
            bail!("policy {policy_id} is not attached to {target_id}");
        }
        Ok(())
    }

    async fn attach_account(&self, target_id: &str, account_id: &str) -> Result<()> {
        self.record(format!("attach_account {target_id} {account_id}"))?;
        let mut model = self.model();
        model.require_target(target_id)?;
        let account = model
            .accounts
            .get_mut(account_id)
            .with_context(|| format!("account {account_id} not found"))?;
        account.parent = Some(target_id.to_string());
        Ok(())
    }

    async fn detach_account(&self, target_id: &str, account_id: &str) -> Result<()> {
        self.record(format!("detach_account {target_id} {account_id}"))?;
        let mut model = self.model();
        let root = model.root_id.clone();
        let account = model
            .accounts
            .get_mut(account_id)
            .with_context(|| format!("account {account_id} not found"))?;
        if account.parent.as_deref() == Some(target_id) {
            account.parent = root;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reference;

    fn ou(name: &str) -> OrganizationalUnitResource {
        OrganizationalUnitResource {
            logical_id: name.into(),
            name: name.into(),
            policies: vec![],
            accounts: vec![Reference::logical("Dev")],
        }
    }

    fn policy(name: &str) -> PolicyResource {
        PolicyResource {
            logical_id: name.into(),
            name: name.into(),
            description: None,
            document: serde_json::json!({"Version": "2012-10-17"}),
            tags: BTreeMap::new(),
        }
    }

    fn account(name: &str) -> AccountResource {
        AccountResource {
            logical_id: name.into(),
            account_id: None,
            name: name.into(),
            email: Some(format!("{name}@example.com")),
            tags: BTreeMap::new(),
            policies: vec![],
        }
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let org = InMemoryOrganization::new();
        let first = org.ensure_root().await.unwrap();
        let second = org.ensure_root().await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("r-"));
    }

    #[tokio::test]
    async fn test_attach_requires_existing_ids() {
        let org = InMemoryOrganization::new();
        let unit = org.create_organizational_unit(&ou("Eng")).await.unwrap();
        assert!(org.attach_policy(&unit, "p-missing").await.is_err());

        let p = org.create_policy(&policy("deny")).await.unwrap();
        assert!(org.attach_policy("ou-missing", &p).await.is_err());
        org.attach_policy(&unit, &p).await.unwrap();
        assert_eq!(org.attached_policies(&unit), vec![p.clone()]);

        org.detach_policy(&unit, &p).await.unwrap();
        assert!(org.attached_policies(&unit).is_empty());
        assert!(org.detach_policy(&unit, &p).await.is_err());
    }

    #[tokio::test]
    async fn test_account_membership_moves() {
        let org = InMemoryOrganization::new();
        let root = org.ensure_root().await.unwrap();
        let unit = org.create_organizational_unit(&ou("Eng")).await.unwrap();
        let dev = org.create_account(&account("dev")).await.unwrap();
        assert_eq!(org.parent_of(&dev), Some(root.clone()));

        org.attach_account(&unit, &dev).await.unwrap();
        assert_eq!(org.parent_of(&dev), Some(unit.clone()));

        org.detach_account(&unit, &dev).await.unwrap();
        assert_eq!(org.parent_of(&dev), Some(root));
    }

    #[tokio::test]
    async fn test_existing_account_id_is_adopted() {
        let org = InMemoryOrganization::new();
        let mut master = account("management");
        master.account_id = Some("111111111111".into());
        assert_eq!(org.create_account(&master).await.unwrap(), "111111111111");
    }

    #[tokio::test]
    async fn test_delete_policy_drops_attachments() {
        let org = InMemoryOrganization::new();
        let root = org.ensure_root().await.unwrap();
        let p = org.create_policy(&policy("deny")).await.unwrap();
        org.attach_policy(&root, &p).await.unwrap();

        org.delete_policy(&p).await.unwrap();
        assert!(org.attached_policies(&root).is_empty());
        assert!(org.delete_policy(&p).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let org = InMemoryOrganization::new();
        org.fail_on("create_policy");
        let err = org.create_policy(&policy("deny")).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert_eq!(org.calls(), vec!["create_policy deny".to_string()]);
        assert!(org.snapshot().policies.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_resume() {
        let org = InMemoryOrganization::new();
        let unit = org.create_organizational_unit(&ou("Eng")).await.unwrap();

        let resumed = InMemoryOrganization::from_snapshot(org.snapshot());
        resumed
            .update_organizational_unit(&ou("Engineering"), &unit)
            .await
            .unwrap();
        assert_eq!(
            resumed.snapshot().organizational_units[&unit].name,
            "Engineering"
        );
        let next = resumed.create_policy(&policy("deny")).await.unwrap();
        assert_ne!(next, unit.replace("ou-", "p-"));
    }
}
