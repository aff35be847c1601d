//! Parsed organization template
//!
//! Resources are identified by a logical id that is stable across runs. A
//! resource may refer to another one either by logical id or by a physical id
//! issued by the control plane.

use crate::error::{Error, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Kinds of resources managed in an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "OC::ORG::MasterAccount")]
    MasterAccount,
    #[serde(rename = "OC::ORG::Account")]
    Account,
    #[serde(rename = "OC::ORG::OrganizationalUnit")]
    OrganizationalUnit,
    #[serde(rename = "OC::ORG::ServiceControlPolicy")]
    ServiceControlPolicy,
    #[serde(rename = "OC::ORG::OrganizationRoot")]
    OrganizationRoot,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MasterAccount => "OC::ORG::MasterAccount",
            Self::Account => "OC::ORG::Account",
            Self::OrganizationalUnit => "OC::ORG::OrganizationalUnit",
            Self::ServiceControlPolicy => "OC::ORG::ServiceControlPolicy",
            Self::OrganizationRoot => "OC::ORG::OrganizationRoot",
        }
    }

    /// Short human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Self::MasterAccount => "master account",
            Self::Account => "account",
            Self::OrganizationalUnit => "organizational unit",
            Self::ServiceControlPolicy => "policy",
            Self::OrganizationRoot => "organization root",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship to another resource
///
/// Written as `{ ref = "LogicalId" }` or `{ physical_id = "p-abc" }`. The kind
/// of the referenced resource follows from the collection holding the
/// reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Physical { physical_id: String },
    Logical {
        #[serde(rename = "ref")]
        logical_id: String,
    },
}

impl Reference {
    pub fn physical(id: impl Into<String>) -> Self {
        Self::Physical {
            physical_id: id.into(),
        }
    }

    pub fn logical(id: impl Into<String>) -> Self {
        Self::Logical {
            logical_id: id.into(),
        }
    }

    pub fn logical_id(&self) -> Option<&str> {
        match self {
            Self::Logical { logical_id } => Some(logical_id),
            Self::Physical { .. } => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Physical { physical_id } => write!(f, "{physical_id}"),
            Self::Logical { logical_id } => write!(f, "!Ref {logical_id}"),
        }
    }
}

/// A template resource with a stable identity and a content hash
pub trait Resource {
    fn logical_id(&self) -> &str;

    /// Digest of the fields that matter for change detection
    fn content_hash(&self) -> String;
}

/// Account, also used for the master account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResource {
    pub logical_id: String,
    /// Existing account id (always set for the master account)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Reference>,
}

impl Resource for AccountResource {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn content_hash(&self) -> String {
        let mut digest = Digest::new();
        digest.field("account_id", self.account_id.as_deref().unwrap_or_default());
        digest.field("name", &self.name);
        digest.field("email", self.email.as_deref().unwrap_or_default());
        digest.tags(&self.tags);
        digest.references("policies", &self.policies);
        digest.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnitResource {
    pub logical_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Reference>,
}

impl Resource for OrganizationalUnitResource {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn content_hash(&self) -> String {
        let mut digest = Digest::new();
        digest.field("name", &self.name);
        digest.references("policies", &self.policies);
        digest.references("accounts", &self.accounts);
        digest.finish()
    }
}

/// Service control policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResource {
    pub logical_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub document: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Resource for PolicyResource {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn content_hash(&self) -> String {
        let mut digest = Digest::new();
        digest.field("name", &self.name);
        digest.field("description", self.description.as_deref().unwrap_or_default());
        digest.field("document", &self.document.to_string());
        digest.tags(&self.tags);
        digest.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRootResource {
    pub logical_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Reference>,
}

impl Resource for OrganizationRootResource {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn content_hash(&self) -> String {
        let mut digest = Digest::new();
        digest.references("policies", &self.policies);
        digest.finish()
    }
}

/// Field-by-field blake3 digest
///
/// Each field is framed by its name and a separator so adjacent values can
/// never run together. References and tags are hashed in sorted order.
struct Digest(Hasher);

impl Digest {
    fn new() -> Self {
        Self(Hasher::new())
    }

    fn field(&mut self, name: &str, value: &str) {
        self.0.update(name.as_bytes());
        self.0.update(b"\x1f");
        self.0.update(value.as_bytes());
        self.0.update(b"\x1e");
    }

    fn tags(&mut self, tags: &BTreeMap<String, String>) {
        for (key, value) in tags {
            self.field(&format!("tag:{key}"), value);
        }
    }

    fn references(&mut self, name: &str, references: &[Reference]) {
        let mut sorted: Vec<String> = references
            .iter()
            .map(|r| match r {
                Reference::Physical { physical_id } => format!("physical:{physical_id}"),
                Reference::Logical { logical_id } => format!("ref:{logical_id}"),
            })
            .collect();
        sorted.sort();
        for entry in sorted {
            self.field(name, &entry);
        }
    }

    fn finish(self) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

/// The organization section of a template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_account: Option<AccountResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_root: Option<OrganizationRootResource>,
    pub accounts: Vec<AccountResource>,
    pub organizational_units: Vec<OrganizationalUnitResource>,
    pub policies: Vec<PolicyResource>,
}

/// A parsed template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRoot {
    #[serde(default)]
    pub organization: Organization,
}

impl TemplateRoot {
    /// Template with no resources, used when nothing was committed before
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Serialized form stored as the previous template
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Organization identity: the master account's id
    pub fn master_account_id(&self) -> Option<&str> {
        self.organization
            .master_account
            .as_ref()
            .and_then(|m| m.account_id.as_deref())
    }

    pub fn account(&self, logical_id: &str) -> Option<&AccountResource> {
        self.organization
            .accounts
            .iter()
            .find(|a| a.logical_id == logical_id)
    }

    pub fn organizational_unit(&self, logical_id: &str) -> Option<&OrganizationalUnitResource> {
        self.organization
            .organizational_units
            .iter()
            .find(|ou| ou.logical_id == logical_id)
    }

    pub fn policy(&self, logical_id: &str) -> Option<&PolicyResource> {
        self.organization
            .policies
            .iter()
            .find(|p| p.logical_id == logical_id)
    }

    /// Whether `logical_id` names the master account
    pub fn is_master_account(&self, logical_id: &str) -> bool {
        self.organization
            .master_account
            .as_ref()
            .is_some_and(|m| m.logical_id == logical_id)
    }

    /// Number of resources in the template
    pub fn resource_count(&self) -> usize {
        let org = &self.organization;
        usize::from(org.master_account.is_some())
            + usize::from(org.organization_root.is_some())
            + org.accounts.len()
            + org.organizational_units.len()
            + org.policies.len()
    }

    /// Check identities, required attributes and references
    pub fn validate(&self) -> Result<()> {
        let org = &self.organization;
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        let mut ids: Vec<&str> = Vec::new();
        ids.extend(org.master_account.iter().map(|m| m.logical_id.as_str()));
        ids.extend(org.organization_root.iter().map(|r| r.logical_id.as_str()));
        ids.extend(org.accounts.iter().map(|a| a.logical_id.as_str()));
        ids.extend(org.organizational_units.iter().map(|o| o.logical_id.as_str()));
        ids.extend(org.policies.iter().map(|p| p.logical_id.as_str()));
        for id in ids {
            if id.is_empty() {
                problems.push("resource with empty logical id".to_string());
            } else if !seen.insert(id) {
                problems.push(format!("duplicate logical id '{id}'"));
            }
        }

        if let Some(master) = &org.master_account {
            if master.account_id.as_deref().is_none_or(str::is_empty) {
                problems.push(format!(
                    "master account '{}' has no account_id",
                    master.logical_id
                ));
            }
            check_name(&mut problems, "master account", &master.logical_id, &master.name);
        }

        for account in &org.accounts {
            check_name(&mut problems, "account", &account.logical_id, &account.name);
            if account.account_id.is_none() && account.email.as_deref().is_none_or(str::is_empty) {
                problems.push(format!(
                    "account '{}' needs an email or an existing account_id",
                    account.logical_id
                ));
            }
        }
        for ou in &org.organizational_units {
            check_name(&mut problems, "organizational unit", &ou.logical_id, &ou.name);
        }
        for policy in &org.policies {
            check_name(&mut problems, "policy", &policy.logical_id, &policy.name);
        }

        let policy_ids: HashSet<&str> = org.policies.iter().map(|p| p.logical_id.as_str()).collect();
        let account_ids: HashSet<&str> = org
            .accounts
            .iter()
            .chain(org.master_account.iter())
            .map(|a| a.logical_id.as_str())
            .collect();

        let mut policy_refs: Vec<(&str, &Reference)> = Vec::new();
        for account in org.accounts.iter().chain(org.master_account.iter()) {
            policy_refs.extend(account.policies.iter().map(|r| (account.logical_id.as_str(), r)));
        }
        for ou in &org.organizational_units {
            policy_refs.extend(ou.policies.iter().map(|r| (ou.logical_id.as_str(), r)));
        }
        for root in &org.organization_root {
            policy_refs.extend(root.policies.iter().map(|r| (root.logical_id.as_str(), r)));
        }
        for (owner, reference) in policy_refs {
            check_reference(&mut problems, owner, reference, &policy_ids, "policy");
        }
        for ou in &org.organizational_units {
            for reference in &ou.accounts {
                check_reference(&mut problems, &ou.logical_id, reference, &account_ids, "account");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidTemplate(problems))
        }
    }
}

fn check_name(problems: &mut Vec<String>, kind: &str, logical_id: &str, name: &str) {
    if name.trim().is_empty() {
        problems.push(format!("{kind} '{logical_id}' has no name"));
    }
}

fn check_reference(
    problems: &mut Vec<String>,
    owner: &str,
    reference: &Reference,
    known: &HashSet<&str>,
    kind: &str,
) {
    match reference {
        Reference::Physical { physical_id } if physical_id.is_empty() => {
            problems.push(format!("'{owner}' has an empty {kind} physical_id"));
        }
        Reference::Logical { logical_id } if !known.contains(logical_id.as_str()) => {
            problems.push(format!("'{owner}' references unknown {kind} '{logical_id}'"));
        }
        _ => {}
    }
}
