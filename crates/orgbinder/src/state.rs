//! Recorded state
//!
//! Bindings map a template resource (type + logical id) to the physical id it
//! was created as and the hash last committed for it. Task bodies read and
//! write them concurrently through [`StateAccessor`].

use crate::model::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Binding of one template resource to a physical resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBinding {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub logical_id: String,
    pub physical_id: String,
    pub last_committed_hash: String,
}

/// Binding of a plugin workload to one account/region target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBinding {
    pub plugin_type: String,
    pub name: String,
    pub account_id: String,
    pub region: String,
    pub last_committed_hash: String,
}

impl TargetBinding {
    pub fn key(&self) -> String {
        target_key(&self.plugin_type, &self.name, &self.account_id, &self.region)
    }
}

pub(crate) fn target_key(plugin_type: &str, name: &str, account_id: &str, region: &str) -> String {
    format!("{plugin_type}/{name}/{account_id}/{region}")
}

/// Access to recorded state
///
/// All methods take `&self` so one accessor can be shared by every task body
/// of a run.
pub trait StateAccessor: Send + Sync {
    fn get_binding(&self, resource_type: ResourceType, logical_id: &str) -> Option<StateBinding>;

    /// Insert or replace the binding for its (type, logical id)
    fn set_binding(&self, binding: StateBinding);

    fn remove_binding(&self, resource_type: ResourceType, logical_id: &str);

    /// Bindings of one type, ordered by logical id
    fn enum_bindings(&self, resource_type: ResourceType) -> Vec<StateBinding>;

    /// Serialized template of the last fully successful run
    fn previous_template(&self) -> Option<String>;

    fn set_previous_template(&self, template: String);

    /// Organization identity the state was recorded for
    fn master_account_id(&self) -> Option<String>;

    fn set_master_account_id(&self, account_id: String);

    fn get_target(&self, key: &str) -> Option<TargetBinding>;

    fn set_target(&self, binding: TargetBinding);

    fn remove_target(&self, key: &str);

    /// Targets recorded for one workload
    fn enum_targets(&self, plugin_type: &str, name: &str) -> Vec<TargetBinding>;
}

/// Serializable state blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_account_id: Option<String>,
    #[serde(default)]
    pub bindings: BTreeMap<ResourceType, BTreeMap<String, StateBinding>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, TargetBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_template: Option<String>,
}

impl PersistedState {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total number of resource bindings
    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(BTreeMap::len).sum()
    }
}

/// Thread-safe in-memory [`StateAccessor`]
///
/// Clones share the same underlying state. The lock is only held for the
/// duration of a single accessor call.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<PersistedState>>,
}

impl SharedState {
    pub fn new(state: PersistedState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state, for persisting
    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateAccessor for SharedState {
    fn get_binding(&self, resource_type: ResourceType, logical_id: &str) -> Option<StateBinding> {
        self.lock()
            .bindings
            .get(&resource_type)
            .and_then(|by_id| by_id.get(logical_id))
            .cloned()
    }

    fn set_binding(&self, binding: StateBinding) {
        log::debug!(
            "Binding {} {} -> {}",
            binding.resource_type,
            binding.logical_id,
            binding.physical_id
        );
        self.lock()
            .bindings
            .entry(binding.resource_type)
            .or_default()
            .insert(binding.logical_id.clone(), binding);
    }

    fn remove_binding(&self, resource_type: ResourceType, logical_id: &str) {
        log::debug!("Forgetting {resource_type} {logical_id}");
        let mut state = self.lock();
        if let Some(by_id) = state.bindings.get_mut(&resource_type) {
            by_id.remove(logical_id);
            if by_id.is_empty() {
                state.bindings.remove(&resource_type);
            }
        }
    }

    fn enum_bindings(&self, resource_type: ResourceType) -> Vec<StateBinding> {
        self.lock()
            .bindings
            .get(&resource_type)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    fn previous_template(&self) -> Option<String> {
        self.lock().previous_template.clone()
    }

    fn set_previous_template(&self, template: String) {
        self.lock().previous_template = Some(template);
    }

    fn master_account_id(&self) -> Option<String> {
        self.lock().master_account_id.clone()
    }

    fn set_master_account_id(&self, account_id: String) {
        self.lock().master_account_id = Some(account_id);
    }

    fn get_target(&self, key: &str) -> Option<TargetBinding> {
        self.lock().targets.get(key).cloned()
    }

    fn set_target(&self, binding: TargetBinding) {
        self.lock().targets.insert(binding.key(), binding);
    }

    fn remove_target(&self, key: &str) {
        self.lock().targets.remove(key);
    }

    fn enum_targets(&self, plugin_type: &str, name: &str) -> Vec<TargetBinding> {
        self.lock()
            .targets
            .values()
            .filter(|t| t.plugin_type == plugin_type && t.name == name)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(resource_type: ResourceType, logical_id: &str, physical_id: &str) -> StateBinding {
        StateBinding {
            resource_type,
            logical_id: logical_id.into(),
            physical_id: physical_id.into(),
            last_committed_hash: "h".into(),
        }
    }

    #[test]
    fn test_set_get_remove_binding() {
        let state = SharedState::default();
        state.set_binding(binding(ResourceType::Account, "Dev", "123"));

        let found = state.get_binding(ResourceType::Account, "Dev").unwrap();
        assert_eq!(found.physical_id, "123");
        assert!(state.get_binding(ResourceType::MasterAccount, "Dev").is_none());

        state.remove_binding(ResourceType::Account, "Dev");
        assert!(state.get_binding(ResourceType::Account, "Dev").is_none());
        assert_eq!(state.snapshot().binding_count(), 0);
    }

    #[test]
    fn test_set_binding_upserts() {
        let state = SharedState::default();
        state.set_binding(binding(ResourceType::OrganizationalUnit, "Eng", "ou-1"));
        state.set_binding(binding(ResourceType::OrganizationalUnit, "Eng", "ou-2"));

        let all = state.enum_bindings(ResourceType::OrganizationalUnit);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].physical_id, "ou-2");
    }

    #[test]
    fn test_enum_bindings_sorted_by_logical_id() {
        let state = SharedState::default();
        state.set_binding(binding(ResourceType::ServiceControlPolicy, "b", "p-2"));
        state.set_binding(binding(ResourceType::ServiceControlPolicy, "a", "p-1"));

        let ids: Vec<_> = state
            .enum_bindings(ResourceType::ServiceControlPolicy)
            .into_iter()
            .map(|b| b.logical_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(state.enum_bindings(ResourceType::Account).is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let state = SharedState::default();
        let other = state.clone();
        other.set_master_account_id("111".into());
        other.set_previous_template("{}".into());
        assert_eq!(state.master_account_id().as_deref(), Some("111"));
        assert_eq!(state.previous_template().as_deref(), Some("{}"));
    }

    #[test]
    fn test_targets() {
        let state = SharedState::default();
        let target = TargetBinding {
            plugin_type: "shell".into(),
            name: "bootstrap".into(),
            account_id: "123".into(),
            region: "eu-west-1".into(),
            last_committed_hash: "h".into(),
        };
        state.set_target(target.clone());
        assert_eq!(state.get_target("shell/bootstrap/123/eu-west-1"), Some(target));
        assert_eq!(state.enum_targets("shell", "bootstrap").len(), 1);
        assert!(state.enum_targets("shell", "other").is_empty());
        state.remove_target("shell/bootstrap/123/eu-west-1");
        assert!(state.enum_targets("shell", "bootstrap").is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let state = SharedState::default();
        state.set_master_account_id("111".into());
        state.set_binding(binding(ResourceType::OrganizationRoot, "Root", "r-1"));

        let text = state.snapshot().to_json().unwrap();
        assert!(text.contains("OC::ORG::OrganizationRoot"));
        let restored = PersistedState::from_json(&text).unwrap();
        assert_eq!(restored, state.snapshot());
    }

    #[test]
    fn test_missing_fields_default() {
        let state = PersistedState::from_json("{}").unwrap();
        assert_eq!(state, PersistedState::default());
    }
}
