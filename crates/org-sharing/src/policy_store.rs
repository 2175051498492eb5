//! Persistence boundary for sharing policies
//!
//! A policy and its attributes are stored as one record, so every write
//! below replaces both or neither.

use async_trait::async_trait;
use org_core::{OrgError, OrgResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::policy::{PolicyKey, ResourceSharingPolicy};

/// Storage for sharing policies, keyed by [`PolicyKey`].
#[async_trait]
pub trait SharingPolicyStore: Send + Sync {
    /// Fetch the policy for a resource.
    async fn get_policy(&self, key: &PolicyKey) -> OrgResult<Option<ResourceSharingPolicy>>;

    /// Insert a policy; fails with `Conflict` when the resource already has one.
    async fn create_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<()>;

    /// Insert or atomically replace a policy, returning the previous one.
    ///
    /// Fails with `Conflict` when the existing policy belongs to a different
    /// owner.
    async fn replace_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<Option<ResourceSharingPolicy>>;

    /// Remove a policy and its attributes, returning what was removed.
    async fn remove_policy(&self, key: &PolicyKey) -> OrgResult<Option<ResourceSharingPolicy>>;

    /// All policies owned by an organization.
    async fn list_policies_by_owner(&self, owner_organization_id: Uuid) -> OrgResult<Vec<ResourceSharingPolicy>>;
}

/// In-memory policy store.
#[derive(Debug, Default)]
pub struct MemorySharingPolicyStore {
    policies: RwLock<HashMap<PolicyKey, ResourceSharingPolicy>>,
}

impl MemorySharingPolicyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored policies.
    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }

    /// Check if the store holds no policies.
    pub async fn is_empty(&self) -> bool {
        self.policies.read().await.is_empty()
    }
}

#[async_trait]
impl SharingPolicyStore for MemorySharingPolicyStore {
    async fn get_policy(&self, key: &PolicyKey) -> OrgResult<Option<ResourceSharingPolicy>> {
        Ok(self.policies.read().await.get(key).cloned())
    }

    async fn create_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<()> {
        let mut policies = self.policies.write().await;
        let key = policy.key();
        if policies.contains_key(&key) {
            return Err(OrgError::Conflict(format!("a sharing policy already exists for {}", key)));
        }
        policies.insert(key, policy);
        Ok(())
    }

    async fn replace_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<Option<ResourceSharingPolicy>> {
        let mut policies = self.policies.write().await;
        let key = policy.key();
        if let Some(existing) = policies.get(&key) {
            if existing.owner_organization_id != policy.owner_organization_id {
                return Err(OrgError::Conflict(format!(
                    "{} is owned by organization {}",
                    key, existing.owner_organization_id
                )));
            }
        }
        Ok(policies.insert(key, policy))
    }

    async fn remove_policy(&self, key: &PolicyKey) -> OrgResult<Option<ResourceSharingPolicy>> {
        Ok(self.policies.write().await.remove(key))
    }

    async fn list_policies_by_owner(&self, owner_organization_id: Uuid) -> OrgResult<Vec<ResourceSharingPolicy>> {
        let policies = self.policies.read().await;
        let mut owned: Vec<ResourceSharingPolicy> = policies
            .values()
            .filter(|policy| policy.owner_organization_id == owner_organization_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AttributeType, PolicyType, ResourceType};

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = MemorySharingPolicyStore::new();
        let owner = Uuid::now_v7();
        let policy = ResourceSharingPolicy::new(owner, ResourceType::Application, "console", PolicyType::All);

        store.create_policy(policy.clone()).await.unwrap();
        let err = store.create_policy(policy).await.unwrap_err();
        assert!(matches!(err, OrgError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_replace_swaps_policy_and_attributes() {
        let store = MemorySharingPolicyStore::new();
        let owner = Uuid::now_v7();
        let first = ResourceSharingPolicy::new(owner, ResourceType::Role, "auditor", PolicyType::All)
            .with_attribute(AttributeType::Role, "r1");
        let second = ResourceSharingPolicy::new(owner, ResourceType::Role, "auditor", PolicyType::ImmediateChildren);

        assert!(store.replace_policy(first.clone()).await.unwrap().is_none());
        let previous = store.replace_policy(second.clone()).await.unwrap().unwrap();
        assert_eq!(previous.id, first.id);

        let stored = store.get_policy(&second.key()).await.unwrap().unwrap();
        assert_eq!(stored.id, second.id);
        assert!(stored.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_owner() {
        let store = MemorySharingPolicyStore::new();
        let first = ResourceSharingPolicy::new(Uuid::now_v7(), ResourceType::Idp, "okta", PolicyType::All);
        let hijack = ResourceSharingPolicy::new(Uuid::now_v7(), ResourceType::Idp, "okta", PolicyType::All);

        store.replace_policy(first.clone()).await.unwrap();
        assert!(matches!(
            store.replace_policy(hijack).await,
            Err(OrgError::Conflict(_))
        ));
        assert_eq!(store.get_policy(&first.key()).await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let store = MemorySharingPolicyStore::new();
        let owner = Uuid::now_v7();
        for id in ["b", "a"] {
            store
                .create_policy(ResourceSharingPolicy::new(owner, ResourceType::Application, id, PolicyType::All))
                .await
                .unwrap();
        }
        store
            .create_policy(ResourceSharingPolicy::new(Uuid::now_v7(), ResourceType::Application, "c", PolicyType::All))
            .await
            .unwrap();

        let owned = store.list_policies_by_owner(owner).await.unwrap();
        let ids: Vec<&str> = owned.iter().map(|p| p.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
