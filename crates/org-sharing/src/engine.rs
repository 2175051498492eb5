//! Sharing policy evaluation
//!
//! The engine validates policies against the organization tree before they
//! are stored and answers whether a resource is visible to a given
//! organization. Every evaluation goes through the target's ancestor chain.

use std::collections::BTreeSet;
use std::sync::Arc;

use org_core::{with_retry, OrgError, OrgResult, OrganizationTree, RetryConfig};
use org_events::{publish_best_effort, EventBus, SharingEvent};
use tracing::instrument;
use uuid::Uuid;

use crate::policy::{PolicyKey, PolicyType, ResourceSharingPolicy, SharedResourceAttribute};
use crate::policy_store::SharingPolicyStore;

/// Resource sharing policy engine.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
/// use org_sharing::{MemorySharingPolicyStore, PolicyType, ResourceSharingPolicy, ResourceType, SharingPolicyEngine};
///
/// async fn example() -> org_core::OrgResult<()> {
///     let orgs = Arc::new(MemoryOrganizationStore::new());
///     let root = Organization::root("Super", "super");
///     let child = Organization::child_of(&root, "Acme", "acme");
///     orgs.insert(root.clone()).await?;
///     orgs.insert(child.clone()).await?;
///
///     let tree = Arc::new(OrganizationTree::new(orgs, HierarchyConfig::default()));
///     let engine = SharingPolicyEngine::new(tree, Arc::new(MemorySharingPolicyStore::new()));
///
///     let policy = ResourceSharingPolicy::new(root.id, ResourceType::Application, "console", PolicyType::All);
///     let key = policy.key();
///     engine.set_policy(policy).await?;
///     assert!(engine.is_shared_with(&key, child.id).await?);
///     Ok(())
/// }
/// ```
pub struct SharingPolicyEngine {
    tree: Arc<OrganizationTree>,
    store: Arc<dyn SharingPolicyStore>,
    events: Option<Arc<dyn EventBus>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for SharingPolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharingPolicyEngine")
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl SharingPolicyEngine {
    /// Create an engine over a tree index and a policy store.
    pub fn new(tree: Arc<OrganizationTree>, store: Arc<dyn SharingPolicyStore>) -> Self {
        let retry = tree.config().retry_config();
        Self {
            tree,
            store,
            events: None,
            retry,
        }
    }

    /// Publish policy changes on an event bus.
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Create or fully replace the policy for a resource.
    ///
    /// The previous policy's targets and attributes are discarded.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the owner organization is unknown
    /// * `Validation` - empty ids, or targets that do not fit the policy type
    /// * `Conflict` - the resource already has a policy with another owner
    #[instrument(level = "debug", skip(self, policy), fields(resource = %policy.key()))]
    pub async fn set_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<ResourceSharingPolicy> {
        self.validate(&policy).await?;
        let key = policy.key();

        let previous = self
            .store
            .replace_policy(policy.clone())
            .await
            .map_err(|e| log_store_failure("replace_policy", &key, e))?;

        tracing::info!(
            resource = %key,
            owner = %policy.owner_organization_id,
            policy_type = %policy.policy_type,
            replaced = previous.is_some(),
            "Sharing policy set"
        );
        self.emit_set(&policy, previous.is_some()).await;
        Ok(policy)
    }

    /// Create the policy for a resource that has none yet.
    ///
    /// # Errors
    ///
    /// As [`SharingPolicyEngine::set_policy`], plus `Conflict` when the
    /// resource already has a policy.
    #[instrument(level = "debug", skip(self, policy), fields(resource = %policy.key()))]
    pub async fn create_policy(&self, policy: ResourceSharingPolicy) -> OrgResult<ResourceSharingPolicy> {
        self.validate(&policy).await?;
        let key = policy.key();

        self.store
            .create_policy(policy.clone())
            .await
            .map_err(|e| log_store_failure("create_policy", &key, e))?;

        tracing::info!(resource = %key, owner = %policy.owner_organization_id, "Sharing policy created");
        self.emit_set(&policy, false).await;
        Ok(policy)
    }

    /// Policy currently attached to a resource.
    pub async fn get_policy(&self, key: &PolicyKey) -> OrgResult<Option<ResourceSharingPolicy>> {
        with_retry(&self.retry, "get_policy", || self.store.get_policy(key))
            .await
            .map_err(|e| log_store_failure("get_policy", key, e))
    }

    /// Check whether a resource is shared with `target_organization_id`.
    ///
    /// A resource without a policy is shared with nobody, and the owner is
    /// never a target of its own policy.
    ///
    /// # Errors
    ///
    /// `NotFound` when the target organization is unknown.
    #[instrument(level = "debug", skip(self), fields(resource = %key))]
    pub async fn is_shared_with(&self, key: &PolicyKey, target_organization_id: Uuid) -> OrgResult<bool> {
        let chain = self.tree.get_ancestor_chain(target_organization_id).await?;
        Ok(match self.get_policy(key).await? {
            Some(policy) => applies_to(&policy, &chain),
            None => false,
        })
    }

    /// Remove the policy of a resource together with its attributes.
    ///
    /// # Errors
    ///
    /// `NotFound` when the resource has no policy.
    #[instrument(level = "debug", skip(self), fields(resource = %key))]
    pub async fn remove_policy(&self, key: &PolicyKey) -> OrgResult<ResourceSharingPolicy> {
        let removed = self
            .store
            .remove_policy(key)
            .await
            .map_err(|e| log_store_failure("remove_policy", key, e))?
            .ok_or_else(|| OrgError::not_found("sharing policy", key))?;

        tracing::info!(resource = %key, owner = %removed.owner_organization_id, "Sharing policy removed");
        self.emit_removed(&removed).await;
        Ok(removed)
    }

    /// Attributes attached to a resource's policy.
    ///
    /// # Errors
    ///
    /// `NotFound` when the resource has no policy.
    pub async fn get_attributes(&self, key: &PolicyKey) -> OrgResult<Vec<SharedResourceAttribute>> {
        self.get_policy(key)
            .await?
            .map(|policy| policy.attributes)
            .ok_or_else(|| OrgError::not_found("sharing policy", key))
    }

    /// Attributes that accompany the resource into `target_organization_id`.
    ///
    /// `None` when the resource is not shared with the target.
    pub async fn shared_attributes_for(
        &self,
        key: &PolicyKey,
        target_organization_id: Uuid,
    ) -> OrgResult<Option<Vec<SharedResourceAttribute>>> {
        let chain = self.tree.get_ancestor_chain(target_organization_id).await?;
        Ok(self
            .get_policy(key)
            .await?
            .filter(|policy| applies_to(policy, &chain))
            .map(|policy| policy.attributes))
    }

    /// Every organization the resource is currently shared with.
    ///
    /// `ALL` and `IMMEDIATE_CHILDREN` are expanded through the tree; selected
    /// targets that no longer exist are skipped.
    pub async fn shared_organizations(&self, key: &PolicyKey) -> OrgResult<BTreeSet<Uuid>> {
        let Some(policy) = self.get_policy(key).await? else {
            return Ok(BTreeSet::new());
        };
        let owner = policy.owner_organization_id;

        match policy.policy_type {
            PolicyType::All => Ok(self.tree.get_descendants(owner).await?.into_iter().collect()),
            PolicyType::ImmediateChildren => Ok(self.tree.get_children(owner).await?.into_iter().collect()),
            PolicyType::Selected => {
                let mut shared = BTreeSet::new();
                for target in policy.targets {
                    match self.tree.get_organization(target).await {
                        Ok(_) => {
                            shared.insert(target);
                        }
                        Err(e) if e.is_not_found() => {
                            tracing::debug!(resource = %key, target = %target, "Skipping deleted sharing target");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(shared)
            }
        }
    }

    /// Policies attached to resources owned by an organization.
    pub async fn list_policies_by_owner(&self, owner_organization_id: Uuid) -> OrgResult<Vec<ResourceSharingPolicy>> {
        with_retry(&self.retry, "list_policies_by_owner", || {
            self.store.list_policies_by_owner(owner_organization_id)
        })
        .await
    }

    /// Remove every policy owned by an organization, e.g. when it is deleted.
    ///
    /// Returns the number of removed policies.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_policies_for_owner(&self, owner_organization_id: Uuid) -> OrgResult<usize> {
        let mut removed = 0;
        for policy in self.list_policies_by_owner(owner_organization_id).await? {
            let key = policy.key();
            if let Some(policy) = self
                .store
                .remove_policy(&key)
                .await
                .map_err(|e| log_store_failure("remove_policy", &key, e))?
            {
                self.emit_removed(&policy).await;
                removed += 1;
            }
        }
        tracing::info!(owner = %owner_organization_id, removed, "Removed sharing policies of organization");
        Ok(removed)
    }

    /// Validate a policy against the tree.
    ///
    /// * The resource id must not be empty and attributes need ids.
    /// * `SELECTED` requires a non-empty target set of strict descendants
    ///   of the owner.
    /// * Other policy types take no explicit targets.
    async fn validate(&self, policy: &ResourceSharingPolicy) -> OrgResult<()> {
        if policy.resource_id.trim().is_empty() {
            return Err(OrgError::Validation("resource id must not be empty".to_string()));
        }
        if policy.attributes.iter().any(|a| a.attribute_id.trim().is_empty()) {
            return Err(OrgError::Validation("attribute id must not be empty".to_string()));
        }
        let owner = self.tree.get_organization(policy.owner_organization_id).await?.id;

        match policy.policy_type {
            PolicyType::Selected => {
                if policy.targets.is_empty() {
                    return Err(OrgError::Validation(
                        "a selected sharing policy needs at least one target organization".to_string(),
                    ));
                }
                for target in &policy.targets {
                    let is_descendant = match self.tree.is_ancestor(owner, *target).await {
                        Ok(is_descendant) => is_descendant,
                        Err(e) if e.is_not_found() => false,
                        Err(e) => return Err(e),
                    };
                    if !is_descendant {
                        return Err(OrgError::Validation(format!(
                            "organization {} is not a descendant of owner {}",
                            target, owner
                        )));
                    }
                }
            }
            PolicyType::All | PolicyType::ImmediateChildren => {
                if !policy.targets.is_empty() {
                    return Err(OrgError::Validation(format!(
                        "explicit targets are only allowed for selected policies, not {}",
                        policy.policy_type
                    )));
                }
            }
        }
        Ok(())
    }

    async fn emit_set(&self, policy: &ResourceSharingPolicy, replaced: bool) {
        if let Some(events) = &self.events {
            let event = SharingEvent::PolicySet {
                policy_id: policy.id,
                owner_org_id: policy.owner_organization_id,
                resource_type: policy.resource_type.to_string(),
                resource_id: policy.resource_id.clone(),
                policy_type: policy.policy_type.to_string(),
                attribute_count: policy.attributes.len(),
                replaced,
            };
            publish_best_effort(events.as_ref(), event.to_event()).await;
        }
    }

    async fn emit_removed(&self, policy: &ResourceSharingPolicy) {
        if let Some(events) = &self.events {
            let event = SharingEvent::PolicyRemoved {
                policy_id: policy.id,
                owner_org_id: policy.owner_organization_id,
                resource_type: policy.resource_type.to_string(),
                resource_id: policy.resource_id.clone(),
            };
            publish_best_effort(events.as_ref(), event.to_event()).await;
        }
    }
}

/// Evaluate a policy against the target's ancestor chain (target first).
fn applies_to(policy: &ResourceSharingPolicy, chain: &[Uuid]) -> bool {
    let owner = policy.owner_organization_id;
    match policy.policy_type {
        PolicyType::All => chain.iter().skip(1).any(|id| *id == owner),
        PolicyType::ImmediateChildren => chain.get(1) == Some(&owner),
        PolicyType::Selected => chain.first().is_some_and(|target| policy.targets.contains(target)),
    }
}

fn log_store_failure(operation: &'static str, key: &PolicyKey, error: OrgError) -> OrgError {
    if error.is_server_error() {
        tracing::error!(operation, resource = %key, error = %error, "Sharing policy store failed");
    }
    error
}
