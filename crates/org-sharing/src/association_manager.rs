//! Organization user association manager
//!
//! Maps a real user identity to the shared-user identities minted for it in
//! descendant organizations.

use std::sync::Arc;

use org_core::{with_retry, OrgError, OrgResult, OrganizationTree, RetryConfig};
use org_events::{publish_best_effort, AssociationEvent, EventBus};
use tracing::instrument;
use uuid::Uuid;

use crate::association::{AssociationKey, OrganizationUserAssociation};
use crate::association_store::AssociationStore;

/// Manager for real-user to shared-user associations.
///
/// `associate` is safe to call concurrently for the same triple, from one
/// process or many: the store's compare-and-create decides the winner and
/// every caller gets the winner's shared user id.
pub struct AssociationManager {
    tree: Arc<OrganizationTree>,
    store: Arc<dyn AssociationStore>,
    events: Option<Arc<dyn EventBus>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for AssociationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationManager")
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl AssociationManager {
    /// Create a manager over a tree index and an association store.
    pub fn new(tree: Arc<OrganizationTree>, store: Arc<dyn AssociationStore>) -> Self {
        let retry = tree.config().retry_config();
        Self {
            tree,
            store,
            events: None,
            retry,
        }
    }

    /// Publish association changes on an event bus.
    pub fn with_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Get or create the shared user of `real_user_id` in `sub_organization_id`.
    ///
    /// Idempotent: the same triple always yields the same shared user id.
    ///
    /// # Errors
    ///
    /// * `NotFound` - either organization is unknown
    /// * `Validation` - the sub-organization is not a strict descendant of
    ///   the resident organization
    #[instrument(level = "debug", skip(self))]
    pub async fn associate(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
        sub_organization_id: Uuid,
    ) -> OrgResult<Uuid> {
        let key = AssociationKey::new(real_user_id, resident_organization_id, sub_organization_id);

        if let Some(existing) = self.get(&key).await? {
            return Ok(existing.shared_user_id);
        }

        self.tree.get_organization(resident_organization_id).await?;
        if !self
            .tree
            .is_ancestor(resident_organization_id, sub_organization_id)
            .await?
        {
            return Err(OrgError::Validation(format!(
                "organization {} is not a descendant of resident organization {}",
                sub_organization_id, resident_organization_id
            )));
        }

        let candidate = OrganizationUserAssociation::mint(key);
        let stored = self
            .store
            .create_if_absent(candidate.clone())
            .await
            .map_err(|e| log_store_failure("create_if_absent", &key, e))?;

        if stored.shared_user_id == candidate.shared_user_id {
            tracing::info!(
                real_user = %real_user_id,
                resident_org = %resident_organization_id,
                sub_org = %sub_organization_id,
                shared_user = %stored.shared_user_id,
                "Shared user created"
            );
            self.emit(AssociationEvent::Created {
                real_user_id,
                resident_org_id: resident_organization_id,
                shared_user_id: stored.shared_user_id,
                sub_org_id: sub_organization_id,
            })
            .await;
        }
        Ok(stored.shared_user_id)
    }

    /// Shared user of `real_user_id` in `sub_organization_id`, if any.
    pub async fn resolve_shared_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
        sub_organization_id: Uuid,
    ) -> OrgResult<Option<Uuid>> {
        let key = AssociationKey::new(real_user_id, resident_organization_id, sub_organization_id);
        Ok(self.get(&key).await?.map(|a| a.shared_user_id))
    }

    /// The association a shared user was minted for, if any.
    pub async fn resolve_real_user(&self, shared_user_id: Uuid) -> OrgResult<Option<OrganizationUserAssociation>> {
        with_retry(&self.retry, "get_by_shared_user", || {
            self.store.get_by_shared_user(shared_user_id)
        })
        .await
    }

    /// Associations of a real user under its resident organization.
    pub async fn list_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>> {
        with_retry(&self.retry, "list_for_real_user", || {
            self.store.list_for_real_user(real_user_id, resident_organization_id)
        })
        .await
    }

    /// Shared users living in a sub-organization.
    pub async fn list_for_sub_organization(&self, sub_organization_id: Uuid) -> OrgResult<Vec<OrganizationUserAssociation>> {
        with_retry(&self.retry, "list_for_sub_organization", || {
            self.store.list_for_sub_organization(sub_organization_id)
        })
        .await
    }

    /// Remove every association of a real user, e.g. when the user is deleted.
    ///
    /// Returns the removed associations.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>> {
        let removed = self
            .store
            .remove_for_real_user(real_user_id, resident_organization_id)
            .await
            .map_err(|e| {
                log_store_failure(
                    "remove_for_real_user",
                    &format!("{}@{}", real_user_id, resident_organization_id),
                    e,
                )
            })?;
        tracing::info!(
            real_user = %real_user_id,
            resident_org = %resident_organization_id,
            removed = removed.len(),
            "Removed shared users of real user"
        );
        self.emit_removed(&removed).await;
        Ok(removed)
    }

    /// Remove the association of exactly one shared user.
    ///
    /// Returns whether an association was removed. Other shared users of
    /// the same real user are untouched.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_association(&self, shared_user_id: Uuid, resident_organization_id: Uuid) -> OrgResult<bool> {
        let removed = self
            .store
            .remove(shared_user_id, resident_organization_id)
            .await
            .map_err(|e| log_store_failure("remove", &shared_user_id, e))?;

        match removed {
            Some(association) => {
                tracing::info!(shared_user = %shared_user_id, "Shared user removed");
                self.emit_removed(std::slice::from_ref(&association)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every shared user living in a sub-organization, e.g. when it is deleted.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_for_sub_organization(
        &self,
        sub_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>> {
        let removed = self
            .store
            .remove_for_sub_organization(sub_organization_id)
            .await
            .map_err(|e| log_store_failure("remove_for_sub_organization", &sub_organization_id, e))?;
        tracing::info!(sub_org = %sub_organization_id, removed = removed.len(), "Removed shared users of organization");
        self.emit_removed(&removed).await;
        Ok(removed)
    }

    async fn get(&self, key: &AssociationKey) -> OrgResult<Option<OrganizationUserAssociation>> {
        with_retry(&self.retry, "get_association", || self.store.get(key))
            .await
            .map_err(|e| log_store_failure("get_association", key, e))
    }

    async fn emit_removed(&self, removed: &[OrganizationUserAssociation]) {
        for association in removed {
            self.emit(AssociationEvent::Removed {
                real_user_id: association.real_user_id,
                resident_org_id: association.resident_organization_id,
                shared_user_id: association.shared_user_id,
                sub_org_id: association.sub_organization_id,
            })
            .await;
        }
    }

    async fn emit(&self, event: AssociationEvent) {
        if let Some(events) = &self.events {
            publish_best_effort(events.as_ref(), event.to_event()).await;
        }
    }
}

fn log_store_failure(operation: &'static str, id: &dyn std::fmt::Display, error: OrgError) -> OrgError {
    if error.is_server_error() {
        tracing::error!(operation, id = %id, error = %error, "Association store failed");
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association_store::MemoryAssociationStore;
    use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization};
    use org_events::MemoryEventBus;

    struct Fixture {
        manager: AssociationManager,
        root: Organization,
        a: Organization,
        a1: Organization,
        b: Organization,
    }

    async fn fixture() -> Fixture {
        let orgs = Arc::new(MemoryOrganizationStore::new());
        let root = Organization::root("Super", "super");
        let a = Organization::child_of(&root, "A", "a");
        let a1 = Organization::child_of(&a, "A1", "a1");
        let b = Organization::child_of(&root, "B", "b");
        for org in [&root, &a, &a1, &b] {
            orgs.insert(org.clone()).await.unwrap();
        }
        let tree = Arc::new(OrganizationTree::new(orgs, HierarchyConfig::default()));
        Fixture {
            manager: AssociationManager::new(tree, Arc::new(MemoryAssociationStore::new())),
            root,
            a,
            a1,
            b,
        }
    }

    #[tokio::test]
    async fn test_associate_is_idempotent_per_sub_organization() {
        let f = fixture().await;
        let user = Uuid::now_v7();

        let first = f.manager.associate(user, f.root.id, f.a.id).await.unwrap();
        let again = f.manager.associate(user, f.root.id, f.a.id).await.unwrap();
        let other = f.manager.associate(user, f.root.id, f.b.id).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_ne!(first, user);
        assert_eq!(
            f.manager.resolve_shared_user(user, f.root.id, f.a.id).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_concurrent_associate_converges() {
        let f = fixture().await;
        let manager = Arc::new(f.manager);
        let user = Uuid::now_v7();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            let (root, a1) = (f.root.id, f.a1.id);
            handles.push(tokio::spawn(async move { manager.associate(user, root, a1).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(manager.list_for_real_user(user, f.root.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_associate_requires_descendant() {
        let f = fixture().await;
        let user = Uuid::now_v7();

        assert!(matches!(
            f.manager.associate(user, f.a.id, f.b.id).await,
            Err(OrgError::Validation(_))
        ));
        assert!(matches!(
            f.manager.associate(user, f.a.id, f.a.id).await,
            Err(OrgError::Validation(_))
        ));
        assert!(f
            .manager
            .associate(user, f.a.id, Uuid::now_v7())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_real_user() {
        let f = fixture().await;
        let user = Uuid::now_v7();
        let shared = f.manager.associate(user, f.a.id, f.a1.id).await.unwrap();

        let association = f.manager.resolve_real_user(shared).await.unwrap().unwrap();
        assert_eq!(association.real_user_id, user);
        assert_eq!(association.resident_organization_id, f.a.id);
        assert_eq!(association.sub_organization_id, f.a1.id);
        assert!(f.manager.resolve_real_user(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_association_removes_exactly_one() {
        let f = fixture().await;
        let user = Uuid::now_v7();
        let in_a = f.manager.associate(user, f.root.id, f.a.id).await.unwrap();
        let in_b = f.manager.associate(user, f.root.id, f.b.id).await.unwrap();

        assert!(f.manager.remove_association(in_a, f.root.id).await.unwrap());
        assert!(!f.manager.remove_association(in_a, f.root.id).await.unwrap());

        let left = f.manager.list_for_real_user(user, f.root.id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].shared_user_id, in_b);
    }

    #[tokio::test]
    async fn test_cascades_emit_events() {
        let f = fixture().await;
        let bus = Arc::new(MemoryEventBus::new());
        let manager = f.manager.with_events(bus.clone() as Arc<dyn EventBus>);
        let mut removed = bus.subscribe("association.user.removed").await.unwrap();
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());

        manager.associate(alice, f.root.id, f.a.id).await.unwrap();
        manager.associate(alice, f.root.id, f.a1.id).await.unwrap();
        manager.associate(bob, f.root.id, f.a1.id).await.unwrap();

        let gone = manager.remove_for_sub_organization(f.a1.id).await.unwrap();
        assert_eq!(gone.len(), 2);
        assert_eq!(removed.recv().await.unwrap().org_id, Some(f.a1.id));
        assert_eq!(removed.recv().await.unwrap().org_id, Some(f.a1.id));

        let gone = manager.remove_for_real_user(alice, f.root.id).await.unwrap();
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].sub_organization_id, f.a.id);
        assert_eq!(bus.stats().await.events_published, 6);
    }
}
