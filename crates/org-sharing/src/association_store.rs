//! Persistence boundary for user associations
//!
//! Uniqueness of (real user, resident organization, sub-organization) is
//! enforced here through [`AssociationStore::create_if_absent`], so callers
//! on different service instances converge on one shared user.

use async_trait::async_trait;
use org_core::{OrgError, OrgResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::association::{AssociationKey, OrganizationUserAssociation};

/// Storage for organization user associations.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Compare-and-create on the association key.
    ///
    /// Returns the stored association: `candidate` when it was inserted, the
    /// existing association otherwise. Fails with `Conflict` when the
    /// candidate's shared user id is already bound to another key.
    async fn create_if_absent(&self, candidate: OrganizationUserAssociation) -> OrgResult<OrganizationUserAssociation>;

    /// Fetch the association for a key.
    async fn get(&self, key: &AssociationKey) -> OrgResult<Option<OrganizationUserAssociation>>;

    /// Fetch the association of a shared user.
    async fn get_by_shared_user(&self, shared_user_id: Uuid) -> OrgResult<Option<OrganizationUserAssociation>>;

    /// Associations of a real user under a resident organization.
    async fn list_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>>;

    /// Associations whose shared user lives in a sub-organization.
    async fn list_for_sub_organization(&self, sub_organization_id: Uuid) -> OrgResult<Vec<OrganizationUserAssociation>>;

    /// Remove the association of one shared user, scoped to its resident organization.
    async fn remove(
        &self,
        shared_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Option<OrganizationUserAssociation>>;

    /// Remove every association of a real user under a resident organization.
    async fn remove_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>>;

    /// Remove every association whose shared user lives in a sub-organization.
    async fn remove_for_sub_organization(&self, sub_organization_id: Uuid) -> OrgResult<Vec<OrganizationUserAssociation>>;
}

#[derive(Debug, Default)]
struct Associations {
    by_key: HashMap<AssociationKey, OrganizationUserAssociation>,
    by_shared_user: HashMap<Uuid, AssociationKey>,
}

impl Associations {
    fn remove_where<F>(&mut self, predicate: F) -> Vec<OrganizationUserAssociation>
    where
        F: Fn(&OrganizationUserAssociation) -> bool,
    {
        let keys: Vec<AssociationKey> = self
            .by_key
            .values()
            .filter(|association| predicate(association))
            .map(OrganizationUserAssociation::key)
            .collect();

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(association) = self.by_key.remove(&key) {
                self.by_shared_user.remove(&association.shared_user_id);
                removed.push(association);
            }
        }
        removed.sort_by_key(|association| association.sub_organization_id);
        removed
    }

    fn list_where<F>(&self, predicate: F) -> Vec<OrganizationUserAssociation>
    where
        F: Fn(&OrganizationUserAssociation) -> bool,
    {
        let mut found: Vec<OrganizationUserAssociation> = self
            .by_key
            .values()
            .filter(|association| predicate(association))
            .cloned()
            .collect();
        found.sort_by_key(|association| association.sub_organization_id);
        found
    }
}

/// In-memory association store.
///
/// A single write lock makes compare-and-create atomic.
#[derive(Debug, Default)]
pub struct MemoryAssociationStore {
    inner: RwLock<Associations>,
}

impl MemoryAssociationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored associations.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_key.len()
    }

    /// Check if the store holds no associations.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_key.is_empty()
    }
}

#[async_trait]
impl AssociationStore for MemoryAssociationStore {
    async fn create_if_absent(&self, candidate: OrganizationUserAssociation) -> OrgResult<OrganizationUserAssociation> {
        let mut inner = self.inner.write().await;
        let key = candidate.key();

        if let Some(existing) = inner.by_key.get(&key) {
            return Ok(existing.clone());
        }
        if inner.by_shared_user.contains_key(&candidate.shared_user_id) {
            return Err(OrgError::Conflict(format!(
                "shared user {} is already associated",
                candidate.shared_user_id
            )));
        }

        inner.by_shared_user.insert(candidate.shared_user_id, key);
        inner.by_key.insert(key, candidate.clone());
        Ok(candidate)
    }

    async fn get(&self, key: &AssociationKey) -> OrgResult<Option<OrganizationUserAssociation>> {
        Ok(self.inner.read().await.by_key.get(key).cloned())
    }

    async fn get_by_shared_user(&self, shared_user_id: Uuid) -> OrgResult<Option<OrganizationUserAssociation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_shared_user
            .get(&shared_user_id)
            .and_then(|key| inner.by_key.get(key))
            .cloned())
    }

    async fn list_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>> {
        Ok(self.inner.read().await.list_where(|a| {
            a.real_user_id == real_user_id && a.resident_organization_id == resident_organization_id
        }))
    }

    async fn list_for_sub_organization(&self, sub_organization_id: Uuid) -> OrgResult<Vec<OrganizationUserAssociation>> {
        Ok(self
            .inner
            .read()
            .await
            .list_where(|a| a.sub_organization_id == sub_organization_id))
    }

    async fn remove(
        &self,
        shared_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Option<OrganizationUserAssociation>> {
        let mut inner = self.inner.write().await;
        let key = match inner.by_shared_user.get(&shared_user_id) {
            Some(key) if key.resident_organization_id == resident_organization_id => *key,
            _ => return Ok(None),
        };
        inner.by_shared_user.remove(&shared_user_id);
        Ok(inner.by_key.remove(&key))
    }

    async fn remove_for_real_user(
        &self,
        real_user_id: Uuid,
        resident_organization_id: Uuid,
    ) -> OrgResult<Vec<OrganizationUserAssociation>> {
        Ok(self.inner.write().await.remove_where(|a| {
            a.real_user_id == real_user_id && a.resident_organization_id == resident_organization_id
        }))
    }

    async fn remove_for_sub_organization(&self, sub_organization_id: Uuid) -> OrgResult<Vec<OrganizationUserAssociation>> {
        Ok(self
            .inner
            .write()
            .await
            .remove_where(|a| a.sub_organization_id == sub_organization_id))
    }
}
