//! Organization store contract
//!
//! The raw organization store (create/rename/delete) lives outside the
//! hierarchy crates; they only read organization records and parent/child
//! edges through [`OrganizationStore`]. [`MemoryOrganizationStore`] is an
//! in-process implementation for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{OrgError, OrgResult};
use crate::organization::{Organization, OrganizationStatus};

/// Read access to organization records and tree edges.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Fetch one organization, `None` when the id is unknown.
    async fn get_organization(&self, id: Uuid) -> OrgResult<Option<Organization>>;

    /// Fetch one organization by its handle.
    async fn get_organization_by_handle(&self, handle: &str) -> OrgResult<Option<Organization>>;

    /// Ids of the organizations whose parent is `id`.
    async fn list_child_ids(&self, id: Uuid) -> OrgResult<Vec<Uuid>>;
}

#[derive(Default)]
struct MemoryOrganizations {
    organizations: HashMap<Uuid, Organization>,
    children: HashMap<Uuid, Vec<Uuid>>,
    handles: HashMap<String, Uuid>,
}

/// In-memory organization store.
///
/// Enforces the tree invariants on insert: unique id and handle, an existing
/// parent, and `depth == parent.depth + 1`.
///
/// # Examples
///
/// ```
/// use org_core::{MemoryOrganizationStore, Organization, OrganizationStore};
///
/// # async fn example() -> org_core::OrgResult<()> {
/// let store = MemoryOrganizationStore::new();
/// let root = Organization::root("Super", "super");
/// store.insert(root.clone()).await?;
/// store.insert(Organization::child_of(&root, "A", "a")).await?;
/// assert_eq!(store.list_child_ids(root.id).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryOrganizationStore {
    inner: RwLock<MemoryOrganizations>,
}

impl std::fmt::Debug for MemoryOrganizationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryOrganizationStore").finish()
    }
}

impl MemoryOrganizationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an organization.
    ///
    /// # Errors
    ///
    /// * `Validation` - invalid handle or inconsistent depth
    /// * `Conflict` - id or handle already taken
    /// * `NotFound` - the parent does not exist
    pub async fn insert(&self, organization: Organization) -> OrgResult<()> {
        if !Organization::is_valid_handle(&organization.handle) {
            return Err(OrgError::Validation(format!(
                "invalid organization handle '{}'",
                organization.handle
            )));
        }

        let mut inner = self.inner.write().await;

        if inner.organizations.contains_key(&organization.id) {
            return Err(OrgError::Conflict(format!(
                "organization {} already exists",
                organization.id
            )));
        }
        if inner.handles.contains_key(&organization.handle) {
            return Err(OrgError::Conflict(format!(
                "organization handle '{}' is already taken",
                organization.handle
            )));
        }

        match organization.parent_id {
            Some(parent_id) => {
                let parent = inner
                    .organizations
                    .get(&parent_id)
                    .ok_or_else(|| OrgError::not_found("organization", parent_id))?;
                if organization.depth != parent.depth + 1 {
                    return Err(OrgError::Validation(format!(
                        "organization depth {} does not follow parent depth {}",
                        organization.depth, parent.depth
                    )));
                }
                inner.children.entry(parent_id).or_default().push(organization.id);
            }
            None if organization.depth != 0 => {
                return Err(OrgError::Validation(
                    "root organizations must have depth 0".to_string(),
                ));
            }
            None => {}
        }

        inner.handles.insert(organization.handle.clone(), organization.id);
        inner.organizations.insert(organization.id, organization);
        Ok(())
    }

    /// Remove a leaf organization.
    ///
    /// # Errors
    ///
    /// * `NotFound` - unknown id
    /// * `Conflict` - the organization still has children
    pub async fn remove(&self, id: Uuid) -> OrgResult<Organization> {
        let mut inner = self.inner.write().await;

        if inner.children.get(&id).is_some_and(|c| !c.is_empty()) {
            return Err(OrgError::Conflict(format!(
                "organization {} still has sub-organizations",
                id
            )));
        }

        let organization = inner
            .organizations
            .remove(&id)
            .ok_or_else(|| OrgError::not_found("organization", id))?;

        inner.handles.remove(&organization.handle);
        inner.children.remove(&id);
        if let Some(parent_id) = organization.parent_id {
            if let Some(siblings) = inner.children.get_mut(&parent_id) {
                siblings.retain(|c| *c != id);
            }
        }
        Ok(organization)
    }

    /// Change an organization's status.
    pub async fn set_status(&self, id: Uuid, status: OrganizationStatus) -> OrgResult<()> {
        let mut inner = self.inner.write().await;
        let organization = inner
            .organizations
            .get_mut(&id)
            .ok_or_else(|| OrgError::not_found("organization", id))?;
        organization.status = status;
        organization.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Number of stored organizations.
    pub async fn len(&self) -> usize {
        self.inner.read().await.organizations.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.organizations.is_empty()
    }
}

#[async_trait]
impl OrganizationStore for MemoryOrganizationStore {
    async fn get_organization(&self, id: Uuid) -> OrgResult<Option<Organization>> {
        Ok(self.inner.read().await.organizations.get(&id).cloned())
    }

    async fn get_organization_by_handle(&self, handle: &str) -> OrgResult<Option<Organization>> {
        let inner = self.inner.read().await;
        Ok(inner
            .handles
            .get(handle)
            .and_then(|id| inner.organizations.get(id))
            .cloned())
    }

    async fn list_child_ids(&self, id: Uuid) -> OrgResult<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .children
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryOrganizationStore::new();
        let root = Organization::root("Super", "super");
        let child = Organization::child_of(&root, "A", "a");

        store.insert(root.clone()).await.unwrap();
        store.insert(child.clone()).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.list_child_ids(root.id).await.unwrap(), vec![child.id]);
        let by_handle = store.get_organization_by_handle("a").await.unwrap().unwrap();
        assert_eq!(by_handle.id, child.id);
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_parent() {
        let store = MemoryOrganizationStore::new();
        let root = Organization::root("Super", "super");
        let orphan = Organization::child_of(&root, "A", "a");

        let err = store.insert(orphan).await.unwrap_err();
        assert!(matches!(err, OrgError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_handle_and_bad_depth() {
        let store = MemoryOrganizationStore::new();
        let root = Organization::root("Super", "super");
        store.insert(root.clone()).await.unwrap();

        let dup = Organization::root("Other", "super");
        assert!(matches!(store.insert(dup).await, Err(OrgError::Conflict(_))));

        let mut skewed = Organization::child_of(&root, "A", "a");
        skewed.depth = 5;
        assert!(matches!(store.insert(skewed).await, Err(OrgError::Validation(_))));

        let bad_handle = Organization::root("Spaces", "has spaces");
        assert!(matches!(store.insert(bad_handle).await, Err(OrgError::Validation(_))));
    }

    #[tokio::test]
    async fn test_remove_only_leaves() {
        let store = MemoryOrganizationStore::new();
        let root = Organization::root("Super", "super");
        let child = Organization::child_of(&root, "A", "a");
        store.insert(root.clone()).await.unwrap();
        store.insert(child.clone()).await.unwrap();

        assert!(matches!(store.remove(root.id).await, Err(OrgError::Conflict(_))));

        store.remove(child.id).await.unwrap();
        assert!(store.list_child_ids(root.id).await.unwrap().is_empty());
        assert!(store.get_organization_by_handle("a").await.unwrap().is_none());
        store.remove(root.id).await.unwrap();
        assert!(store.is_empty().await);
    }
}
