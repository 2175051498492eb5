//! Permission assignments per user and organization

use async_trait::async_trait;
use org_core::OrgResult;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::path::PermissionPath;
use crate::permissions::PermissionSet;

/// Source of the permissions a user holds within an organization.
///
/// Role expansion happens behind this trait; the resolver only sees the
/// resulting paths.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Permissions assigned to `user_id` in `organization_id`.
    ///
    /// An unknown user or organization yields an empty set.
    async fn permissions_for(&self, user_id: Uuid, organization_id: Uuid) -> OrgResult<PermissionSet>;
}

/// In-memory permission store.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    assignments: RwLock<HashMap<(Uuid, Uuid), PermissionSet>>,
}

impl MemoryPermissionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a permission. Returns `true` if it was not already held.
    pub async fn grant(&self, user_id: Uuid, organization_id: Uuid, path: PermissionPath) -> bool {
        self.assignments
            .write()
            .await
            .entry((user_id, organization_id))
            .or_default()
            .add(path)
    }

    /// Withdraw a permission. Returns `true` if it was held.
    pub async fn revoke(&self, user_id: Uuid, organization_id: Uuid, path: &PermissionPath) -> bool {
        let mut assignments = self.assignments.write().await;
        let Some(set) = assignments.get_mut(&(user_id, organization_id)) else {
            return false;
        };
        let removed = set.remove(path);
        if set.is_empty() {
            assignments.remove(&(user_id, organization_id));
        }
        removed
    }

    /// Withdraw everything a user holds in an organization.
    pub async fn revoke_all(&self, user_id: Uuid, organization_id: Uuid) -> PermissionSet {
        self.assignments
            .write()
            .await
            .remove(&(user_id, organization_id))
            .unwrap_or_default()
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn permissions_for(&self, user_id: Uuid, organization_id: Uuid) -> OrgResult<PermissionSet> {
        Ok(self
            .assignments
            .read()
            .await
            .get(&(user_id, organization_id))
            .cloned()
            .unwrap_or_default())
    }
}
