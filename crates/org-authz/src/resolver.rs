//! Authorization decisions over permission paths

use std::sync::Arc;

use org_core::{with_retry, OrgError, OrgResult, RetryConfig};
use tracing::instrument;
use uuid::Uuid;

use crate::path::PermissionPath;
use crate::permissions::PermissionSet;
use crate::store::PermissionStore;

/// Resolves whether a user holds a permission within an organization.
///
/// A user holding `/permission/admin` is authorized for every path nested
/// under it, such as `/permission/admin/manage/users`.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use org_authz::{AuthorizationResolver, MemoryPermissionStore, PermissionPath};
/// use uuid::Uuid;
///
/// async fn example() -> org_core::OrgResult<()> {
///     let store = Arc::new(MemoryPermissionStore::new());
///     let (user, org) = (Uuid::now_v7(), Uuid::now_v7());
///     store.grant(user, org, PermissionPath::parse("/permission/admin")?).await;
///
///     let resolver = AuthorizationResolver::new(store);
///     let required = PermissionPath::parse("/permission/admin/manage/users")?;
///     assert!(resolver.is_authorized(user, &required, org).await?);
///     Ok(())
/// }
/// ```
pub struct AuthorizationResolver {
    store: Arc<dyn PermissionStore>,
    retry: RetryConfig,
}

impl std::fmt::Debug for AuthorizationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationResolver")
            .field("retry", &self.retry)
            .finish()
    }
}

impl AuthorizationResolver {
    /// Create a resolver with the default retry policy.
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    /// Use a specific retry policy for store reads.
    ///
    /// Pass `HierarchyConfig::retry_config()` to share the hierarchy's settings.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Permissions assigned to a user in an organization.
    pub async fn permissions_for(&self, user_id: Uuid, organization_id: Uuid) -> OrgResult<PermissionSet> {
        with_retry(&self.retry, "permissions_for", || {
            self.store.permissions_for(user_id, organization_id)
        })
        .await
        .map_err(|e| log_store_failure(user_id, organization_id, e))
    }

    /// Check whether `user_id` holds `required` in `organization_id`.
    ///
    /// True iff the assigned permissions contain `required` or one of its
    /// prefix reductions.
    #[instrument(level = "debug", skip(self, required), fields(required = %required))]
    pub async fn is_authorized(
        &self,
        user_id: Uuid,
        required: &PermissionPath,
        organization_id: Uuid,
    ) -> OrgResult<bool> {
        let assigned = self.permissions_for(user_id, organization_id).await?;
        let authorized = assigned.grants(required);
        tracing::debug!(authorized, assigned = assigned.len(), "Authorization evaluated");
        Ok(authorized)
    }

    /// Parse `required` and check it.
    ///
    /// # Errors
    ///
    /// `Validation` when `required` is not a well-formed permission path.
    pub async fn is_authorized_str(
        &self,
        user_id: Uuid,
        required: &str,
        organization_id: Uuid,
    ) -> OrgResult<bool> {
        let required = PermissionPath::parse(required)?;
        self.is_authorized(user_id, &required, organization_id).await
    }

    /// The subset of `candidates` in which `user_id` holds `required`,
    /// in the order given.
    #[instrument(level = "debug", skip(self, required, candidates), fields(required = %required, candidates = candidates.len()))]
    pub async fn authorized_organizations(
        &self,
        user_id: Uuid,
        required: &PermissionPath,
        candidates: &[Uuid],
    ) -> OrgResult<Vec<Uuid>> {
        let mut authorized = Vec::new();
        for &organization_id in candidates {
            if authorized.contains(&organization_id) {
                continue;
            }
            if self.permissions_for(user_id, organization_id).await?.grants(required) {
                authorized.push(organization_id);
            }
        }
        Ok(authorized)
    }
}

fn log_store_failure(user_id: Uuid, organization_id: Uuid, error: OrgError) -> OrgError {
    if error.is_server_error() {
        tracing::error!(
            user = %user_id,
            organization = %organization_id,
            error = %error,
            "Permission store failed"
        );
    }
    error
}
