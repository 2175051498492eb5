//! Ancestor resolution
//!
//! Resolves a value for an organization by walking its ancestor chain,
//! closest first, and asking a caller-supplied probe at every level. The
//! first level that answers wins, so a definition at an immediate parent
//! always shadows one at the root.
//!
//! The walk knows nothing about what is being resolved. Configuration,
//! feature flags and shared-application identifiers all plug in through
//! [`AncestorProbe`] or [`ApplicationProbe`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::{OrgError, OrgResult};
use crate::tree::OrganizationTree;

/// Looks up a resource defined at exactly one organization.
#[async_trait]
pub trait AncestorProbe<T>: Send + Sync {
    /// Return the resource defined at `organization_id`, if any.
    async fn probe(&self, organization_id: Uuid) -> OrgResult<Option<T>>;
}

/// Looks up a resource defined for one application at exactly one organization.
#[async_trait]
pub trait ApplicationProbe<T>: Send + Sync {
    /// Return the resource defined for `application_id` at `organization_id`, if any.
    async fn probe(&self, organization_id: Uuid, application_id: &str) -> OrgResult<Option<T>>;
}

/// Adapts a synchronous closure into an [`AncestorProbe`].
///
/// # Examples
///
/// ```
/// use org_core::resolver::FnProbe;
/// use uuid::Uuid;
///
/// let defined_at = Uuid::now_v7();
/// let probe = FnProbe(move |org: Uuid| (org == defined_at).then(|| "theme-dark"));
/// ```
pub struct FnProbe<F>(pub F);

impl<F> FnProbe<F> {
    /// Wrap `f`, letting the compiler infer the closure's signature.
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(Uuid) -> Option<T> + Send + Sync,
    {
        Self(f)
    }
}

#[async_trait]
impl<T, F> AncestorProbe<T> for FnProbe<F>
where
    T: Send + 'static,
    F: Fn(Uuid) -> Option<T> + Send + Sync,
{
    async fn probe(&self, organization_id: Uuid) -> OrgResult<Option<T>> {
        Ok((self.0)(organization_id))
    }
}

/// Adapts a synchronous closure into an [`ApplicationProbe`].
pub struct FnApplicationProbe<F>(pub F);

impl<F> FnApplicationProbe<F> {
    /// Wrap `f`, letting the compiler infer the closure's signature.
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(Uuid, &str) -> Option<T> + Send + Sync,
    {
        Self(f)
    }
}

#[async_trait]
impl<T, F> ApplicationProbe<T> for FnApplicationProbe<F>
where
    T: Send + 'static,
    F: Fn(Uuid, &str) -> Option<T> + Send + Sync,
{
    async fn probe(&self, organization_id: Uuid, application_id: &str) -> OrgResult<Option<T>> {
        Ok((self.0)(organization_id, application_id))
    }
}

/// A value found on an ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorHit<T> {
    /// Organization at which the probe answered
    pub organization_id: Uuid,

    /// Levels between the requesting organization and `organization_id`
    pub hops: usize,

    /// The resolved value
    pub resource: T,
}

/// Walks ancestor chains on behalf of resource stores.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use org_core::resolver::{AncestorResolver, FnProbe};
/// use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
///
/// # async fn example() -> org_core::OrgResult<()> {
/// let store = Arc::new(MemoryOrganizationStore::new());
/// let root = Organization::root("Super", "super");
/// let a = Organization::child_of(&root, "A", "a");
/// store.insert(root.clone()).await?;
/// store.insert(a.clone()).await?;
///
/// let resolver = AncestorResolver::new(Arc::new(OrganizationTree::new(store, HierarchyConfig::default())));
/// let root_id = root.id;
/// let hit = resolver
///     .resolve_ancestor_resource(a.id, &FnProbe::new(move |org| (org == root_id).then_some(42)))
///     .await?;
/// assert_eq!(hit.organization_id, root.id);
/// assert_eq!(hit.resource, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AncestorResolver {
    tree: Arc<OrganizationTree>,
}

impl AncestorResolver {
    /// Create a resolver over `tree`.
    pub fn new(tree: Arc<OrganizationTree>) -> Self {
        Self { tree }
    }

    /// The tree index this resolver walks.
    pub fn tree(&self) -> &Arc<OrganizationTree> {
        &self.tree
    }

    /// Resolve a resource for `organization_id`, nearest ancestor first.
    ///
    /// The organization itself is probed first.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the organization is unknown
    /// * `NotFoundInHierarchy` - no organization on the chain answered
    /// * any error returned by the probe, unchanged
    #[instrument(level = "debug", skip(self, probe))]
    pub async fn resolve_ancestor_resource<T, P>(
        &self,
        organization_id: Uuid,
        probe: &P,
    ) -> OrgResult<AncestorHit<T>>
    where
        P: AncestorProbe<T> + ?Sized,
    {
        let chain = self.tree.get_ancestor_chain(organization_id).await?;

        for (hops, candidate) in chain.iter().copied().enumerate() {
            let found = probe.probe(candidate).await.map_err(|e| {
                log_probe_failure(organization_id, candidate, &e);
                e
            })?;
            if let Some(resource) = found {
                debug!(organization_id = %organization_id, resolved_at = %candidate, hops, "Resolved resource on ancestor chain");
                return Ok(AncestorHit {
                    organization_id: candidate,
                    hops,
                    resource,
                });
            }
        }

        Err(OrgError::NotFoundInHierarchy { organization_id })
    }

    /// Resolve a resource scoped to `application_id`, nearest ancestor first.
    ///
    /// Same walk as [`resolve_ancestor_resource`](Self::resolve_ancestor_resource),
    /// with the application passed to the probe at every level.
    #[instrument(level = "debug", skip(self, probe))]
    pub async fn resolve_ancestor_application<T, P>(
        &self,
        organization_id: Uuid,
        application_id: &str,
        probe: &P,
    ) -> OrgResult<AncestorHit<T>>
    where
        P: ApplicationProbe<T> + ?Sized,
    {
        let chain = self.tree.get_ancestor_chain(organization_id).await?;

        for (hops, candidate) in chain.iter().copied().enumerate() {
            let found = probe.probe(candidate, application_id).await.map_err(|e| {
                log_probe_failure(organization_id, candidate, &e);
                e
            })?;
            if let Some(resource) = found {
                debug!(
                    organization_id = %organization_id,
                    application_id,
                    resolved_at = %candidate,
                    hops,
                    "Resolved application resource on ancestor chain"
                );
                return Ok(AncestorHit {
                    organization_id: candidate,
                    hops,
                    resource,
                });
            }
        }

        Err(OrgError::NotFoundInHierarchy { organization_id })
    }

    /// Collect every answer along the chain, nearest first.
    ///
    /// Returns an empty list when nothing on the chain answers.
    pub async fn resolve_all_ancestors<T, P>(
        &self,
        organization_id: Uuid,
        probe: &P,
    ) -> OrgResult<Vec<AncestorHit<T>>>
    where
        P: AncestorProbe<T> + ?Sized,
    {
        let chain = self.tree.get_ancestor_chain(organization_id).await?;
        let mut hits = Vec::new();

        for (hops, candidate) in chain.iter().copied().enumerate() {
            let found = probe.probe(candidate).await.map_err(|e| {
                log_probe_failure(organization_id, candidate, &e);
                e
            })?;
            if let Some(resource) = found {
                hits.push(AncestorHit {
                    organization_id: candidate,
                    hops,
                    resource,
                });
            }
        }
        Ok(hits)
    }
}

fn log_probe_failure(organization_id: Uuid, candidate: Uuid, e: &OrgError) {
    if e.is_server_error() {
        error!(
            organization_id = %organization_id,
            candidate = %candidate,
            error = %e,
            "Probe failed during ancestor resolution"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyConfig;
    use crate::organization::Organization;
    use crate::store::MemoryOrganizationStore;
    use std::collections::HashMap;

    async fn tree() -> (AncestorResolver, Organization, Organization, Organization) {
        let store = Arc::new(MemoryOrganizationStore::new());
        let root = Organization::root("Super", "super");
        let a = Organization::child_of(&root, "A", "a");
        let a1 = Organization::child_of(&a, "A1", "a1");
        for org in [&root, &a, &a1] {
            store.insert(org.clone()).await.unwrap();
        }
        let tree = Arc::new(OrganizationTree::new(store, HierarchyConfig::default()));
        (AncestorResolver::new(tree), root, a, a1)
    }

    #[tokio::test]
    async fn test_nearest_definition_shadows_root() {
        let (resolver, root, a, a1) = tree().await;
        let values: HashMap<Uuid, &str> = HashMap::from([(root.id, "root"), (a.id, "parent")]);

        let hit = resolver
            .resolve_ancestor_resource(a1.id, &FnProbe::new(|org: Uuid| values.get(&org).copied()))
            .await
            .unwrap();

        assert_eq!(hit.organization_id, a.id);
        assert_eq!(hit.hops, 1);
        assert_eq!(hit.resource, "parent");
    }

    #[tokio::test]
    async fn test_own_definition_wins() {
        let (resolver, _root, _a, a1) = tree().await;
        let a1_id = a1.id;

        let hit = resolver
            .resolve_ancestor_resource(a1.id, &FnProbe::new(move |org| Some(org == a1_id)))
            .await
            .unwrap();

        assert_eq!(hit.organization_id, a1.id);
        assert_eq!(hit.hops, 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_not_found_in_hierarchy() {
        let (resolver, _root, _a, a1) = tree().await;

        let err = resolver
            .resolve_ancestor_resource(a1.id, &FnProbe::new(|_: Uuid| None::<u8>))
            .await
            .unwrap_err();

        assert!(matches!(err, OrgError::NotFoundInHierarchy { organization_id } if organization_id == a1.id));
    }

    #[tokio::test]
    async fn test_unknown_organization_is_not_found() {
        let (resolver, ..) = tree().await;

        let err = resolver
            .resolve_ancestor_resource(Uuid::now_v7(), &FnProbe::new(|_: Uuid| Some(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, OrgError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_application_probe_is_scoped_by_application() {
        let (resolver, root, a, a1) = tree().await;
        let root_id = root.id;
        let a_id = a.id;
        let probe = FnApplicationProbe::new(move |org: Uuid, app: &str| match (app, org) {
            ("console", o) if o == a_id => Some("console@a"),
            ("console", o) if o == root_id => Some("console@root"),
            ("portal", o) if o == root_id => Some("portal@root"),
            _ => None,
        });

        let console = resolver
            .resolve_ancestor_application(a1.id, "console", &probe)
            .await
            .unwrap();
        assert_eq!(console.resource, "console@a");

        let portal = resolver
            .resolve_ancestor_application(a1.id, "portal", &probe)
            .await
            .unwrap();
        assert_eq!(portal.organization_id, root.id);
        assert_eq!(portal.hops, 2);

        assert!(matches!(
            resolver.resolve_ancestor_application(a1.id, "billing", &probe).await,
            Err(OrgError::NotFoundInHierarchy { .. })
        ));
    }

    struct FailingProbe;

    #[async_trait]
    impl AncestorProbe<String> for FailingProbe {
        async fn probe(&self, organization_id: Uuid) -> OrgResult<Option<String>> {
            Err(OrgError::store("probe", organization_id, "resource store offline"))
        }
    }

    #[tokio::test]
    async fn test_probe_errors_propagate() {
        let (resolver, _root, _a, a1) = tree().await;

        let err = resolver
            .resolve_ancestor_resource(a1.id, &FailingProbe)
            .await
            .unwrap_err();

        assert!(matches!(err, OrgError::Store { operation: "probe", .. }));
    }

    #[tokio::test]
    async fn test_resolve_all_ancestors_nearest_first() {
        let (resolver, root, a, a1) = tree().await;
        let defined = [root.id, a1.id];

        let hits = resolver
            .resolve_all_ancestors(a1.id, &FnProbe::new(|org: Uuid| defined.contains(&org).then_some(org)))
            .await
            .unwrap();

        let orgs: Vec<Uuid> = hits.iter().map(|h| h.organization_id).collect();
        assert_eq!(orgs, vec![a1.id, root.id]);
        assert!(!orgs.contains(&a.id));
    }
}
