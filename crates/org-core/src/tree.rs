//! Organization tree index
//!
//! [`OrganizationTree`] answers parent, depth, ancestor-chain and children
//! queries on top of an [`OrganizationStore`]. Every other component walks
//! the hierarchy through [`OrganizationTree::get_ancestor_chain`].
//!
//! Chains and child lists are served from read-through caches. Structural
//! writes must be reported through [`OrganizationTree::organization_created`]
//! and [`OrganizationTree::organization_deleted`]; both invalidate the
//! affected entries before returning.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cache::{CacheStats, ReadThroughCache};
use crate::config::HierarchyConfig;
use crate::error::{OrgError, OrgResult};
use crate::organization::Organization;
use crate::retry::{with_retry, RetryConfig};
use crate::store::OrganizationStore;

/// Ordered path from an organization to its root, both inclusive.
///
/// Element 0 is the organization itself; the last element is the root.
pub type AncestorChain = Arc<[Uuid]>;

/// Cache statistics for the tree index.
#[derive(Debug, Clone, Default)]
pub struct TreeCacheStats {
    /// Ancestor chain cache
    pub chains: CacheStats,
    /// Child list cache
    pub children: CacheStats,
}

/// Queryable index over the organization hierarchy.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
///
/// # async fn example() -> org_core::OrgResult<()> {
/// let store = Arc::new(MemoryOrganizationStore::new());
/// let root = Organization::root("Super", "super");
/// let a = Organization::child_of(&root, "A", "a");
/// store.insert(root.clone()).await?;
/// store.insert(a.clone()).await?;
///
/// let tree = OrganizationTree::new(store, HierarchyConfig::default());
/// let chain = tree.get_ancestor_chain(a.id).await?;
/// assert_eq!(&chain[..], &[a.id, root.id]);
/// assert_eq!(tree.get_depth(a.id).await?, 1);
/// # Ok(())
/// # }
/// ```
pub struct OrganizationTree {
    store: Arc<dyn OrganizationStore>,
    config: HierarchyConfig,
    retry: RetryConfig,
    chains: ReadThroughCache<Uuid, AncestorChain>,
    children: ReadThroughCache<Uuid, Arc<[Uuid]>>,
}

impl std::fmt::Debug for OrganizationTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationTree")
            .field("config", &self.config)
            .finish()
    }
}

impl OrganizationTree {
    /// Create a tree index over `store`.
    pub fn new(store: Arc<dyn OrganizationStore>, config: HierarchyConfig) -> Self {
        Self {
            retry: config.retry_config(),
            chains: ReadThroughCache::new(&config.cache),
            children: ReadThroughCache::new(&config.cache),
            store,
            config,
        }
    }

    /// Configuration the tree was built with.
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// The deployment's designated primary organization.
    pub fn primary_organization_id(&self) -> Option<Uuid> {
        self.config.primary_organization_id
    }

    async fn load(&self, id: Uuid) -> OrgResult<Option<Organization>> {
        with_retry(&self.retry, "get_organization", || self.store.get_organization(id)).await
    }

    /// Fetch an organization record.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown.
    pub async fn get_organization(&self, id: Uuid) -> OrgResult<Organization> {
        self.load(id)
            .await?
            .ok_or_else(|| OrgError::not_found("organization", id))
    }

    /// Fetch an organization record by handle.
    pub async fn get_organization_by_handle(&self, handle: &str) -> OrgResult<Organization> {
        with_retry(&self.retry, "get_organization_by_handle", || {
            self.store.get_organization_by_handle(handle)
        })
        .await?
        .ok_or_else(|| OrgError::not_found("organization", handle))
    }

    /// Parent of `id`, `None` for a root.
    pub async fn get_parent(&self, id: Uuid) -> OrgResult<Option<Uuid>> {
        Ok(self.get_ancestor_chain(id).await?.get(1).copied())
    }

    /// Depth of `id` (root = 0), derived from its ancestor chain.
    pub async fn get_depth(&self, id: Uuid) -> OrgResult<usize> {
        Ok(self.get_ancestor_chain(id).await?.len() - 1)
    }

    /// Path from `id` up to its root, both inclusive, closest first.
    ///
    /// A root's chain is exactly itself.
    ///
    /// # Errors
    ///
    /// * `NotFound` - `id` is unknown
    /// * `Store` - the store failed, a parent reference dangles, or the walk
    ///   revisits an organization or exceeds the configured maximum depth
    #[instrument(level = "debug", skip(self))]
    pub async fn get_ancestor_chain(&self, id: Uuid) -> OrgResult<AncestorChain> {
        if let Some(chain) = self.chains.get(&id).await {
            return Ok(chain);
        }

        let generation = self.chains.generation().await;
        let mut path: Vec<Uuid> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut tail: Option<AncestorChain> = None;
        let mut cursor = Some(id);

        while let Some(current) = cursor {
            if current != id {
                if let Some(cached) = self.chains.get(&current).await {
                    tail = Some(cached);
                    break;
                }
            }
            if !seen.insert(current) {
                return Err(OrgError::store(
                    "get_ancestor_chain",
                    id,
                    format!("organization {} appears twice on the ancestor chain", current),
                ));
            }
            if path.len() > self.config.max_depth {
                return Err(OrgError::store(
                    "get_ancestor_chain",
                    id,
                    format!("hierarchy deeper than the maximum of {}", self.config.max_depth),
                ));
            }

            let organization = match self.load(current).await? {
                Some(organization) => organization,
                None if current == id => return Err(OrgError::not_found("organization", id)),
                None => {
                    return Err(OrgError::store(
                        "get_ancestor_chain",
                        id,
                        format!("parent organization {} is missing", current),
                    ))
                }
            };
            path.push(current);
            cursor = organization.parent_id;
        }

        let walked = path.len();
        let mut full = path;
        if let Some(tail) = tail {
            if tail.iter().any(|ancestor| seen.contains(ancestor)) {
                return Err(OrgError::store(
                    "get_ancestor_chain",
                    id,
                    "cached ancestor chain loops back into the walked path",
                ));
            }
            full.extend(tail.iter().copied());
        }
        if full.len() > self.config.max_depth + 1 {
            return Err(OrgError::store(
                "get_ancestor_chain",
                id,
                format!("hierarchy deeper than the maximum of {}", self.config.max_depth),
            ));
        }

        let chain: AncestorChain = full.into();
        for offset in 0..walked {
            let stored = self
                .chains
                .insert_if_current(chain[offset], chain[offset..].to_vec().into(), generation)
                .await;
            if !stored {
                debug!(organization_id = %id, "Hierarchy changed during the walk, chain not cached");
                break;
            }
        }
        Ok(chain)
    }

    /// Direct children of `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` is unknown.
    pub async fn get_children(&self, id: Uuid) -> OrgResult<Vec<Uuid>> {
        if let Some(children) = self.children.get(&id).await {
            return Ok(children.to_vec());
        }

        let generation = self.children.generation().await;
        if self.load(id).await?.is_none() {
            return Err(OrgError::not_found("organization", id));
        }
        let children = with_retry(&self.retry, "list_child_ids", || self.store.list_child_ids(id)).await?;

        self.children
            .insert_if_current(id, children.clone().into(), generation)
            .await;
        Ok(children)
    }

    /// Check whether `ancestor` is a strict ancestor of `descendant`.
    pub async fn is_ancestor(&self, ancestor: Uuid, descendant: Uuid) -> OrgResult<bool> {
        Ok(self.relative_depth(ancestor, descendant).await?.is_some_and(|d| d > 0))
    }

    /// Number of levels between `descendant` and `ancestor`.
    ///
    /// `Some(0)` when both are the same organization, `None` when `ancestor`
    /// is not on `descendant`'s chain.
    pub async fn relative_depth(&self, ancestor: Uuid, descendant: Uuid) -> OrgResult<Option<usize>> {
        let chain = self.get_ancestor_chain(descendant).await?;
        Ok(chain.iter().position(|id| *id == ancestor))
    }

    /// Every organization below `id`, breadth-first, excluding `id` itself.
    pub async fn get_descendants(&self, id: Uuid) -> OrgResult<Vec<Uuid>> {
        let mut result = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::from([id]);
        let mut queue: VecDeque<(Uuid, usize)> = VecDeque::from([(id, 0)]);

        while let Some((current, level)) = queue.pop_front() {
            if level >= self.config.max_depth {
                continue;
            }
            for child in self.get_children(current).await? {
                if seen.insert(child) {
                    result.push(child);
                    queue.push_back((child, level + 1));
                }
            }
        }
        Ok(result)
    }

    /// Root of the tree `id` belongs to.
    pub async fn root_of(&self, id: Uuid) -> OrgResult<Uuid> {
        let chain = self.get_ancestor_chain(id).await?;
        chain
            .last()
            .copied()
            .ok_or_else(|| OrgError::store("root_of", id, "empty ancestor chain"))
    }

    /// Check whether `id` is the root of its tree.
    pub async fn is_root(&self, id: Uuid) -> OrgResult<bool> {
        Ok(self.get_parent(id).await?.is_none())
    }

    /// Check whether `id` is the configured primary organization.
    ///
    /// Always false when no primary organization is configured.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` is unknown.
    pub async fn is_primary_organization(&self, id: Uuid) -> OrgResult<bool> {
        self.get_ancestor_chain(id).await?;
        Ok(self.config.primary_organization_id == Some(id))
    }

    /// Report that `organization` was created.
    ///
    /// Invalidates the parent's child list.
    pub async fn organization_created(&self, organization: &Organization) {
        if let Some(parent_id) = organization.parent_id {
            self.children.invalidate(&parent_id).await;
        }
        self.chains.invalidate(&organization.id).await;
        debug!(organization_id = %organization.id, "Invalidated hierarchy cache after organization creation");
    }

    /// Report that organization `id` was deleted.
    ///
    /// Invalidates every cached chain passing through `id` and every child
    /// list mentioning it.
    pub async fn organization_deleted(&self, id: Uuid) {
        self.chains.invalidate_where(|_, chain| chain.contains(&id)).await;
        self.children
            .invalidate_where(|parent, children| *parent == id || children.contains(&id))
            .await;
        debug!(organization_id = %id, "Invalidated hierarchy cache after organization deletion");
    }

    /// Drop every cached entry.
    pub async fn invalidate_all(&self) {
        self.chains.clear().await;
        self.children.clear().await;
    }

    /// Current cache statistics.
    pub async fn cache_stats(&self) -> TreeCacheStats {
        TreeCacheStats {
            chains: self.chains.stats().await,
            children: self.children.stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrganizationStore;
    use async_trait::async_trait;

    struct Fixture {
        store: Arc<MemoryOrganizationStore>,
        tree: OrganizationTree,
        root: Organization,
        a: Organization,
        a1: Organization,
        b: Organization,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryOrganizationStore::new());
        let root = Organization::root("Super", "super");
        let a = Organization::child_of(&root, "A", "a");
        let a1 = Organization::child_of(&a, "A1", "a1");
        let b = Organization::child_of(&root, "B", "b");
        for org in [&root, &a, &a1, &b] {
            store.insert(org.clone()).await.unwrap();
        }
        let tree = OrganizationTree::new(store.clone(), HierarchyConfig::default());
        Fixture {
            store,
            tree,
            root,
            a,
            a1,
            b,
        }
    }

    #[tokio::test]
    async fn test_ancestor_chain_ends_at_root() {
        let f = fixture().await;

        for org in [&f.root, &f.a, &f.a1, &f.b] {
            let chain = f.tree.get_ancestor_chain(org.id).await.unwrap();
            assert_eq!(chain[0], org.id);
            assert_eq!(*chain.last().unwrap(), f.root.id);
            assert_eq!(chain.len(), f.tree.get_depth(org.id).await.unwrap() + 1);
        }

        let root_chain = f.tree.get_ancestor_chain(f.root.id).await.unwrap();
        assert_eq!(&root_chain[..], &[f.root.id]);
    }

    #[tokio::test]
    async fn test_parent_and_children() {
        let f = fixture().await;

        assert_eq!(f.tree.get_parent(f.a1.id).await.unwrap(), Some(f.a.id));
        assert_eq!(f.tree.get_parent(f.root.id).await.unwrap(), None);

        let mut children = f.tree.get_children(f.root.id).await.unwrap();
        children.sort();
        let mut expected = vec![f.a.id, f.b.id];
        expected.sort();
        assert_eq!(children, expected);
        assert!(f.tree.get_children(f.a1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_organization_is_not_found() {
        let f = fixture().await;
        let unknown = Uuid::now_v7();

        assert!(matches!(
            f.tree.get_ancestor_chain(unknown).await,
            Err(OrgError::NotFound { .. })
        ));
        assert!(matches!(
            f.tree.get_children(unknown).await,
            Err(OrgError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ancestry_queries() {
        let f = fixture().await;

        assert!(f.tree.is_ancestor(f.root.id, f.a1.id).await.unwrap());
        assert!(f.tree.is_ancestor(f.a.id, f.a1.id).await.unwrap());
        assert!(!f.tree.is_ancestor(f.a1.id, f.a1.id).await.unwrap());
        assert!(!f.tree.is_ancestor(f.b.id, f.a1.id).await.unwrap());

        assert_eq!(f.tree.relative_depth(f.root.id, f.a1.id).await.unwrap(), Some(2));
        assert_eq!(f.tree.relative_depth(f.b.id, f.a1.id).await.unwrap(), None);
        assert_eq!(f.tree.root_of(f.a1.id).await.unwrap(), f.root.id);
        assert!(f.tree.is_root(f.root.id).await.unwrap());
        assert!(!f.tree.is_root(f.a.id).await.unwrap());
        // No primary organization is configured in this fixture.
        assert!(!f.tree.is_primary_organization(f.root.id).await.unwrap());
        assert!(f.tree.is_primary_organization(Uuid::now_v7()).await.unwrap_err().is_not_found());

        let descendants = f.tree.get_descendants(f.root.id).await.unwrap();
        assert_eq!(descendants.len(), 3);
        assert!(descendants.contains(&f.a1.id));
        assert_eq!(f.tree.get_descendants(f.a.id).await.unwrap(), vec![f.a1.id]);
    }

    #[tokio::test]
    async fn test_chain_walk_populates_ancestor_entries() {
        let f = fixture().await;

        f.tree.get_ancestor_chain(f.a1.id).await.unwrap();
        let before = f.tree.cache_stats().await.chains;
        assert_eq!(before.entries, 3);

        let chain = f.tree.get_ancestor_chain(f.a.id).await.unwrap();
        assert_eq!(&chain[..], &[f.a.id, f.root.id]);
        assert_eq!(f.tree.cache_stats().await.chains.hits, before.hits + 1);
    }

    #[tokio::test]
    async fn test_structural_writes_invalidate_cache() {
        let f = fixture().await;

        f.tree.get_ancestor_chain(f.a1.id).await.unwrap();
        assert_eq!(f.tree.get_children(f.a.id).await.unwrap(), vec![f.a1.id]);

        let a2 = Organization::child_of(&f.a, "A2", "a2");
        f.store.insert(a2.clone()).await.unwrap();
        f.tree.organization_created(&a2).await;
        assert_eq!(f.tree.get_children(f.a.id).await.unwrap().len(), 2);

        f.store.remove(f.a1.id).await.unwrap();
        f.tree.organization_deleted(f.a1.id).await;
        assert!(matches!(
            f.tree.get_ancestor_chain(f.a1.id).await,
            Err(OrgError::NotFound { .. })
        ));
        assert_eq!(f.tree.get_children(f.a.id).await.unwrap(), vec![a2.id]);
    }

    /// Organization store whose child listing can be held open until a
    /// concurrent write has gone through.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryOrganizationStore,
        armed: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl OrganizationStore for GatedStore {
        async fn get_organization(&self, id: Uuid) -> OrgResult<Option<Organization>> {
            self.inner.get_organization(id).await
        }

        async fn get_organization_by_handle(&self, handle: &str) -> OrgResult<Option<Organization>> {
            self.inner.get_organization_by_handle(handle).await
        }

        async fn list_child_ids(&self, id: Uuid) -> OrgResult<Vec<Uuid>> {
            let children = self.inner.list_child_ids(id).await;
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            children
        }
    }

    #[tokio::test]
    async fn test_fill_racing_with_creation_is_not_cached() {
        let store = Arc::new(GatedStore::default());
        let root = Organization::root("Super", "super");
        let a = Organization::child_of(&root, "A", "a");
        let a1 = Organization::child_of(&a, "A1", "a1");
        for org in [&root, &a, &a1] {
            store.inner.insert(org.clone()).await.unwrap();
        }
        let tree = Arc::new(OrganizationTree::new(store.clone(), HierarchyConfig::default()));

        store.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        let reader = {
            let tree = tree.clone();
            let a_id = a.id;
            tokio::spawn(async move { tree.get_children(a_id).await })
        };

        // The reader holds the pre-creation child list when A2 is created.
        store.entered.notified().await;
        let a2 = Organization::child_of(&a, "A2", "a2");
        store.inner.insert(a2.clone()).await.unwrap();
        tree.organization_created(&a2).await;
        store.release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), vec![a1.id]);
        assert_eq!(tree.cache_stats().await.children.stale_fills, 1);

        let mut children = tree.get_children(a.id).await.unwrap();
        children.sort();
        let mut expected = vec![a1.id, a2.id];
        expected.sort();
        assert_eq!(children, expected);
    }

    struct CyclicStore {
        first: Organization,
        second: Organization,
    }

    #[async_trait]
    impl OrganizationStore for CyclicStore {
        async fn get_organization(&self, id: Uuid) -> OrgResult<Option<Organization>> {
            Ok([&self.first, &self.second]
                .into_iter()
                .find(|o| o.id == id)
                .cloned())
        }

        async fn get_organization_by_handle(&self, _handle: &str) -> OrgResult<Option<Organization>> {
            Ok(None)
        }

        async fn list_child_ids(&self, _id: Uuid) -> OrgResult<Vec<Uuid>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cycle_is_reported_as_store_error() {
        let mut first = Organization::root("X", "x");
        let mut second = Organization::root("Y", "y");
        first.parent_id = Some(second.id);
        second.parent_id = Some(first.id);

        let tree = OrganizationTree::new(
            Arc::new(CyclicStore {
                first: first.clone(),
                second,
            }),
            HierarchyConfig::default(),
        );

        let err = tree.get_ancestor_chain(first.id).await.unwrap_err();
        assert!(matches!(err, OrgError::Store { operation: "get_ancestor_chain", .. }));
    }

    #[tokio::test]
    async fn test_max_depth_bounds_the_walk() {
        let store = Arc::new(MemoryOrganizationStore::new());
        let mut parent = Organization::root("L0", "l0");
        store.insert(parent.clone()).await.unwrap();
        for level in 1..=4 {
            let child = Organization::child_of(&parent, format!("L{level}"), format!("l{level}"));
            store.insert(child.clone()).await.unwrap();
            parent = child;
        }

        let config = HierarchyConfig {
            max_depth: 3,
            ..HierarchyConfig::default()
        };
        let tree = OrganizationTree::new(store, config);
        assert!(matches!(
            tree.get_ancestor_chain(parent.id).await,
            Err(OrgError::Store { .. })
        ));
    }
}
