//! # Organization Hierarchy Core
//!
//! This crate provides the organization tree shared by every hierarchy
//! component: sharing policies, shared users, discovery and authorization.
//!
//! ## Overview
//!
//! The org-core crate handles:
//! - **Organizations**: Nodes of a rooted multi-tenant tree
//! - **Tree Index**: Parent, depth, children and ancestor-chain queries
//! - **Ancestor Resolution**: Nearest-ancestor-first lookups through caller probes
//! - **Caching**: Read-through caches with synchronous invalidation
//! - **Errors, Configuration, Retries**: Shared by the other hierarchy crates
//!
//! ## Architecture
//!
//! ```text
//! AncestorResolver ──probe──→ resource store (external)
//!   └─ OrganizationTree
//!        ├─ ReadThroughCache (chains, children)
//!        └─ OrganizationStore (external)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use org_core::{AncestorResolver, FnProbe, HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
//!
//! async fn example() -> org_core::OrgResult<()> {
//!     let store = Arc::new(MemoryOrganizationStore::new());
//!     let root = Organization::root("Super", "super");
//!     let child = Organization::child_of(&root, "Acme", "acme");
//!     store.insert(root.clone()).await?;
//!     store.insert(child.clone()).await?;
//!
//!     let tree = Arc::new(OrganizationTree::new(store, HierarchyConfig::from_env()));
//!     let resolver = AncestorResolver::new(tree);
//!
//!     // Branding is only defined at the root; the child inherits it.
//!     let root_id = root.id;
//!     let hit = resolver
//!         .resolve_ancestor_resource(child.id, &FnProbe::new(move |org| (org == root_id).then_some("blue")))
//!         .await?;
//!     assert_eq!(hit.organization_id, root.id);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod organization;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use cache::{CacheStats, ReadThroughCache};
pub use config::{CacheConfig, ConfigError, HierarchyConfig};
pub use error::{OrgError, OrgResult};
pub use organization::{Organization, OrganizationStatus};
pub use resolver::{
    AncestorHit, AncestorProbe, AncestorResolver, ApplicationProbe, FnApplicationProbe, FnProbe,
};
pub use retry::{with_retry, RetryConfig};
pub use store::{MemoryOrganizationStore, OrganizationStore};
pub use tree::{AncestorChain, OrganizationTree, TreeCacheStats};
