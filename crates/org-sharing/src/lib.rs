//! # Organization Resource Sharing
//!
//! This crate decides which descendant organizations may see a resource
//! owned higher up the hierarchy, and tracks the shared-user identities a
//! real user receives as their access propagates down the tree.
//!
//! ## Overview
//!
//! The org-sharing crate handles:
//! - **Sharing Policies**: `ALL`, `IMMEDIATE_CHILDREN` and `SELECTED` rules per resource
//! - **Shared Attributes**: Roles and other attributes that accompany a share
//! - **User Associations**: Real user to per-organization shared user mapping
//!
//! ## Policy Types
//!
//! | Policy | Shared with |
//! |--------|-------------|
//! | `All` | Every strict descendant of the owner |
//! | `ImmediateChildren` | Direct children of the owner |
//! | `Selected` | Exactly the listed organizations |
//!
//! The owner is never a target of its own policy.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
//! use org_sharing::{AssociationManager, MemoryAssociationStore};
//!
//! async fn example() -> org_core::OrgResult<()> {
//!     let orgs = Arc::new(MemoryOrganizationStore::new());
//!     let root = Organization::root("Super", "super");
//!     let child = Organization::child_of(&root, "Acme", "acme");
//!     orgs.insert(root.clone()).await?;
//!     orgs.insert(child.clone()).await?;
//!
//!     let tree = Arc::new(OrganizationTree::new(orgs, HierarchyConfig::default()));
//!     let associations = AssociationManager::new(tree, Arc::new(MemoryAssociationStore::new()));
//!
//!     let real_user = uuid::Uuid::now_v7();
//!     let shared_user = associations.associate(real_user, root.id, child.id).await?;
//!     assert_eq!(associations.associate(real_user, root.id, child.id).await?, shared_user);
//!     Ok(())
//! }
//! ```

pub mod association;
pub mod association_manager;
pub mod association_store;
pub mod engine;
pub mod policy;
pub mod policy_store;

// Re-export main types
pub use association::{AssociationKey, OrganizationUserAssociation};
pub use association_manager::AssociationManager;
pub use association_store::{AssociationStore, MemoryAssociationStore};
pub use engine::SharingPolicyEngine;
pub use policy::{
    AttributeType, PolicyKey, PolicyType, ResourceSharingPolicy, ResourceType, SharedResourceAttribute,
};
pub use policy_store::{MemorySharingPolicyStore, SharingPolicyStore};
