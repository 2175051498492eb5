//! # Organization Authorization
//!
//! This crate answers whether a user holds a permission within an
//! organization.
//!
//! ## Overview
//!
//! The org-authz crate handles:
//! - **Permission Paths**: Hierarchical paths such as `/permission/admin/manage`
//! - **Permission Sets**: The paths a user holds in one organization
//! - **Resolution**: Matching assignments against prefix reductions
//!
//! ## Permission Model
//!
//! A path implies every path nested under it. Checking
//! `/permission/admin/manage/users` succeeds when the user holds any of:
//!
//! ```text
//! /permission/admin/manage/users
//! /permission/admin/manage
//! /permission/admin
//! /permission
//! ```
//!
//! Segments are compared whole, so `/permission/admin` never grants
//! `/permission/administrator`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use org_authz::{AuthorizationResolver, MemoryPermissionStore, PermissionPath};
//! use uuid::Uuid;
//!
//! async fn example() -> org_core::OrgResult<()> {
//!     let store = Arc::new(MemoryPermissionStore::new());
//!     let (user, org) = (Uuid::now_v7(), Uuid::now_v7());
//!     store.grant(user, org, "/permission/admin".parse()?).await;
//!
//!     let resolver = AuthorizationResolver::new(store);
//!     assert!(resolver.is_authorized_str(user, "/permission/admin/manage", org).await?);
//!     Ok(())
//! }
//! ```

pub mod path;
pub mod permissions;
pub mod resolver;
pub mod store;

// Re-export main types
pub use path::{PermissionPath, SEPARATOR};
pub use permissions::PermissionSet;
pub use resolver::AuthorizationResolver;
pub use store::{MemoryPermissionStore, PermissionStore};
