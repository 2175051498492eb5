//! # Organization Discovery
//!
//! This crate identifies an organization from partial user input during
//! sign-up and sign-in, such as the domain of an email address, and holds
//! the discovery configuration of root organizations.
//!
//! ## Overview
//!
//! The org-discovery crate handles:
//! - **Discovery Configuration**: `email-domain-enable`,
//!   `email-domain-based-self-signup-enable` and `default-param` per root
//! - **Discovery Attributes**: Email domains attached to organizations
//! - **Lookup**: Cached `(type, value)` to organization resolution
//!
//! ## Default Parameter
//!
//! | Configuration of the primary organization | Result |
//! |-------------------------------------------|--------|
//! | `default-param = orgHandle` | `orgHandle` |
//! | `default-param = orgName` | `orgName` |
//! | absent, or no `default-param` | `org` |
//! | store failure | error, after retries |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use org_core::{HierarchyConfig, MemoryOrganizationStore, Organization, OrganizationTree};
//! use org_discovery::{DiscoveryAttribute, DiscoveryResolver, MemoryDiscoveryStore};
//!
//! async fn example() -> org_core::OrgResult<()> {
//!     let orgs = Arc::new(MemoryOrganizationStore::new());
//!     let root = Organization::root("Super", "super");
//!     let acme = Organization::child_of(&root, "Acme", "acme");
//!     orgs.insert(root.clone()).await?;
//!     orgs.insert(acme.clone()).await?;
//!
//!     let tree = Arc::new(OrganizationTree::new(orgs, HierarchyConfig::default()));
//!     let discovery = DiscoveryResolver::new(tree, Arc::new(MemoryDiscoveryStore::new()));
//!
//!     discovery
//!         .set_discovery_attributes(acme.id, vec![DiscoveryAttribute::email_domains(["acme.com"])])
//!         .await?;
//!     let found = discovery.find_organizations_by_attribute("emailDomain", "acme.com").await?;
//!     assert!(found.contains(&acme.id));
//!     Ok(())
//! }
//! ```

pub mod attribute;
pub mod properties;
pub mod resolver;
pub mod store;

// Re-export main types
pub use attribute::{email_domain, is_valid_domain, AttributeKey, DiscoveryAttribute, EMAIL_DOMAIN};
pub use properties::{
    DiscoveryConfig, DiscoveryParam, DEFAULT_PARAM, EMAIL_DOMAIN_ENABLE, EMAIL_DOMAIN_SELF_SIGNUP_ENABLE,
    SUPPORTED_KEYS,
};
pub use resolver::DiscoveryResolver;
pub use store::{DiscoveryStore, MemoryDiscoveryStore};
