//! Organization domain models
//!
//! This module provides the Organization entity. Organizations form a rooted
//! tree: every organization except a root has exactly one parent, and its
//! depth is one more than its parent's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An organization is a node in the multi-tenant hierarchy.
///
/// Tenants are organizations. A root organization (no parent) is the primary
/// organization of its tree; every other organization hangs below one.
///
/// # Architecture
///
/// ```text
/// Primary organization (depth 0)
///   ├─ Sub-organization (depth 1)
///   │    └─ Sub-organization (depth 2)
///   └─ Sub-organization (depth 1)
/// ```
///
/// # Examples
///
/// ```
/// use org_core::Organization;
///
/// let root = Organization::root("Super", "super");
/// let child = Organization::child_of(&root, "Acme", "acme");
/// assert_eq!(child.parent_id, Some(root.id));
/// assert_eq!(child.depth, 1);
/// assert!(root.is_root());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier for the organization
    pub id: Uuid,

    /// Human-readable name
    pub name: String,

    /// URL-safe handle (unique across the deployment)
    pub handle: String,

    /// Parent organization, `None` for a root
    pub parent_id: Option<Uuid>,

    /// Distance from the root (root = 0)
    pub depth: usize,

    /// Lifecycle status
    pub status: OrganizationStatus,

    /// When the organization was created
    pub created_at: DateTime<Utc>,

    /// When the organization was last updated
    pub updated_at: DateTime<Utc>,

    /// Custom metadata for extensibility
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Organization {
    /// Creates a new root organization.
    ///
    /// # Arguments
    ///
    /// * `name` - The organization name
    /// * `handle` - URL-safe handle (must be unique)
    pub fn root(name: impl Into<String>, handle: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            handle: handle.into(),
            parent_id: None,
            depth: 0,
            status: OrganizationStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Creates a new organization directly below `parent`.
    ///
    /// # Arguments
    ///
    /// * `parent` - The parent organization
    /// * `name` - The organization name
    /// * `handle` - URL-safe handle (must be unique)
    pub fn child_of(parent: &Organization, name: impl Into<String>, handle: impl Into<String>) -> Self {
        let mut org = Self::root(name, handle);
        org.parent_id = Some(parent.id);
        org.depth = parent.depth + 1;
        org
    }

    /// Set the lifecycle status.
    pub fn with_status(mut self, status: OrganizationStatus) -> Self {
        self.status = status;
        self
    }

    /// Check if this is a root (primary) organization.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if the organization is active.
    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Active
    }

    /// Check whether `handle` is a valid URL-safe handle.
    ///
    /// Handles are non-empty and consist of ASCII letters, digits, `-` and `_`.
    ///
    /// # Examples
    ///
    /// ```
    /// use org_core::Organization;
    ///
    /// assert!(Organization::is_valid_handle("acme-corp"));
    /// assert!(!Organization::is_valid_handle("acme corp"));
    /// assert!(!Organization::is_valid_handle(""));
    /// ```
    pub fn is_valid_handle(handle: &str) -> bool {
        !handle.is_empty()
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

/// Organization lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    /// The organization is in use
    #[default]
    Active,
    /// The organization has been disabled
    Disabled,
}

impl OrganizationStatus {
    /// Get the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Disabled => "disabled",
        }
    }

    /// Parse status from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(OrganizationStatus::Active),
            "disabled" => Some(OrganizationStatus::Disabled),
            _ => None,
        }
    }
}
