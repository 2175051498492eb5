//! Resource sharing policy models
//!
//! A sharing policy is attached to a resource at the organization that owns
//! it and decides which descendant organizations may see the resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Kind of resource a policy is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Application registered in an organization
    Application,
    /// Role definition
    Role,
    /// Identity provider
    Idp,
    /// User identity
    User,
    /// Any other resource kind, tagged by name
    Custom(String),
}

impl ResourceType {
    /// Get the string representation of the resource type.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Application => "application",
            ResourceType::Role => "role",
            ResourceType::Idp => "idp",
            ResourceType::User => "user",
            ResourceType::Custom(name) => name,
        }
    }

    /// Parse a resource type; unknown names become [`ResourceType::Custom`].
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "application" => ResourceType::Application,
            "role" => ResourceType::Role,
            "idp" => ResourceType::Idp,
            "user" => ResourceType::User,
            _ => ResourceType::Custom(s.to_string()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which descendants a resource is shared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Every strict descendant of the owner, at any depth
    All,
    /// Only the owner's direct children
    ImmediateChildren,
    /// Exactly the listed organizations, without their descendants
    Selected,
}

impl PolicyType {
    /// Get the string representation of the policy type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::All => "all",
            PolicyType::ImmediateChildren => "immediate_children",
            PolicyType::Selected => "selected",
        }
    }

    /// Parse policy type from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(PolicyType::All),
            "immediate_children" => Some(PolicyType::ImmediateChildren),
            "selected" => Some(PolicyType::Selected),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of attribute that accompanies a share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A role granted to the shared resource in the target organization
    Role,
    /// Any other attribute kind, tagged by name
    Custom(String),
}

impl AttributeType {
    /// Get the string representation of the attribute type.
    pub fn as_str(&self) -> &str {
        match self {
            AttributeType::Role => "role",
            AttributeType::Custom(name) => name,
        }
    }
}

/// An attribute carried along with a share, e.g. a role id.
///
/// Attributes only exist as part of their policy: they are written and
/// removed together with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedResourceAttribute {
    /// Policy the attribute belongs to
    pub policy_id: Uuid,

    /// Attribute identifier (e.g. a role id)
    pub attribute_id: String,

    /// Attribute kind
    pub attribute_type: AttributeType,
}

/// Identity of a shared resource.
///
/// At most one policy exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyKey {
    /// Resource kind
    pub resource_type: ResourceType,
    /// Resource identifier within its kind
    pub resource_id: String,
}

impl PolicyKey {
    /// Create a new policy key.
    pub fn new(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

/// Sharing policy attached to a resource at its owning organization.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use org_sharing::{AttributeType, PolicyType, ResourceSharingPolicy, ResourceType};
///
/// let owner = Uuid::now_v7();
/// let policy = ResourceSharingPolicy::new(owner, ResourceType::Application, "console", PolicyType::All)
///     .with_attribute(AttributeType::Role, "viewer");
///
/// assert_eq!(policy.attributes.len(), 1);
/// assert_eq!(policy.attributes[0].policy_id, policy.id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSharingPolicy {
    /// Unique policy ID
    pub id: Uuid,

    /// Organization that owns the resource
    pub owner_organization_id: Uuid,

    /// Resource kind
    pub resource_type: ResourceType,

    /// Resource identifier
    pub resource_id: String,

    /// Sharing rule
    pub policy_type: PolicyType,

    /// Explicit targets, only populated for [`PolicyType::Selected`]
    #[serde(default)]
    pub targets: BTreeSet<Uuid>,

    /// Attributes accompanying the share
    #[serde(default)]
    pub attributes: Vec<SharedResourceAttribute>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceSharingPolicy {
    /// Creates a new policy without targets or attributes.
    ///
    /// # Arguments
    ///
    /// * `owner_organization_id` - Organization that owns the resource
    /// * `resource_type` - Resource kind
    /// * `resource_id` - Resource identifier
    /// * `policy_type` - Sharing rule
    pub fn new(
        owner_organization_id: Uuid,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
        policy_type: PolicyType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_organization_id,
            resource_type,
            resource_id: resource_id.into(),
            policy_type,
            targets: BTreeSet::new(),
            attributes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add explicit target organizations.
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = Uuid>) -> Self {
        self.targets.extend(targets);
        self
    }

    /// Add an attribute that accompanies the share.
    ///
    /// Adding the same attribute twice keeps a single copy.
    pub fn with_attribute(mut self, attribute_type: AttributeType, attribute_id: impl Into<String>) -> Self {
        let attribute = SharedResourceAttribute {
            policy_id: self.id,
            attribute_id: attribute_id.into(),
            attribute_type,
        };
        if !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
        self
    }

    /// The key identifying the shared resource.
    pub fn key(&self) -> PolicyKey {
        PolicyKey::new(self.resource_type.clone(), self.resource_id.clone())
    }

    /// Attributes of the given type.
    pub fn attributes_of<'a>(
        &'a self,
        attribute_type: &'a AttributeType,
    ) -> impl Iterator<Item = &'a SharedResourceAttribute> + 'a {
        self.attributes
            .iter()
            .filter(move |attribute| &attribute.attribute_type == attribute_type)
    }
}
