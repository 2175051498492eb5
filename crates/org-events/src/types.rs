//! Event types emitted by the hierarchy components
//!
//! Every event travels in the [`Event`] envelope. Payloads are opaque
//! string key/value maps so downstream consumers (cache invalidators,
//! notifiers) never need the emitting crate's types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Hierarchy component that emitted an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Organization tree index
    Hierarchy,
    /// Resource sharing policy engine
    Sharing,
    /// Organization user association manager
    Association,
    /// Discovery attribute resolver
    Discovery,
}

impl Component {
    /// Get the string representation of the component.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Hierarchy => "hierarchy",
            Component::Sharing => "sharing",
            Component::Association => "association",
            Component::Discovery => "discovery",
        }
    }

    /// Parse component from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hierarchy" => Some(Component::Hierarchy),
            "sharing" => Some(Component::Sharing),
            "association" => Some(Component::Association),
            "discovery" => Some(Component::Discovery),
            _ => None,
        }
    }
}

/// Domain event envelope.
///
/// All events are wrapped in this envelope which provides metadata
/// for routing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type (e.g., "policy.set", "user.created")
    pub event_type: String,

    /// Emitting component
    pub source: Component,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// Organization the event is about
    pub org_id: Option<Uuid>,

    /// User the event is about
    pub user_id: Option<Uuid>,

    /// Correlation ID for tracing
    pub correlation_id: Option<String>,

    /// Event version for schema evolution
    pub version: u32,

    /// Opaque key/value payload
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

impl Event {
    /// Create a new event with an empty payload.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type string
    /// * `source` - The emitting component
    pub fn new(event_type: impl Into<String>, source: Component) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source,
            timestamp: Utc::now(),
            org_id: None,
            user_id: None,
            correlation_id: None,
            version: 1,
            payload: BTreeMap::new(),
        }
    }

    /// Set organization context.
    pub fn with_org(mut self, org_id: Uuid) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Set user context.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add a payload entry.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.payload.insert(key.into(), value.to_string());
        self
    }

    /// Get a payload entry.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    /// Get the topic for this event.
    ///
    /// Topics are structured as: `{source}.{event_type}`
    pub fn topic(&self) -> String {
        format!("{}.{}", self.source.as_str(), self.event_type)
    }
}

// ============================================================================
// Sharing Events
// ============================================================================

/// Resource sharing policy events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingEvent {
    /// A policy was created or replaced
    PolicySet {
        policy_id: Uuid,
        owner_org_id: Uuid,
        resource_type: String,
        resource_id: String,
        policy_type: String,
        attribute_count: usize,
        replaced: bool,
    },
    /// A policy and its attributes were removed
    PolicyRemoved {
        policy_id: Uuid,
        owner_org_id: Uuid,
        resource_type: String,
        resource_id: String,
    },
}

impl SharingEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        match self {
            SharingEvent::PolicySet {
                policy_id,
                owner_org_id,
                resource_type,
                resource_id,
                policy_type,
                attribute_count,
                replaced,
            } => Event::new("policy.set", Component::Sharing)
                .with_org(*owner_org_id)
                .with_attribute("policy_id", policy_id)
                .with_attribute("resource_type", resource_type)
                .with_attribute("resource_id", resource_id)
                .with_attribute("policy_type", policy_type)
                .with_attribute("attribute_count", attribute_count)
                .with_attribute("replaced", replaced),
            SharingEvent::PolicyRemoved {
                policy_id,
                owner_org_id,
                resource_type,
                resource_id,
            } => Event::new("policy.removed", Component::Sharing)
                .with_org(*owner_org_id)
                .with_attribute("policy_id", policy_id)
                .with_attribute("resource_type", resource_type)
                .with_attribute("resource_id", resource_id),
        }
    }
}

// ============================================================================
// Association Events
// ============================================================================

/// Organization user association events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationEvent {
    /// A shared user was minted for a sub-organization
    Created {
        real_user_id: Uuid,
        resident_org_id: Uuid,
        shared_user_id: Uuid,
        sub_org_id: Uuid,
    },
    /// A shared user association was removed
    Removed {
        real_user_id: Uuid,
        resident_org_id: Uuid,
        shared_user_id: Uuid,
        sub_org_id: Uuid,
    },
}

impl AssociationEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        let (event_type, real_user_id, resident_org_id, shared_user_id, sub_org_id) = match self {
            AssociationEvent::Created {
                real_user_id,
                resident_org_id,
                shared_user_id,
                sub_org_id,
            } => ("user.created", real_user_id, resident_org_id, shared_user_id, sub_org_id),
            AssociationEvent::Removed {
                real_user_id,
                resident_org_id,
                shared_user_id,
                sub_org_id,
            } => ("user.removed", real_user_id, resident_org_id, shared_user_id, sub_org_id),
        };
        Event::new(event_type, Component::Association)
            .with_org(*sub_org_id)
            .with_user(*real_user_id)
            .with_attribute("resident_org_id", resident_org_id)
            .with_attribute("shared_user_id", shared_user_id)
            .with_attribute("sub_org_id", sub_org_id)
    }
}

// ============================================================================
// Discovery Events
// ============================================================================

/// Organization discovery events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Discovery configuration was created
    ConfigCreated { org_id: Uuid },
    /// Discovery configuration was replaced
    ConfigUpdated { org_id: Uuid },
    /// Discovery configuration was deleted
    ConfigDeleted { org_id: Uuid },
    /// Discovery attributes of an organization were replaced
    AttributesUpdated { org_id: Uuid, attribute_types: Vec<String> },
    /// Discovery attributes of an organization were deleted
    AttributesDeleted { org_id: Uuid },
}

impl DiscoveryEvent {
    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        match self {
            DiscoveryEvent::ConfigCreated { org_id } => {
                Event::new("config.created", Component::Discovery).with_org(*org_id)
            }
            DiscoveryEvent::ConfigUpdated { org_id } => {
                Event::new("config.updated", Component::Discovery).with_org(*org_id)
            }
            DiscoveryEvent::ConfigDeleted { org_id } => {
                Event::new("config.deleted", Component::Discovery).with_org(*org_id)
            }
            DiscoveryEvent::AttributesUpdated {
                org_id,
                attribute_types,
            } => Event::new("attributes.updated", Component::Discovery)
                .with_org(*org_id)
                .with_attribute("attribute_types", attribute_types.join(",")),
            DiscoveryEvent::AttributesDeleted { org_id } => {
                Event::new("attributes.deleted", Component::Discovery).with_org(*org_id)
            }
        }
    }
}
