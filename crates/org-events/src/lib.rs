//! # Organization Hierarchy Events
//!
//! This crate provides the event bus the hierarchy components publish
//! their mutations on, so caches and downstream services can react.
//!
//! ## Overview
//!
//! The org-events crate handles:
//! - **Event Types**: Typed events for sharing, associations and discovery
//! - **Event Bus**: Publish/subscribe messaging with topic wildcards
//! - **Event Handlers**: Async event processing
//!
//! ## Features
//!
//! - `memory` (default): In-memory event bus for single-process deployments
//!
//! ## Usage
//!
//! ```rust,no_run
//! use org_events::{EventBus, MemoryEventBus, SharingEvent};
//! use uuid::Uuid;
//!
//! async fn publish_example() {
//!     let bus = MemoryEventBus::new();
//!     let mut sub = bus.subscribe("sharing.policy.*").await.unwrap();
//!
//!     let event = SharingEvent::PolicyRemoved {
//!         policy_id: Uuid::now_v7(),
//!         owner_org_id: Uuid::now_v7(),
//!         resource_type: "application".to_string(),
//!         resource_id: "console".to_string(),
//!     };
//!     bus.publish(event.to_event()).await.unwrap();
//!
//!     let received = sub.recv().await.unwrap();
//!     assert_eq!(received.topic(), "sharing.policy.removed");
//! }
//! ```
//!
//! ## Topic Patterns
//!
//! Topics are structured as `{component}.{event_type}`:
//! - `sharing.policy.set` - Specific event
//! - `association.user.*` - All shared-user events
//! - `*.config.#` - Configuration events from any component
//! - `#` - All events

pub mod bus;
pub mod types;

// Re-export main types
pub use bus::{
    publish_best_effort, topic_matches, EventBus, EventBusError, EventBusResult, EventBusStats,
    EventHandler, MemoryEventBus, Subscription,
};
pub use types::{AssociationEvent, Component, DiscoveryEvent, Event, SharingEvent};
