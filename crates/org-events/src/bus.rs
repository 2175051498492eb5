//! Event bus implementation
//!
//! This module provides the event bus abstraction and the in-memory
//! implementation used to fan hierarchy events out to subscribers.

use crate::types::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Event bus error types.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to publish event
    #[error("Failed to publish event: {0}")]
    PublishError(String),

    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Handler failed to process an event
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// Unknown subscription
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Subscription handle for receiving events.
pub struct Subscription {
    /// Subscription ID
    pub id: String,
    /// Topic pattern
    pub topic: String,
    /// Event receiver
    pub receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Events dropped because the subscriber lagged behind are skipped.
    pub async fn recv(&mut self) -> EventBusResult<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        subscription_id = %self.id,
                        topic = %self.topic,
                        skipped,
                        "Subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::ChannelClosed),
            }
        }
    }

    /// Receive an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

/// Event handler trait for processing events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: Event) -> EventBusResult<()>;

    /// Get the topics this handler is interested in.
    fn topics(&self) -> Vec<String>;
}

/// Event bus trait for publish/subscribe operations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> EventBusResult<()>;

    /// Subscribe to a topic pattern.
    ///
    /// Topic patterns support wildcards:
    /// - `*` matches any single segment
    /// - `#` matches zero or more segments
    ///
    /// Examples:
    /// - `sharing.policy.*` matches `sharing.policy.set`, `sharing.policy.removed`
    /// - `*.config.#` matches configuration events from any component
    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription>;

    /// Register an event handler.
    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()>;

    /// Unsubscribe from a topic.
    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()>;

    /// Get event bus stats.
    async fn stats(&self) -> EventBusStats;
}

/// Event bus statistics.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Total events published
    pub events_published: u64,
    /// Total events delivered to subscribers and handlers
    pub events_delivered: u64,
    /// Active subscriptions
    pub active_subscriptions: usize,
    /// Registered handlers
    pub registered_handlers: usize,
}

/// Publish an event, logging instead of failing when the bus rejects it.
///
/// Domain writes have already been committed when their events are
/// emitted, so a bus failure must not surface as a write failure.
pub async fn publish_best_effort(bus: &dyn EventBus, event: Event) {
    let topic = event.topic();
    let event_id = event.id;
    if let Err(e) = bus.publish(event).await {
        tracing::warn!(topic = %topic, event_id = %event_id, error = %e, "Failed to publish event");
    }
}

/// Check if a topic matches a pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('.').collect();
    let topic_parts: Vec<&str> = topic.split('.').collect();
    segments_match(&pattern_parts, &topic_parts)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&"#", rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=topic.len()).any(|i| segments_match(rest, &topic[i..]))
        }
        Some((&"*", rest)) => !topic.is_empty() && segments_match(rest, &topic[1..]),
        Some((segment, rest)) => {
            topic.first() == Some(segment) && segments_match(rest, &topic[1..])
        }
    }
}

struct TopicChannel {
    sender: broadcast::Sender<Event>,
    subscription_ids: Vec<String>,
}

/// In-memory event bus implementation.
///
/// Suitable for single-process deployments and testing.
pub struct MemoryEventBus {
    /// Topic pattern channels
    channels: Arc<RwLock<HashMap<String, TopicChannel>>>,
    /// Registered handlers
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    events_published: Arc<AtomicU64>,
    events_delivered: Arc<AtomicU64>,
    /// Default channel capacity
    channel_capacity: usize,
}

impl std::fmt::Debug for MemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .field("events_published", &self.events_published.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryEventBus {
    /// Create a new in-memory event bus.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            events_published: Arc::new(AtomicU64::new(0)),
            events_delivered: Arc::new(AtomicU64::new(0)),
            channel_capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: Event) -> EventBusResult<()> {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // Notify matching subscribers
        {
            let channels = self.channels.read().await;
            for (pattern, channel) in channels.iter() {
                if topic_matches(pattern, &topic) {
                    if let Ok(receivers) = channel.sender.send(event.clone()) {
                        self.events_delivered
                            .fetch_add(receivers as u64, Ordering::Relaxed);
                    }
                }
            }
        }

        // Notify handlers
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if handler
                .topics()
                .iter()
                .any(|handler_topic| topic_matches(handler_topic, &topic))
            {
                let handler = handler.clone();
                let event = event.clone();
                let delivered = self.events_delivered.clone();
                tokio::task::spawn(async move {
                    let event_id = event.id;
                    match handler.handle(event).await {
                        Ok(()) => {
                            delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::error!(event_id = %event_id, error = %e, "Event handler failed");
                        }
                    }
                });
            }
        }

        tracing::trace!(topic = %topic, event_id = %event.id, "Event published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription> {
        if topic.is_empty() {
            return Err(EventBusError::SubscribeError("empty topic pattern".to_string()));
        }
        let id = uuid::Uuid::now_v7().to_string();

        let receiver = {
            let mut channels = self.channels.write().await;
            let channel = channels.entry(topic.to_string()).or_insert_with(|| TopicChannel {
                sender: broadcast::channel(self.channel_capacity).0,
                subscription_ids: Vec::new(),
            });
            channel.subscription_ids.push(id.clone());
            channel.sender.subscribe()
        };

        Ok(Subscription {
            id,
            topic: topic.to_string(),
            receiver,
        })
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()> {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> EventBusResult<()> {
        let mut channels = self.channels.write().await;
        let pattern = channels
            .iter()
            .find(|(_, channel)| channel.subscription_ids.iter().any(|id| id == subscription_id))
            .map(|(pattern, _)| pattern.clone())
            .ok_or_else(|| EventBusError::SubscriptionNotFound(subscription_id.to_string()))?;

        if let Some(channel) = channels.get_mut(&pattern) {
            channel.subscription_ids.retain(|id| id != subscription_id);
            if channel.subscription_ids.is_empty() {
                channels.remove(&pattern);
            }
        }
        Ok(())
    }

    async fn stats(&self) -> EventBusStats {
        let active_subscriptions = self
            .channels
            .read()
            .await
            .values()
            .map(|channel| channel.subscription_ids.len())
            .sum();
        EventBusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            active_subscriptions,
            registered_handlers: self.handlers.read().await.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Component;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: Event) -> EventBusResult<()> {
            self.seen.lock().await.push(event.topic());
            Ok(())
        }

        fn topics(&self) -> Vec<String> {
            vec!["association.#".to_string()]
        }
    }

    #[tokio::test]
    async fn test_memory_event_bus_publish_subscribe() {
        let bus = MemoryEventBus::new();

        let mut sub = bus.subscribe("sharing.policy.*").await.unwrap();

        let event = Event::new("policy.set", Component::Sharing);
        bus.publish(event.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, event.id);
    }

    #[test]
    fn test_topic_matching() {
        // Exact match
        assert!(topic_matches("sharing.policy.set", "sharing.policy.set"));

        // Single wildcard
        assert!(topic_matches("sharing.policy.*", "sharing.policy.set"));
        assert!(topic_matches("sharing.*.set", "sharing.policy.set"));
        assert!(topic_matches("*.policy.set", "sharing.policy.set"));

        // Multi-segment wildcard
        assert!(topic_matches("sharing.#", "sharing.policy.set"));
        assert!(topic_matches("#", "sharing.policy.set"));
        assert!(topic_matches("sharing.#.set", "sharing.policy.set"));

        // Non-matches
        assert!(!topic_matches("sharing.policy.removed", "sharing.policy.set"));
        assert!(!topic_matches("discovery.policy.*", "sharing.policy.set"));
        assert!(!topic_matches("sharing.*", "sharing.policy.set"));
    }

    #[tokio::test]
    async fn test_handlers_receive_matching_events() {
        let bus = MemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.register_handler(Arc::new(Recorder { seen: seen.clone() }))
            .await
            .unwrap();

        bus.publish(Event::new("user.created", Component::Association))
            .await
            .unwrap();
        bus.publish(Event::new("policy.set", Component::Sharing))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().await, vec!["association.user.created".to_string()]);
        assert_eq!(bus.stats().await.events_delivered, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_subscription() {
        let bus = MemoryEventBus::new();
        let sub = bus.subscribe("discovery.#").await.unwrap();
        assert_eq!(bus.stats().await.active_subscriptions, 1);

        bus.unsubscribe(&sub.id).await.unwrap();
        assert_eq!(bus.stats().await.active_subscriptions, 0);
        assert!(matches!(
            bus.unsubscribe(&sub.id).await,
            Err(EventBusError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let bus = MemoryEventBus::new();

        let stats = bus.stats().await;
        assert_eq!(stats.events_published, 0);
        assert_eq!(stats.active_subscriptions, 0);

        let _sub = bus.subscribe("hierarchy.*").await.unwrap();
        let stats = bus.stats().await;
        assert_eq!(stats.active_subscriptions, 1);

        bus.publish(Event::new("event", Component::Hierarchy))
            .await
            .unwrap();

        let stats = bus.stats().await;
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.events_delivered, 1);
    }
}
