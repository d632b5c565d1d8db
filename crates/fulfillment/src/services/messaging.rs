//! Event publication trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{FulfillmentError, Result};

/// Typed events published by the fulfillment core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEventType {
    OrderCreated,
    OrderHeld,
    OrderReleased,
    OrderCancelled,
    OrderShipmentShipped,
    OrderShipmentReleaseFailed,
    ReturnCreated,
    ReturnCancelled,
    ExchangeCreated,
}

impl OrderEventType {
    /// Returns the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventType::OrderCreated => "ORDER_CREATED",
            OrderEventType::OrderHeld => "ORDER_HELD",
            OrderEventType::OrderReleased => "ORDER_RELEASED",
            OrderEventType::OrderCancelled => "ORDER_CANCELLED",
            OrderEventType::OrderShipmentShipped => "ORDER_SHIPMENT_SHIPPED",
            OrderEventType::OrderShipmentReleaseFailed => "ORDER_SHIPMENT_RELEASE_FAILED",
            OrderEventType::ReturnCreated => "RETURN_CREATED",
            OrderEventType::ReturnCancelled => "RETURN_CANCELLED",
            OrderEventType::ExchangeCreated => "EXCHANGE_CREATED",
        }
    }
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed event: type, subject id, and a key-value payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub event_type: OrderEventType,
    pub subject_id: String,
    pub data: HashMap<String, String>,
}

impl EventMessage {
    /// Creates an event with an empty payload.
    pub fn new(event_type: OrderEventType, subject_id: impl Into<String>) -> Self {
        Self {
            event_type,
            subject_id: subject_id.into(),
            data: HashMap::new(),
        }
    }

    /// Adds a payload entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Trait for fire-and-forget event publication.
///
/// Publish failures surface as [`FulfillmentError::Messaging`]; they are
/// never swallowed here. Whether a failure aborts the surrounding operation
/// is the caller's decision.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, message: EventMessage) -> Result<()>;
}

#[derive(Debug, Default)]
struct PublisherState {
    published: Vec<EventMessage>,
    fail_on_publish: bool,
}

/// In-memory event publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<RwLock<PublisherState>>,
}

impl InMemoryEventPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns all published events.
    pub fn published(&self) -> Vec<EventMessage> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the number of published events of a given type.
    pub fn count_of(&self, event_type: OrderEventType) -> usize {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, message: EventMessage) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_publish {
            return Err(FulfillmentError::Messaging(format!(
                "Failed to publish {}",
                message.event_type
            )));
        }
        state.published.push(message);
        Ok(())
    }
}
