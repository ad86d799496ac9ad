//! Outbound event envelope and publisher trait.

use thiserror::Error;

use super::OutboundEvent;

/// An event handed to the UI or another collaborator.
#[derive(Clone, Debug)]
pub struct Event {
    /// Unique identifier for this event
    pub id: String,
    /// Event type, e.g. "SnapshotUpdated"
    pub event_type: String,
    /// bitcode-encoded [`OutboundEvent`]
    pub payload: Vec<u8>,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// Wrap an outbound event with a fresh id and a bitcode payload.
    pub fn encode(event: &OutboundEvent) -> Result<Self, PublishError> {
        let payload =
            bitcode::serialize(event).map_err(|e| PublishError::Serialization(e.to_string()))?;
        Ok(Self::new(
            uuid::Uuid::new_v4().to_string(),
            event.event_type(),
            payload,
        ))
    }

    /// Decode the payload back into an outbound event.
    pub fn decode(&self) -> Result<OutboundEvent, PublishError> {
        bitcode::deserialize(&self.payload).map_err(|e| PublishError::Serialization(e.to_string()))
    }
}

/// Error type for publish operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("publisher unavailable: {0}")]
    Unavailable(String),
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Sink for outbound events.
///
/// Implementations might forward to a UI channel, a websocket fan-out, or a
/// message broker. Publishing never blocks on the consumer.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: Event) -> Result<(), PublishError>;

    /// Default implementation publishes events sequentially.
    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}

impl<P: Publisher + ?Sized> Publisher for std::sync::Arc<P> {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        (**self).publish(event)
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        (**self).publish_batch(events)
    }
}

/// Extension trait for publishing typed outbound events on any Publisher.
pub trait OutboundPublisher: Publisher {
    fn emit(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        self.publish(Event::encode(event)?)
    }
}

impl<P: Publisher + ?Sized> OutboundPublisher for P {}
