//! The transport-level event envelope.

use serde::{Deserialize, Serialize};

/// Marker for a payload type that carries a wire-level event-type name.
///
/// The name is the discriminator the dispatch index is keyed by. Derive it
/// with `#[derive(RemoteEvent)]`, which defaults the name to the type's
/// identifier and supports `#[remote_event(name = "...")]` overrides.
pub trait RemoteEvent {
    fn event_type() -> &'static str;
}

/// The record carried on a channel: `{ event_type, topic, payload }`.
///
/// The payload is an opaque string produced by the configured serializer;
/// the envelope itself is serialized a second time for the wire, so a raw
/// consumed message decodes back into an `EventEnvelope` first and then
/// into the typed payload. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_type: String,
    topic: String,
    payload: String,
}

impl EventEnvelope {
    pub fn new(
        event_type: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The logical event-type discriminator used for dispatch.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The channel this envelope was published to or arrived on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The serialized payload, opaque at this layer.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}
