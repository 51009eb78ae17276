//! Publishing: typed events out to a named channel.

use serde::Serialize;
use tracing::debug;

use crate::broker::{BrokerClient, DeliveryReceipt, EventProducer};
use crate::envelope::{EventEnvelope, RemoteEvent};
use crate::error::BusError;
use crate::serializer::RemoteEventSerializer;
use crate::settings::StreamSettings;

/// Envelope-level publishing seam.
///
/// Implementations sit in front of a concrete broker; callers that only
/// need "send this envelope somewhere" depend on this trait rather than
/// on an adapter type.
pub trait RemoteEventPublisher: Send + Sync {
    /// Fire-and-forget: hand the envelope to the broker and do not wait.
    ///
    /// Callers needing delivery confirmation must use
    /// [`publish_envelope_async`](Self::publish_envelope_async) and wait
    /// on the receipt.
    fn publish_envelope(&self, envelope: &EventEnvelope) -> Result<(), BusError> {
        self.publish_envelope_async(envelope).map(drop)
    }

    /// Awaitable form: the returned receipt completes once the broker
    /// acknowledges placement.
    fn publish_envelope_async(&self, envelope: &EventEnvelope) -> Result<DeliveryReceipt, BusError>;
}

/// Stream-style publisher: owns one long-lived producer handle.
///
/// Serializes the typed payload, wraps it in an [`EventEnvelope`] keyed by
/// the payload's declared event-type name, and sends it to the channel.
/// No retry is performed here; retry is a broker-client concern.
pub struct StreamPublisher<B: BrokerClient, S: RemoteEventSerializer> {
    producer: B::Producer,
    serializer: S,
}

impl<B: BrokerClient, S: RemoteEventSerializer> StreamPublisher<B, S> {
    pub fn new(settings: &StreamSettings, client: &B, serializer: S) -> Result<Self, BusError> {
        BusError::require_setting(&settings.bootstrap_servers, "bootstrap.servers")?;
        Ok(Self {
            producer: client.producer()?,
            serializer,
        })
    }

    /// Fire-and-forget publish of a typed event.
    pub fn publish<E: RemoteEvent + Serialize>(
        &self,
        topic: &str,
        event: &E,
    ) -> Result<(), BusError> {
        self.publish_async(topic, event).map(drop)
    }

    /// Publish a typed event and return the delivery receipt.
    pub fn publish_async<E: RemoteEvent + Serialize>(
        &self,
        topic: &str,
        event: &E,
    ) -> Result<DeliveryReceipt, BusError> {
        let payload = self.serializer.serialize(event)?;
        let envelope = EventEnvelope::new(E::event_type(), topic, payload);
        self.publish_envelope_async(&envelope)
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }
}

impl<B: BrokerClient, S: RemoteEventSerializer> RemoteEventPublisher for StreamPublisher<B, S> {
    fn publish_envelope_async(&self, envelope: &EventEnvelope) -> Result<DeliveryReceipt, BusError> {
        debug!(
            topic = envelope.topic(),
            event_type = envelope.event_type(),
            "producing"
        );
        let wire = self.serializer.serialize(envelope)?;
        self.producer.send(envelope.topic(), wire)
    }
}
