//! The bus facade: publisher, subscriber, and dispatch engine wired together.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::broker::{BrokerClient, DeliveryReceipt};
use crate::dispatch::DispatchEngine;
use crate::envelope::{EventEnvelope, RemoteEvent};
use crate::error::BusError;
use crate::publish::StreamPublisher;
use crate::serializer::RemoteEventSerializer;
use crate::settings::StreamSettings;
use crate::subscribe::{MessageHandler, RemoteEventSubscriber, StreamSubscriber};

/// One long-lived bus per process: publishes typed events and runs the
/// subscribe → decode → dispatch pipeline.
///
/// The dispatch engine is constructed once, owned here, and shared with
/// every consumer loop by reference — there is no ambient singleton.
///
/// ## Example
///
/// ```ignore
/// let engine = DispatchEngine::builder()
///     .register(HandlerRegistration::for_event("OrderCreated"), || OrderAudit)
///     .build();
/// let bus = RemoteEventBus::new(settings, broker, JsonSerializer, engine)?;
/// bus.start(&["orders"])?;
/// bus.publish("orders", &OrderCreated { order_id: "o-1".into() })?;
/// ```
pub struct RemoteEventBus<B: BrokerClient, S: RemoteEventSerializer + Clone + 'static> {
    publisher: StreamPublisher<B, S>,
    subscriber: StreamSubscriber<B>,
    serializer: S,
    engine: Arc<DispatchEngine>,
}

impl<B, S> RemoteEventBus<B, S>
where
    B: BrokerClient,
    S: RemoteEventSerializer + Clone + 'static,
{
    pub fn new(
        settings: StreamSettings,
        client: B,
        serializer: S,
        engine: DispatchEngine,
    ) -> Result<Self, BusError> {
        let publisher = StreamPublisher::new(&settings, &client, serializer.clone())?;
        let subscriber = StreamSubscriber::new(settings, client)?;
        Ok(Self {
            publisher,
            subscriber,
            serializer,
            engine: Arc::new(engine),
        })
    }

    /// Begin consuming the given channels into the dispatch engine.
    ///
    /// Raw messages that fail to decode into an [`EventEnvelope`] are
    /// logged and skipped; a poisonous message never stops the loop.
    pub fn start(&self, channels: &[&str]) -> Result<(), BusError> {
        let serializer = self.serializer.clone();
        let engine = Arc::clone(&self.engine);
        let handler: MessageHandler = Arc::new(move |channel: &str, payload: &str| {
            match serializer.deserialize::<EventEnvelope>(payload) {
                Ok(envelope) => {
                    engine.handle_event(&envelope, channel);
                }
                Err(err) => {
                    warn!(channel, error = %err, "skipping undecodable message");
                }
            }
        });
        self.subscriber.subscribe(channels, handler)
    }

    /// Fire-and-forget publish of a typed event.
    pub fn publish<E: RemoteEvent + Serialize>(
        &self,
        topic: &str,
        event: &E,
    ) -> Result<(), BusError> {
        self.publisher.publish(topic, event)
    }

    /// Publish a typed event and return the delivery receipt.
    pub fn publish_async<E: RemoteEvent + Serialize>(
        &self,
        topic: &str,
        event: &E,
    ) -> Result<DeliveryReceipt, BusError> {
        self.publisher.publish_async(topic, event)
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    pub fn subscriber(&self) -> &StreamSubscriber<B> {
        &self.subscriber
    }

    /// Stop every consumer loop and release the consumers. Idempotent.
    pub fn shutdown(&self) {
        self.subscriber.shutdown();
    }
}
