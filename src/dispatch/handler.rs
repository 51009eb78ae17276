//! Handler capability and registration metadata.

use crate::envelope::EventEnvelope;
use crate::error::HandlerError;

/// What a handler sees for one inbound event: the envelope and the
/// channel it arrived on. Created fresh per dispatch pass.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    envelope: &'a EventEnvelope,
    channel: &'a str,
}

impl<'a> DispatchContext<'a> {
    pub(crate) fn new(envelope: &'a EventEnvelope, channel: &'a str) -> Self {
        Self { envelope, channel }
    }

    pub fn envelope(&self) -> &EventEnvelope {
        self.envelope
    }

    /// The channel the event arrived on (not necessarily the envelope's
    /// declared topic when a producer published across channels).
    pub fn channel(&self) -> &str {
        self.channel
    }

    /// Shortcut to the serialized payload.
    pub fn payload(&self) -> &str {
        self.envelope.payload()
    }
}

/// The handler capability: one method, invoked per matching event.
///
/// Instances are produced per invocation by the factory given at
/// registration, so handlers may be stateless values or capture whatever
/// collaborators they need.
pub trait RemoteEventHandler {
    fn handle(&self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError>;
}

/// Declarative metadata for one handler registration.
///
/// A single handler type may be registered several times (for several
/// event types); several handlers may share one event type (fan-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRegistration {
    /// The event-type discriminator this registration responds to.
    pub event_type: String,
    /// Channel this registration is associated with, if any.
    pub topic: Option<String>,
    /// When true, events arriving on any channel other than `topic` skip
    /// this registration entirely.
    pub only_this_topic: bool,
    /// Ascending invocation order among registrations for the same event
    /// type; ties preserve registration order.
    pub order: i32,
    /// When true, a failure in this handler stops the remaining handlers
    /// for that one event.
    pub suspend_on_error: bool,
}

impl HandlerRegistration {
    pub fn for_event(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            topic: None,
            only_this_topic: false,
            order: 0,
            suspend_on_error: false,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Associate a channel without filtering on it.
    pub fn on_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Associate a channel and only handle events arriving on it.
    pub fn only_on_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self.only_this_topic = true;
        self
    }

    pub fn suspend_on_error(mut self) -> Self {
        self.suspend_on_error = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_builder_defaults() {
        let reg = HandlerRegistration::for_event("OrderCreated");
        assert_eq!(reg.event_type, "OrderCreated");
        assert_eq!(reg.topic, None);
        assert!(!reg.only_this_topic);
        assert_eq!(reg.order, 0);
        assert!(!reg.suspend_on_error);
    }

    #[test]
    fn only_on_topic_sets_the_filter() {
        let reg = HandlerRegistration::for_event("OrderCreated").only_on_topic("orders");
        assert_eq!(reg.topic.as_deref(), Some("orders"));
        assert!(reg.only_this_topic);
    }

    #[test]
    fn context_exposes_envelope_and_channel() {
        let envelope = EventEnvelope::new("T", "declared-topic", "{}");
        let ctx = DispatchContext::new(&envelope, "actual-channel");
        assert_eq!(ctx.envelope().topic(), "declared-topic");
        assert_eq!(ctx.channel(), "actual-channel");
        assert_eq!(ctx.payload(), "{}");
    }
}
