//! Broker client boundary.
//!
//! The publish/subscribe adapters are written against these traits rather
//! than a concrete broker SDK. The crate ships one complete implementation,
//! [`memory::MemoryBroker`], for tests and single-process use; bindings to
//! real brokers implement the same traits in host code.
//!
//! ```text
//! StreamPublisher ──► EventProducer ─┐
//!                                    ├── BrokerClient (memory / kafka / ...)
//! StreamSubscriber ─► EventConsumer ─┘
//! ```

pub mod memory;

use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

use tracing::debug;

use crate::error::BusError;

/// Placement coordinates acknowledged by the broker for one published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub partition: u32,
    pub offset: u64,
}

/// Awaitable confirmation of a single publish.
///
/// Created in a pending state by the producer; the broker side completes
/// it once the message has been placed (or rejected). Dropping a receipt
/// is the fire-and-forget path.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: Receiver<Result<Placement, BusError>>,
}

/// Completion side of a [`DeliveryReceipt`], held by the producer.
pub struct DeliveryTicket {
    tx: Sender<Result<Placement, BusError>>,
}

impl DeliveryReceipt {
    /// Create a pending receipt and the ticket that completes it.
    pub fn pending() -> (DeliveryTicket, DeliveryReceipt) {
        let (tx, rx) = channel();
        (DeliveryTicket { tx }, DeliveryReceipt { rx })
    }

    /// Create a receipt that is already completed.
    pub fn ready(result: Result<Placement, BusError>) -> DeliveryReceipt {
        let (ticket, receipt) = Self::pending();
        ticket.complete(result);
        receipt
    }

    /// Block until the broker acknowledges placement.
    ///
    /// Delivery failures come back as the `Err` arm; they are never
    /// swallowed. A producer that dropped its ticket without completing
    /// it reports as a publish failure too.
    pub fn wait(self) -> Result<Placement, BusError> {
        match self.rx.recv() {
            Ok(Ok(placement)) => Ok(placement),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BusError::Publish(
                "delivery confirmation dropped before completion".to_string(),
            )),
        }
    }
}

impl DeliveryTicket {
    /// Complete the paired receipt. Confirmed placements are logged here,
    /// on the completion side, so fire-and-forget publishes still leave a
    /// trace even when the receipt was dropped unobserved.
    pub fn complete(self, result: Result<Placement, BusError>) {
        if let Ok(placement) = &result {
            debug!(
                partition = placement.partition,
                offset = placement.offset,
                "delivery confirmed"
            );
        }
        let _ = self.tx.send(result);
    }
}

/// One message yielded by a consumer poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub payload: String,
}

/// Everything a consumer poll can yield besides a timeout.
///
/// Assignment, revocation, and end-of-stream markers arrive in-band on the
/// poll stream; the consumer loop logs them and keeps polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    Message(ConsumedMessage),
    EndOfStream { topic: String, partition: u32 },
    Assigned(Vec<u32>),
    Revoked(Vec<u32>),
}

/// Outbound half of the broker boundary.
pub trait EventProducer: Send + Sync {
    /// Hand one payload to the broker for placement on `topic`.
    ///
    /// Returns immediately with a receipt; the broker completes the
    /// receipt once the message is placed. Retry on failure is a broker
    /// client concern, not performed here.
    fn send(&self, topic: &str, payload: String) -> Result<DeliveryReceipt, BusError>;
}

/// Inbound half of the broker boundary. One consumer serves one channel.
pub trait EventConsumer: Send {
    /// Block for up to `timeout` waiting for the next event.
    /// `Ok(None)` means the timeout elapsed with nothing to deliver.
    fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumerEvent>, BusError>;

    /// Commit the position of everything delivered so far.
    fn commit(&mut self) -> Result<(), BusError>;

    /// Stop consumption and release broker-side resources. Idempotent.
    fn unsubscribe(&mut self);
}

/// Factory boundary: produces the producer/consumer halves for one broker.
pub trait BrokerClient: Send + Sync + 'static {
    type Producer: EventProducer + 'static;
    type Consumer: EventConsumer + 'static;

    fn producer(&self) -> Result<Self::Producer, BusError>;

    /// Build a consumer for `topic` under the shared `group_id`, starting
    /// from the group's committed position, or from earliest when the
    /// group has none.
    fn consumer(&self, topic: &str, group_id: &str) -> Result<Self::Consumer, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_receipt_resolves_immediately() {
        let receipt = DeliveryReceipt::ready(Ok(Placement {
            partition: 0,
            offset: 42,
        }));
        assert_eq!(receipt.wait().unwrap().offset, 42);
    }

    #[test]
    fn failed_delivery_is_observable() {
        let receipt = DeliveryReceipt::ready(Err(BusError::Publish("broker down".into())));
        assert!(matches!(receipt.wait(), Err(BusError::Publish(_))));
    }

    #[test]
    fn completing_a_dropped_receipt_is_a_no_op() {
        let (ticket, receipt) = DeliveryReceipt::pending();
        drop(receipt);
        // Fire-and-forget path: completion must not panic or block.
        ticket.complete(Ok(Placement {
            partition: 0,
            offset: 7,
        }));
    }

    #[test]
    fn dropped_ticket_reports_publish_failure() {
        let (ticket, receipt) = DeliveryReceipt::pending();
        drop(ticket);
        assert!(matches!(receipt.wait(), Err(BusError::Publish(_))));
    }
}
