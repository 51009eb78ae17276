//! In-memory broker for tests and single-process scenarios.
//!
//! Implements the full broker boundary without external dependencies:
//! append-only per-topic logs, consumer groups with committed offsets,
//! earliest-reset semantics, blocking polls with timeouts, and in-band
//! assignment / end-of-stream notifications. Everything lives on a single
//! partition (partition 0).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::broker::{
    BrokerClient, ConsumedMessage, ConsumerEvent, DeliveryReceipt, EventConsumer, EventProducer,
    Placement,
};
use crate::error::BusError;
use crate::pool::ConnectionFactory;

struct BrokerState {
    /// Append-only payload log per topic.
    topics: HashMap<String, Vec<String>>,
    /// Committed next-offset per (group, topic).
    committed: HashMap<(String, String), u64>,
}

struct Shared {
    state: Mutex<BrokerState>,
    arrival: Condvar,
    fail_publishes: AtomicBool,
    fail_polls: AtomicBool,
    fail_commits: AtomicBool,
    refuse_connections: AtomicBool,
}

/// A process-local broker. Cloning shares the underlying logs and offsets.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    topics: HashMap::new(),
                    committed: HashMap::new(),
                }),
                arrival: Condvar::new(),
                fail_publishes: AtomicBool::new(false),
                fail_polls: AtomicBool::new(false),
                fail_commits: AtomicBool::new(false),
                refuse_connections: AtomicBool::new(false),
            }),
        }
    }

    /// All payloads published to `topic`, in order.
    pub fn messages(&self, topic: &str) -> Vec<String> {
        let state = self.shared.state.lock().expect("broker lock poisoned");
        state.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Number of messages on `topic`.
    pub fn len(&self, topic: &str) -> usize {
        let state = self.shared.state.lock().expect("broker lock poisoned");
        state.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// The committed next-offset for a consumer group on a topic, if any.
    pub fn committed(&self, group_id: &str, topic: &str) -> Option<u64> {
        let state = self.shared.state.lock().expect("broker lock poisoned");
        state
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    /// Fault injection: make every subsequent publish report a delivery failure.
    pub fn fail_publishes(&self, fail: bool) {
        self.shared.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Fault injection: make every subsequent poll fail.
    pub fn fail_polls(&self, fail: bool) {
        self.shared.fail_polls.store(fail, Ordering::SeqCst);
    }

    /// Fault injection: make every subsequent commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Fault injection: refuse new pooled connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared
            .refuse_connections
            .store(refuse, Ordering::SeqCst);
    }

    /// Connection factory for [`crate::pool::ConnectionPool`], the
    /// queue-style side of this broker.
    pub fn connection_factory(&self) -> MemoryConnectionFactory {
        MemoryConnectionFactory {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl BrokerClient for MemoryBroker {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    fn producer(&self) -> Result<MemoryProducer, BusError> {
        Ok(MemoryProducer {
            shared: Arc::clone(&self.shared),
        })
    }

    fn consumer(&self, topic: &str, group_id: &str) -> Result<MemoryConsumer, BusError> {
        let state = self.shared.state.lock().expect("broker lock poisoned");
        // Earliest reset: no committed position means start at offset 0.
        let position = state
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0);
        Ok(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            position,
            announced: false,
            at_end: false,
            active: true,
        })
    }
}

/// Producer half of the in-memory broker.
pub struct MemoryProducer {
    shared: Arc<Shared>,
}

impl EventProducer for MemoryProducer {
    fn send(&self, topic: &str, payload: String) -> Result<DeliveryReceipt, BusError> {
        if self.shared.fail_publishes.load(Ordering::SeqCst) {
            return Ok(DeliveryReceipt::ready(Err(BusError::Publish(
                "injected delivery failure".to_string(),
            ))));
        }

        let offset = {
            let mut state = self.shared.state.lock().expect("broker lock poisoned");
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(payload);
            (log.len() - 1) as u64
        };
        self.shared.arrival.notify_all();
        trace!(topic, offset, "message placed");

        Ok(DeliveryReceipt::ready(Ok(Placement {
            partition: 0,
            offset,
        })))
    }
}

/// Consumer half of the in-memory broker. One consumer serves one topic
/// under one group; its read position advances per delivered message and
/// becomes durable only on commit.
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    topic: String,
    group_id: String,
    position: u64,
    announced: bool,
    at_end: bool,
    active: bool,
}

impl EventConsumer for MemoryConsumer {
    fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumerEvent>, BusError> {
        if !self.active {
            return Ok(None);
        }

        if self.shared.fail_polls.load(Ordering::SeqCst) {
            return Err(BusError::Consume("injected poll failure".to_string()));
        }

        if !self.announced {
            self.announced = true;
            return Ok(Some(ConsumerEvent::Assigned(vec![0])));
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("broker lock poisoned");

        loop {
            let len = state.topics.get(&self.topic).map_or(0, Vec::len) as u64;

            if self.position < len {
                let payload = state.topics[&self.topic][self.position as usize].clone();
                let message = ConsumedMessage {
                    topic: self.topic.clone(),
                    partition: 0,
                    offset: self.position,
                    payload,
                };
                self.position += 1;
                self.at_end = false;
                return Ok(Some(ConsumerEvent::Message(message)));
            }

            if !self.at_end {
                self.at_end = true;
                return Ok(Some(ConsumerEvent::EndOfStream {
                    topic: self.topic.clone(),
                    partition: 0,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (next, timed_out) = self
                .shared
                .arrival
                .wait_timeout(state, deadline - now)
                .expect("broker lock poisoned");
            state = next;
            if timed_out.timed_out() {
                return Ok(None);
            }
        }
    }

    fn commit(&mut self) -> Result<(), BusError> {
        if self.shared.fail_commits.load(Ordering::SeqCst) {
            return Err(BusError::Commit("injected commit failure".to_string()));
        }
        let mut state = self.shared.state.lock().expect("broker lock poisoned");
        state
            .committed
            .insert((self.group_id.clone(), self.topic.clone()), self.position);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.active = false;
    }
}

/// Factory handing out pooled connections to the same in-memory broker.
pub struct MemoryConnectionFactory {
    shared: Arc<Shared>,
}

/// A pooled in-memory connection; publishes like a producer.
pub struct MemoryConnection {
    producer: MemoryProducer,
}

impl EventProducer for MemoryConnection {
    fn send(&self, topic: &str, payload: String) -> Result<DeliveryReceipt, BusError> {
        self.producer.send(topic, payload)
    }
}

impl ConnectionFactory for MemoryConnectionFactory {
    type Conn = MemoryConnection;

    fn create(&self) -> Result<MemoryConnection, BusError> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(BusError::Connection(
                "broker refused the connection".to_string(),
            ));
        }
        Ok(MemoryConnection {
            producer: MemoryProducer {
                shared: Arc::clone(&self.shared),
            },
        })
    }

    fn destroy(&self, _conn: MemoryConnection) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_preamble(consumer: &mut MemoryConsumer) {
        // First polls yield the assignment notice and the end-of-stream marker.
        assert!(matches!(
            consumer.poll(Duration::from_millis(10)).unwrap(),
            Some(ConsumerEvent::Assigned(_))
        ));
    }

    #[test]
    fn produce_then_consume_in_order() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().unwrap();
        producer.send("orders", "one".into()).unwrap();
        producer.send("orders", "two".into()).unwrap();

        let mut consumer = broker.consumer("orders", "g1").unwrap();
        drain_preamble(&mut consumer);

        match consumer.poll(Duration::from_millis(10)).unwrap() {
            Some(ConsumerEvent::Message(m)) => {
                assert_eq!(m.payload, "one");
                assert_eq!(m.offset, 0);
            }
            other => panic!("unexpected poll result: {other:?}"),
        }
        match consumer.poll(Duration::from_millis(10)).unwrap() {
            Some(ConsumerEvent::Message(m)) => assert_eq!(m.payload, "two"),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn end_of_stream_is_reported_once_then_polls_time_out() {
        let broker = MemoryBroker::new();
        let mut consumer = broker.consumer("empty", "g1").unwrap();
        drain_preamble(&mut consumer);

        assert!(matches!(
            consumer.poll(Duration::from_millis(5)).unwrap(),
            Some(ConsumerEvent::EndOfStream { .. })
        ));
        assert!(consumer.poll(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn committed_position_survives_consumer_restart() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().unwrap();
        producer.send("orders", "one".into()).unwrap();
        producer.send("orders", "two".into()).unwrap();

        let mut consumer = broker.consumer("orders", "g1").unwrap();
        drain_preamble(&mut consumer);
        consumer.poll(Duration::from_millis(10)).unwrap();
        consumer.commit().unwrap();

        // A fresh consumer in the same group resumes past the commit.
        let mut resumed = broker.consumer("orders", "g1").unwrap();
        drain_preamble(&mut resumed);
        match resumed.poll(Duration::from_millis(10)).unwrap() {
            Some(ConsumerEvent::Message(m)) => assert_eq!(m.payload, "two"),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn fresh_group_starts_from_earliest() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().unwrap();
        producer.send("orders", "one".into()).unwrap();

        let mut consumer = broker.consumer("orders", "brand-new-group").unwrap();
        drain_preamble(&mut consumer);
        match consumer.poll(Duration::from_millis(10)).unwrap() {
            Some(ConsumerEvent::Message(m)) => assert_eq!(m.offset, 0),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn poll_wakes_on_new_message() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().unwrap();
        let mut consumer = broker.consumer("orders", "g1").unwrap();
        drain_preamble(&mut consumer);
        // Consume the end-of-stream marker so the next poll blocks.
        consumer.poll(Duration::from_millis(5)).unwrap();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.send("orders", "late".into()).unwrap();
        });

        let polled = consumer.poll(Duration::from_millis(500)).unwrap();
        handle.join().unwrap();
        match polled {
            Some(ConsumerEvent::Message(m)) => assert_eq!(m.payload, "late"),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn injected_failures() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().unwrap();

        broker.fail_publishes(true);
        let receipt = producer.send("orders", "doomed".into()).unwrap();
        assert!(matches!(receipt.wait(), Err(BusError::Publish(_))));
        broker.fail_publishes(false);

        let mut consumer = broker.consumer("orders", "g1").unwrap();
        broker.fail_commits(true);
        assert!(matches!(consumer.commit(), Err(BusError::Commit(_))));
        broker.fail_commits(false);

        broker.fail_polls(true);
        assert!(matches!(
            consumer.poll(Duration::from_millis(5)),
            Err(BusError::Consume(_))
        ));
    }
}
