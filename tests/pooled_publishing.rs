//! Queue-style publishing through the bounded connection pool.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use remote_event_bus::broker::memory::MemoryBroker;
use remote_event_bus::{
    BusError, ConnectionPool, JsonSerializer, MessageHandler, PooledPublisher,
    RemoteEventSerializer, RemoteEventSubscriber, StreamSettings, StreamSubscriber,
};
use remote_event_bus::EventEnvelope;
use support::wait_until;

#[test]
fn two_acquirers_one_connection() {
    support::init_tracing();
    let broker = MemoryBroker::new();
    let pool = Arc::new(ConnectionPool::new(broker.connection_factory(), 0, 1).unwrap());

    let holding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        let holding = Arc::clone(&holding);
        let peak = Arc::clone(&peak);
        workers.push(thread::spawn(move || {
            let conn = pool.acquire().unwrap();
            let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            holding.fetch_sub(1, Ordering::SeqCst);
            drop(conn);
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Exactly one connection was ever out at a time.
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(pool.live(), 1);
}

#[test]
fn pooled_publish_reaches_a_stream_subscriber() {
    support::init_tracing();
    let broker = MemoryBroker::new();
    let pool = Arc::new(ConnectionPool::new(broker.connection_factory(), 1, 4).unwrap());
    let publisher = PooledPublisher::new(pool);

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler: MessageHandler = Arc::new(move |_channel: &str, payload: &str| {
        sink.lock().unwrap().push(payload.to_string());
    });

    let settings = StreamSettings::new("in-memory")
        .unwrap()
        .with_poll_timeout(Duration::from_millis(10));
    let subscriber = StreamSubscriber::new(settings, broker).unwrap();
    subscriber.subscribe(&["invoices"], handler).unwrap();

    let serializer = JsonSerializer;
    let envelope = EventEnvelope::new("InvoiceIssued", "invoices", r#"{"invoice_id":"i-1"}"#);
    let wire = serializer.serialize(&envelope).unwrap();
    publisher.send("invoices", wire).unwrap().wait().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        !received.lock().unwrap().is_empty()
    }));
    let decoded: EventEnvelope =
        serializer.deserialize(&received.lock().unwrap()[0]).unwrap();
    assert_eq!(decoded.event_type(), "InvoiceIssued");

    subscriber.shutdown();
}

#[test]
fn refused_connection_surfaces_to_the_publisher() {
    support::init_tracing();
    let broker = MemoryBroker::new();
    let pool = Arc::new(ConnectionPool::new(broker.connection_factory(), 0, 2).unwrap());
    let publisher = PooledPublisher::new(pool);

    broker.refuse_connections(true);
    let err = publisher.send("invoices", "{}".to_string()).unwrap_err();
    assert!(matches!(err, BusError::Connection(_)));

    // Recovery: once the broker accepts connections again, publishing works.
    broker.refuse_connections(false);
    publisher.send("invoices", "{}".to_string()).unwrap().wait().unwrap();
    assert_eq!(broker.len("invoices"), 1);
}
