//! Bounded connection pool for queue-style brokers.
//!
//! Opening a broker connection per publish is prohibitively expensive and
//! unsafe under load, so the queue-style adapter acquires from a bounded
//! pool instead. The pool pre-warms `initial_size` connections, never lets
//! more than `max_size` live at once, and blocks acquirers at the ceiling
//! until a release.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, warn};

use crate::broker::{DeliveryReceipt, EventProducer};
use crate::error::BusError;
use crate::settings::QueueSettings;

/// Manufactures and destroys broker connections.
///
/// `create` is expected to hand back a connection configured with
/// automatic recovery, the negotiated frame maximum, and a heartbeat
/// interval, per the adapter's [`QueueSettings`]. A creation failure is
/// fatal for that acquisition attempt and is surfaced to the caller,
/// never retried silently inside the pool.
pub trait ConnectionFactory: Send + Sync {
    type Conn: Send;

    fn create(&self) -> Result<Self::Conn, BusError>;

    fn destroy(&self, conn: Self::Conn);
}

struct PoolState<C> {
    idle: VecDeque<C>,
    live: usize,
    shutting_down: bool,
}

/// Bounded pool of broker connections.
///
/// Callers acquire and release; the pool internally serializes acquisition
/// against its size bound. Released connections return to the idle set
/// unless the pool is shutting down, in which case they are destroyed.
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    max_size: usize,
    state: Mutex<PoolState<F::Conn>>,
    released: Condvar,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Build the pool and pre-warm `initial_size` connections.
    ///
    /// A pre-warm failure is a connection error at construction time,
    /// surfaced immediately.
    pub fn new(factory: F, initial_size: usize, max_size: usize) -> Result<Self, BusError> {
        if max_size == 0 {
            return Err(BusError::Configuration(
                "pool max_size must be at least 1".to_string(),
            ));
        }
        if initial_size > max_size {
            return Err(BusError::Configuration(format!(
                "pool initial_size {initial_size} exceeds max_size {max_size}"
            )));
        }

        let mut idle = VecDeque::with_capacity(initial_size);
        for _ in 0..initial_size {
            idle.push_back(factory.create()?);
        }
        let live = idle.len();

        Ok(Self {
            factory,
            max_size,
            state: Mutex::new(PoolState {
                idle,
                live,
                shutting_down: false,
            }),
            released: Condvar::new(),
        })
    }

    /// Build the pool from queue settings.
    pub fn from_settings(factory: F, settings: &QueueSettings) -> Result<Self, BusError> {
        Self::new(factory, settings.initial_size, settings.max_size)
    }

    /// Acquire a connection, blocking while `max_size` are already out.
    ///
    /// The guard returns the connection on drop. If no idle connection is
    /// available and the ceiling has not been reached, a new one is
    /// created; a creation failure is returned to the caller as-is.
    pub fn acquire(&self) -> Result<PooledConnection<'_, F>, BusError> {
        let mut state = self.state.lock().expect("pool lock poisoned");

        loop {
            if state.shutting_down {
                return Err(BusError::ShuttingDown);
            }

            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                });
            }

            if state.live < self.max_size {
                state.live += 1;
                // Create outside the lock so a slow broker handshake does
                // not stall releases.
                drop(state);
                match self.factory.create() {
                    Ok(conn) => {
                        debug!("pool connection created");
                        return Ok(PooledConnection {
                            pool: self,
                            conn: Some(conn),
                        });
                    }
                    Err(err) => {
                        let mut state = self.state.lock().expect("pool lock poisoned");
                        state.live -= 1;
                        self.released.notify_one();
                        return Err(err);
                    }
                }
            }

            state = self
                .released
                .wait(state)
                .expect("pool lock poisoned");
        }
    }

    /// Number of live connections (idle plus checked out).
    pub fn live(&self) -> usize {
        self.state.lock().expect("pool lock poisoned").live
    }

    /// Number of idle connections waiting in the pool.
    pub fn idle(&self) -> usize {
        self.state.lock().expect("pool lock poisoned").idle.len()
    }

    /// Destroy idle connections and refuse further acquisitions.
    /// Checked-out connections are destroyed as they come back. Idempotent.
    pub fn shutdown(&self) {
        let drained: Vec<F::Conn> = {
            let mut state = self.state.lock().expect("pool lock poisoned");
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            let drained: Vec<F::Conn> = state.idle.drain(..).collect();
            state.live -= drained.len();
            drained
        };
        for conn in drained {
            self.factory.destroy(conn);
        }
        self.released.notify_all();
    }

    fn release(&self, conn: F::Conn) {
        let mut state = self.state.lock().expect("pool lock poisoned");
        if state.shutting_down {
            state.live -= 1;
            drop(state);
            self.factory.destroy(conn);
        } else {
            state.idle.push_back(conn);
            drop(state);
        }
        self.released.notify_one();
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// RAII guard over a pooled connection; returns it on drop.
pub struct PooledConnection<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    conn: Option<F::Conn>,
}

impl<F: ConnectionFactory> PooledConnection<'_, F> {
    pub fn get(&self) -> &F::Conn {
        self.conn.as_ref().expect("connection taken")
    }

    pub fn get_mut(&mut self) -> &mut F::Conn {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Queue-style publisher: one pooled connection per publish.
///
/// Mirrors the AMQP publishing shape — acquire a connection, send on it,
/// release it back — with the pool amortizing connection setup across
/// publishes.
pub struct PooledPublisher<F: ConnectionFactory>
where
    F::Conn: EventProducer,
{
    pool: Arc<ConnectionPool<F>>,
}

impl<F: ConnectionFactory> PooledPublisher<F>
where
    F::Conn: EventProducer,
{
    pub fn new(pool: Arc<ConnectionPool<F>>) -> Self {
        Self { pool }
    }

    /// Send one raw payload to `topic` over a pooled connection.
    pub fn send(&self, topic: &str, payload: String) -> Result<DeliveryReceipt, BusError> {
        let conn = self.pool.acquire()?;
        let receipt = conn.get().send(topic, payload);
        if receipt.is_err() {
            warn!(topic, "pooled publish failed");
        }
        receipt
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }
}
