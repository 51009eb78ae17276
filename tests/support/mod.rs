//! Shared fixtures for the integration scenarios.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use remote_event_bus::{DispatchContext, HandlerError, RemoteEvent, RemoteEventHandler};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, RemoteEvent)]
pub struct OrderCreated {
    pub order_id: String,
    pub total_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, RemoteEvent)]
#[remote_event(name = "payments.captured.v1")]
pub struct PaymentCaptured {
    pub order_id: String,
}

/// Handler that appends `tag:channel` to a shared log, optionally failing.
pub struct Recording {
    pub tag: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl RemoteEventHandler for Recording {
    fn handle(&self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.tag, ctx.channel()));
        if self.fail {
            Err(HandlerError::new(format!("{} rejected the event", self.tag)))
        } else {
            Ok(())
        }
    }
}

/// Factory for [`Recording`] handlers bound to a shared log.
pub fn recorder(
    log: &Arc<Mutex<Vec<String>>>,
    tag: &'static str,
    fail: bool,
) -> impl Fn() -> Recording + Send + Sync + 'static {
    let log = Arc::clone(log);
    move || Recording {
        tag,
        log: Arc::clone(&log),
        fail,
    }
}

/// Route log output through the test harness so `--nocapture` shows it.
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Spin until `predicate` holds or the timeout expires.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
