//! The dispatch engine: read-only index, ordered invocation, and the
//! suspend-on-error policy.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::dispatch::handler::{DispatchContext, HandlerRegistration, RemoteEventHandler};
use crate::envelope::EventEnvelope;
use crate::error::HandlerError;

/// Event name the engine emits handler failures under.
pub const HANDLER_FAILURE_EVENT: &str = "handler_failure";

/// Side-channel record emitted when a registered handler fails.
///
/// Fire-and-forget: listeners observe dispatch failures without ever
/// blocking dispatch itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFailure {
    pub event_type: String,
    pub channel: String,
    pub order: i32,
    pub message: String,
}

/// What one `handle_event` pass did: how many handlers ran, whether a
/// failing handler's policy cut the pass short, and the last failure.
///
/// Suspension is scoped to this one outcome; it never carries over to
/// the next event.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub invoked: usize,
    pub suspended: bool,
    pub last_error: Option<HandlerError>,
}

type HandlerFactory = Box<dyn Fn() -> Box<dyn RemoteEventHandler> + Send + Sync>;

struct Candidate {
    registration: HandlerRegistration,
    factory: HandlerFactory,
}

/// Collects registrations at process startup; `build` freezes them into
/// the engine's read-only index.
#[derive(Default)]
pub struct DispatchEngineBuilder {
    entries: Vec<Candidate>,
}

impl DispatchEngineBuilder {
    /// Register a handler factory under the given metadata.
    ///
    /// The factory runs once per matching inbound event, so each
    /// invocation gets a fresh handler instance.
    pub fn register<H, F>(mut self, registration: HandlerRegistration, factory: F) -> Self
    where
        H: RemoteEventHandler + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.entries.push(Candidate {
            registration,
            factory: Box::new(move || Box::new(factory())),
        });
        self
    }

    /// Freeze the registrations into an engine.
    ///
    /// Candidate lists are sorted ascending by `order`; the sort is
    /// stable, so ties keep their registration order.
    pub fn build(self) -> DispatchEngine {
        let mut index: HashMap<String, Vec<Candidate>> = HashMap::new();
        for candidate in self.entries {
            index
                .entry(candidate.registration.event_type.clone())
                .or_default()
                .push(candidate);
        }
        for candidates in index.values_mut() {
            candidates.sort_by_key(|c| c.registration.order);
        }
        DispatchEngine {
            index,
            emitter: Mutex::new(EventEmitter::new()),
        }
    }
}

/// Routes decoded events to registered handlers.
///
/// Built once per process and shared (typically behind an `Arc`) with
/// every consumer loop; the index is immutable after construction, so
/// lookups take no lock.
pub struct DispatchEngine {
    index: HashMap<String, Vec<Candidate>>,
    emitter: Mutex<EventEmitter>,
}

impl DispatchEngine {
    pub fn builder() -> DispatchEngineBuilder {
        DispatchEngineBuilder::default()
    }

    /// Subscribe to the side channel of handler failures.
    pub fn on_handler_failure<F>(&self, listener: F)
    where
        F: Fn(HandlerFailure) + Send + Sync + 'static,
    {
        let mut emitter = self.emitter.lock().expect("failure emitter poisoned");
        emitter.on(HANDLER_FAILURE_EVENT, move |failure: HandlerFailure| {
            listener(failure)
        });
    }

    /// Dispatch one decoded event to its registered handlers.
    ///
    /// An event type with no registrations is a no-op, not an error.
    /// Candidates whose channel filter rejects `channel` are skipped
    /// without counting as attempted. A failing handler is logged and
    /// reported on the side channel; it stops the remaining candidates
    /// only when that registration opted into `suspend_on_error`.
    pub fn handle_event(&self, envelope: &EventEnvelope, channel: &str) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let Some(candidates) = self.index.get(envelope.event_type()) else {
            trace!(
                event_type = envelope.event_type(),
                "no handlers registered"
            );
            return outcome;
        };

        for candidate in candidates {
            let registration = &candidate.registration;

            if registration.only_this_topic && registration.topic.as_deref() != Some(channel) {
                continue;
            }

            let handler = (candidate.factory)();
            let ctx = DispatchContext::new(envelope, channel);
            outcome.invoked += 1;

            // A panicking handler is treated like an erring one: isolated,
            // reported, and escalated only per its own policy.
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&ctx)))
                .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));

            if let Err(err) = result {
                error!(
                    event_type = envelope.event_type(),
                    channel,
                    order = registration.order,
                    error = %err,
                    "handler failed"
                );
                self.emit_failure(HandlerFailure {
                    event_type: envelope.event_type().to_string(),
                    channel: channel.to_string(),
                    order: registration.order,
                    message: err.message().to_string(),
                });
                if registration.suspend_on_error {
                    outcome.suspended = true;
                }
                outcome.last_error = Some(err);
            }

            if outcome.suspended {
                break;
            }
        }

        outcome
    }

    /// Number of registrations for an event type; zero when unknown.
    pub fn registered(&self, event_type: &str) -> usize {
        self.index.get(event_type).map_or(0, Vec::len)
    }

    fn emit_failure(&self, failure: HandlerFailure) {
        let mut emitter = self.emitter.lock().expect("failure emitter poisoned");
        emitter.emit(HANDLER_FAILURE_EVENT, failure);
    }
}
