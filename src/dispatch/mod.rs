//! In-process dispatch: routing a decoded event to registered handlers.
//!
//! The engine is built once per process from explicit registrations, each
//! carrying the routing metadata for one handler: target event type,
//! optional target channel, ordering, and failure policy. The resulting
//! index is read-only for the process lifetime.
//!
//! ```text
//! consumer loop ──► decode ──► DispatchEngine::handle_event(envelope, channel)
//!                                   │ lookup by event type
//!                                   │ filter by channel
//!                                   ▼
//!                          ordered handler invocations
//!                          (suspend-on-error per handler)
//! ```

mod engine;
mod handler;

pub use engine::{
    DispatchEngine, DispatchEngineBuilder, DispatchOutcome, HandlerFailure, HANDLER_FAILURE_EVENT,
};
pub use handler::{DispatchContext, HandlerRegistration, RemoteEventHandler};
