//! Broker-agnostic remote event bus.
//!
//! Publish typed domain events to named channels, consume them with one
//! dedicated loop per channel, and route decoded events through a
//! declarative in-process dispatch engine. Broker SDKs sit behind the
//! [`broker`] boundary traits; an in-memory broker ships for tests and
//! single-process use.

mod bus;
mod envelope;
mod error;
mod settings;

pub mod broker;
pub mod dispatch;
pub mod pool;
pub mod publish;
pub mod serializer;
pub mod subscribe;

pub use bus::RemoteEventBus;
pub use envelope::{EventEnvelope, RemoteEvent};
pub use error::{BusError, HandlerError};
pub use settings::{QueueSettings, StreamSettings};

pub use broker::{DeliveryReceipt, Placement};
pub use dispatch::{
    DispatchContext, DispatchEngine, DispatchEngineBuilder, DispatchOutcome, HandlerFailure,
    HandlerRegistration, RemoteEventHandler,
};
pub use pool::{ConnectionFactory, ConnectionPool, PooledPublisher};
pub use publish::{RemoteEventPublisher, StreamPublisher};
pub use serializer::{BitcodeSerializer, JsonSerializer, RemoteEventSerializer};
pub use subscribe::{MessageHandler, RemoteEventSubscriber, StreamSubscriber};

// Derive for event-type discriminators; same name as the trait it implements.
pub use remote_event_bus_macros::RemoteEvent;
