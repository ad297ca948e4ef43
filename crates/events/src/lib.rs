//! Domain events and their in-process distribution.
//!
//! Stores commit state first; the committed domain events are then wrapped in
//! an [`EventEnvelope`] and published on an [`EventBus`] for whoever listens
//! (low-stock monitoring, audit logging, tests).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, JsonEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
