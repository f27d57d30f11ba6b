//! `warden-events`: event contract and pub/sub mechanics.
//!
//! The engine uses this to publish audit facts (denials, role writes) to
//! whatever collaborator persists them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
