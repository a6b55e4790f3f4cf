//! In-process event bus
//!
//! Worker completions are published here once; the broadcast hub and any
//! other consumer subscribe by event type. Nothing published on the bus is
//! ever republished onto it, so events cannot loop between producers and
//! observers.

pub mod bus;
pub mod types;

pub use bus::EventBus;
pub use types::{DomainEvent, EventKind};
