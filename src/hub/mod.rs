//! Subscription broadcast hub
//!
//! Keeps the set of connected observers and their filters, answers control
//! messages, and fans client-facing domain events out to matching observers.
//! Each observer has its own bounded outbound queue; a full or closed queue
//! evicts that observer only.

pub mod hub;
pub mod observer;
pub mod protocol;

pub use hub::{BroadcastHub, HubConfig, HubStats};
pub use observer::{EventClasses, ObserverId, Subscription};
pub use protocol::{EventData, InboundMessage, OutboundBody, OutboundMessage};
