pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod hub;
pub mod ledger;
pub mod planner;
pub mod store;
pub mod workers;

pub use config::AppConfig;
pub use coordinator::{Coordinator, CycleOutcome};
pub use error::{OrchestratorError, Result};
pub use events::{DomainEvent, EventBus, EventKind};
pub use hub::BroadcastHub;
