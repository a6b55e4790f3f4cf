//! Lifecycle Coordinator
//!
//! Drives every tracked game through one fetch, resolve, plan and execute
//! cycle per tick. A tick that fires while the previous cycle is still
//! running is dropped.

pub mod bootstrap;
pub mod config;
pub mod coordinator;

pub use bootstrap::{serve, start_orchestrator, OrchestratorHandle, Runtime};
pub use config::CoordinatorConfig;
pub use coordinator::{record_task_errors, Coordinator, CycleOutcome};
