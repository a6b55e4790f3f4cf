//! Task execution
//!
//! Orders a plan by descending priority within the dependency partial order,
//! dispatches ready tasks concurrently, applies the bounded retry policy and
//! carries blocked tasks over to the next cycle.

pub mod config;
pub mod executor;
pub mod record;

pub use config::ExecutorConfig;
pub use executor::TaskExecutor;
pub use record::{CycleReport, TaskExecutionRecord, TaskStatus};
