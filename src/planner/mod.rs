//! Task planning
//!
//! Turns a game's derived stage and metrics into a prioritized,
//! dependency-annotated task list. An optional advisory strategy is tried
//! first; the deterministic stage table is always available as a fallback.

pub mod advisory;
pub mod fallback;
pub mod planner;
pub mod task;
pub mod validate;

pub use advisory::{AdvisorConfig, AdvisoryPlanner, AdvisoryRequest, ChatAdvisor};
pub use fallback::fallback_plan;
pub use planner::TaskPlanner;
pub use task::{CandidateTask, Plan, PlanSource, PlanningContext, Priority, Task, TaskId};
pub use validate::{check_structure, validate};

#[cfg(test)]
pub use advisory::MockAdvisoryPlanner;
