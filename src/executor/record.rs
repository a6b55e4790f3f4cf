use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::GameId;
use crate::error::{TaskDispatchError, WorkerError};
use crate::planner::{PlanSource, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Per-cycle outcome of one task; discarded when the cycle ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionRecord {
    pub attempts: u32,
    #[serde(serialize_with = "serialize_error")]
    pub last_error: Option<WorkerError>,
    pub status: TaskStatus,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<WorkerError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Default for TaskExecutionRecord {
    fn default() -> Self {
        Self {
            attempts: 0,
            last_error: None,
            status: TaskStatus::Pending,
        }
    }
}

/// Summary of one execution cycle for one game
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub game_id: GameId,
    pub source: PlanSource,
    pub records: BTreeMap<TaskId, TaskExecutionRecord>,
    /// Task ids in the order they were handed to workers
    pub dispatch_order: Vec<TaskId>,
    /// Blocked tasks carried to the next cycle
    pub deferred: Vec<TaskId>,
    /// Blocked tasks that exhausted their deferrals
    pub dropped: Vec<TaskId>,
    #[serde(skip)]
    pub failures: Vec<TaskDispatchError>,
}

impl CycleReport {
    pub fn status(&self, task: &str) -> Option<TaskStatus> {
        self.records.get(task).map(|r| r.status)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskId> {
        self.records
            .iter()
            .filter(|(_, r)| r.status == TaskStatus::Success)
            .map(|(id, _)| id)
    }

    pub fn was_dispatched(&self, task: &str) -> bool {
        self.dispatch_order.iter().any(|id| id == task)
    }
}
