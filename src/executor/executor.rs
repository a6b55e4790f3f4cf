//! TaskExecutor: dependency-ordered, concurrent dispatch with bounded retry

use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::config::ExecutorConfig;
use super::record::{CycleReport, TaskExecutionRecord, TaskStatus};
use crate::domain::GameId;
use crate::error::{TaskDispatchError, WorkerError, WorkerResult};
use crate::events::{DomainEvent, EventBus, EventKind};
use crate::planner::{Plan, Task, TaskId};
use crate::workers::{WorkerCall, WorkerOutput, WorkerSet};

struct DeferredTask {
    task: Task,
    deferrals: u32,
}

struct TaskOutcome {
    task: Task,
    attempts: u32,
    result: WorkerResult<WorkerOutput>,
}

/// Client-visible event for a successful worker call, if any
fn client_event(game_id: GameId, output: &WorkerOutput) -> Option<DomainEvent> {
    let (kind, payload) = match output {
        WorkerOutput::BoardCreated(created) => (
            EventKind::BoardUpdate,
            json!({
                "action": "board_created",
                "boardRef": created.board_ref,
                "txRef": created.tx_ref,
            }),
        ),
        WorkerOutput::Randomness(request) => (
            EventKind::BoardUpdate,
            json!({
                "action": "randomization_requested",
                "randomnessRef": request.randomness_ref,
            }),
        ),
        WorkerOutput::Score(score) => (EventKind::ScoreUpdate, json!(score)),
        WorkerOutput::Winner(info) => (EventKind::WinnerAnnounced, json!(info)),
        WorkerOutput::Payout(receipt) => (
            EventKind::BoardUpdate,
            json!({
                "action": "payout_sent",
                "recipient": receipt.recipient,
                "amount": receipt.amount,
                "txRef": receipt.tx_ref,
            }),
        ),
        WorkerOutput::Notified(_) => return None,
    };
    Some(DomainEvent::new(kind, game_id, payload))
}

pub struct TaskExecutor {
    workers: WorkerSet,
    bus: EventBus,
    config: ExecutorConfig,
    deferred: DashMap<GameId, Vec<DeferredTask>>,
}

impl TaskExecutor {
    pub fn new(workers: WorkerSet, bus: EventBus, config: ExecutorConfig) -> Self {
        Self {
            workers,
            bus,
            config,
            deferred: DashMap::new(),
        }
    }

    /// Tasks currently carried over for a game
    pub fn deferred_tasks(&self, game_id: GameId) -> Vec<TaskId> {
        self.deferred
            .get(&game_id)
            .map(|tasks| tasks.iter().map(|d| d.task.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Run one cycle for one game.
    ///
    /// Tasks carried from earlier cycles are merged in (a plan task with the
    /// same id replaces the carried one). A task is dispatched only once a
    /// `task_completed` event for each of its dependencies has been seen on
    /// the bus during this cycle; anything still blocked when no work remains
    /// in flight is deferred.
    pub async fn execute(&self, plan: Plan) -> CycleReport {
        let game_id = plan.game_id;
        let mut completions = self.bus.subscribe(EventKind::TaskCompleted);
        let (mut pending, deferrals) = self.merge_deferred(game_id, plan.tasks);
        // stable: equal priorities keep plan order
        pending.sort_by_key(|task| Reverse(task.priority));

        let mut report = CycleReport {
            game_id,
            source: plan.source,
            records: pending
                .iter()
                .map(|task| (task.id.clone(), TaskExecutionRecord::default()))
                .collect(),
            dispatch_order: Vec::new(),
            deferred: Vec::new(),
            dropped: Vec::new(),
            failures: Vec::new(),
        };

        let mut succeeded: HashSet<TaskId> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            let (ready, blocked): (Vec<Task>, Vec<Task>) = pending.into_iter().partition(|task| {
                task.dependencies
                    .iter()
                    .all(|dep| succeeded.contains(dep))
            });
            pending = blocked;

            for task in ready {
                if let Some(record) = report.records.get_mut(&task.id) {
                    record.status = TaskStatus::Running;
                }
                debug!(game_id, task = %task.id, priority = task.priority.get(), "dispatching task");
                report.dispatch_order.push(task.id.clone());
                in_flight.push(self.run_task(game_id, task));
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };
            Self::record_outcome(&mut report, outcome);
            Self::drain_completions(game_id, &mut completions, &mut succeeded);
        }

        self.defer_blocked(game_id, pending, &deferrals, &mut report);
        report
    }

    fn merge_deferred(&self, game_id: GameId, tasks: Vec<Task>) -> (Vec<Task>, HashMap<TaskId, u32>) {
        let carried = self
            .deferred
            .remove(&game_id)
            .map(|(_, tasks)| tasks)
            .unwrap_or_default();

        let planned: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut deferrals = HashMap::with_capacity(carried.len());
        let mut queue = tasks;
        for DeferredTask { task, deferrals: n } in carried {
            deferrals.insert(task.id.clone(), n);
            if !planned.contains(&task.id) {
                queue.push(task);
            }
        }
        (queue, deferrals)
    }

    /// Completions for this game, whether published by this executor or by a
    /// worker reporting out of band
    fn drain_completions(
        game_id: GameId,
        completions: &mut mpsc::UnboundedReceiver<DomainEvent>,
        succeeded: &mut HashSet<TaskId>,
    ) {
        while let Ok(event) = completions.try_recv() {
            if event.game_id != game_id {
                continue;
            }
            if let Some(task) = event.payload["task"].as_str() {
                succeeded.insert(task.to_string());
            }
        }
    }

    fn record_outcome(report: &mut CycleReport, outcome: TaskOutcome) {
        let TaskOutcome {
            task,
            attempts,
            result,
        } = outcome;
        let record = report.records.entry(task.id.clone()).or_default();
        record.attempts = attempts;
        match result {
            Ok(_) => {
                record.status = TaskStatus::Success;
                record.last_error = None;
            }
            Err(err) => {
                record.status = TaskStatus::Failed;
                record.last_error = Some(err.clone());
                report.failures.push(TaskDispatchError {
                    task: task.id,
                    attempts,
                    source: err,
                });
            }
        }
    }

    fn defer_blocked(
        &self,
        game_id: GameId,
        blocked: Vec<Task>,
        deferrals: &HashMap<TaskId, u32>,
        report: &mut CycleReport,
    ) {
        let mut carried = Vec::new();
        for task in blocked {
            let count = deferrals.get(&task.id).copied().unwrap_or(0) + 1;
            if count > self.config.max_deferrals {
                warn!(game_id, task = %task.id, deferrals = count - 1, "dropping task with unresolved dependencies");
                self.bus
                    .publish(DomainEvent::task_dropped(game_id, &task.id, count - 1));
                report.dropped.push(task.id);
            } else {
                debug!(game_id, task = %task.id, deferrals = count, "deferring task to next cycle");
                report.deferred.push(task.id.clone());
                carried.push(DeferredTask {
                    task,
                    deferrals: count,
                });
            }
        }
        if !carried.is_empty() {
            self.deferred.insert(game_id, carried);
        }
    }

    async fn run_task(&self, game_id: GameId, task: Task) -> TaskOutcome {
        let retryable = self
            .config
            .is_retryable(&task.call.qualified_name(), &task.id);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.invoke(&task.call).await {
                Ok(output) => {
                    info!(game_id, task = %task.id, attempts, "task succeeded");
                    self.bus.publish(DomainEvent::task_completed(
                        game_id,
                        &task.id,
                        attempts,
                        output.to_json(),
                    ));
                    if let Some(event) = client_event(game_id, &output) {
                        self.bus.publish(event);
                    }
                    return TaskOutcome {
                        task,
                        attempts,
                        result: Ok(output),
                    };
                }
                Err(err) => {
                    let will_retry = retryable && attempts == 1;
                    warn!(game_id, task = %task.id, attempts, will_retry, error = %err, "task failed");
                    let failure = TaskDispatchError {
                        task: task.id.clone(),
                        attempts,
                        source: err.clone(),
                    };
                    self.bus
                        .publish(DomainEvent::task_error(game_id, &failure, will_retry));
                    if !will_retry {
                        return TaskOutcome {
                            task,
                            attempts,
                            result: Err(err),
                        };
                    }
                    sleep(self.config.retry_backoff()).await;
                }
            }
        }
    }

    async fn invoke(&self, call: &WorkerCall) -> WorkerResult<WorkerOutput> {
        let started = Instant::now();
        match timeout(self.config.worker_timeout(), self.workers.dispatch(call)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}
