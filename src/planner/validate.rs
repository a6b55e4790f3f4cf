//! Plan acceptance checks
//!
//! A candidate plan is accepted only if every task names a catalog pair,
//! carries an in-range priority, and the dependency graph is closed and
//! acyclic. Arguments are bound from the planning context so an advisory
//! plan can never address a different game.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::task::{CandidateTask, PlanningContext, Priority, Task, TaskId};
use crate::error::PlanningError;
use crate::workers::catalog::{lookup, Action, Capability};
use crate::workers::{NotificationKind, WorkerCall};

fn invalid(msg: impl Into<String>) -> PlanningError {
    PlanningError::Invalid(msg.into())
}

fn bind_call(
    action: Action,
    arguments: &Value,
    ctx: &PlanningContext,
) -> Result<WorkerCall, PlanningError> {
    if let Some(game_id) = arguments.get("gameId").and_then(Value::as_u64) {
        if game_id != ctx.game_id {
            return Err(invalid(format!(
                "task addresses game {game_id} while planning game {}",
                ctx.game_id
            )));
        }
    }

    let call = match action {
        Action::CreateBoard => WorkerCall::CreateBoard {
            game_id: ctx.game_id,
        },
        Action::RequestRandomization => WorkerCall::RequestRandomization {
            board: ctx.board_ref.clone(),
        },
        Action::FetchScores => WorkerCall::FetchScores {
            game_id: ctx.game_id,
        },
        Action::SettleWinner => WorkerCall::SettleWinner {
            board: ctx.board_ref.clone(),
        },
        Action::PayoutWinner => WorkerCall::PayoutWinner {
            board: ctx.board_ref.clone(),
            winner: ctx
                .winner
                .clone()
                .ok_or_else(|| invalid("payout_winner requires a settled winner"))?,
        },
        Action::SendNotification => {
            let kind = arguments
                .get("kind")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("send_notification requires a kind"))?
                .parse::<NotificationKind>()
                .map_err(invalid)?;
            WorkerCall::SendNotification {
                kind,
                recipient: arguments
                    .get("recipient")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| ctx.broadcast_recipient()),
                payload: arguments
                    .get("payload")
                    .filter(|p| !p.is_null())
                    .cloned()
                    .unwrap_or_else(|| ctx.notification_payload()),
            }
        }
    };
    Ok(call)
}

/// Validate advisory candidates into dispatchable tasks
pub fn validate(
    candidates: Vec<CandidateTask>,
    ctx: &PlanningContext,
) -> Result<Vec<Task>, PlanningError> {
    if candidates.is_empty() {
        return Err(PlanningError::Empty);
    }

    let mut tasks = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let capability: Capability = candidate.capability.parse().map_err(invalid)?;
        let action: Action = candidate.action.parse().map_err(invalid)?;
        if lookup(capability, action).is_none() {
            return Err(invalid(format!("{capability}.{action} is not in the catalog")));
        }
        let priority = Priority::checked(candidate.priority).ok_or_else(|| {
            invalid(format!(
                "priority {} outside [{}, {}]",
                candidate.priority,
                Priority::MIN,
                Priority::MAX
            ))
        })?;

        let call = bind_call(action, &candidate.arguments, ctx)?;
        let mut task = Task::new(call, priority);
        if let Some(id) = candidate.id.filter(|id| !id.trim().is_empty()) {
            task = task.with_id(id.trim());
        }
        task.dependencies = candidate
            .dependencies
            .into_iter()
            .map(|d| d.trim().to_string())
            .collect::<BTreeSet<_>>();
        tasks.push(task);
    }

    check_structure(&tasks)?;
    Ok(tasks)
}

/// Unique ids, dependencies inside the plan, no cycles
pub fn check_structure(tasks: &[Task]) -> Result<(), PlanningError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(invalid(format!("duplicate task id {}", task.id)));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if dep == &task.id {
                return Err(invalid(format!("{} depends on itself", task.id)));
            }
            if !ids.contains(dep.as_str()) {
                return Err(invalid(format!(
                    "{} depends on unknown task {}",
                    task.id, dep
                )));
            }
        }
    }

    // Kahn's algorithm: anything left unvisited sits on a cycle
    let mut indegree: HashMap<&str, usize> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.len()))
        .collect();
    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;
    while let Some(done) = ready.pop() {
        visited += 1;
        for task in tasks.iter().filter(|t| t.dependencies.contains(done)) {
            if let Some(n) = indegree.get_mut(task.id.as_str()) {
                *n -= 1;
                if *n == 0 {
                    ready.push(task.id.as_str());
                }
            }
        }
    }

    if visited != tasks.len() {
        let stuck: Vec<TaskId> = indegree
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(invalid(format!("dependency cycle among {stuck:?}")));
    }

    Ok(())
}
