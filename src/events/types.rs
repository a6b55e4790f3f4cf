use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::{GameId, GameLifecycleStage};
use crate::error::TaskDispatchError;

/// Event type name, the bus routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BoardUpdate,
    ScoreUpdate,
    WinnerAnnounced,
    SquarePurchased,
    TaskCompleted,
    TaskError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::BoardUpdate,
        EventKind::ScoreUpdate,
        EventKind::WinnerAnnounced,
        EventKind::SquarePurchased,
        EventKind::TaskCompleted,
        EventKind::TaskError,
    ];

    /// Event classes delivered to websocket observers
    pub const CLIENT_FACING: [EventKind; 4] = [
        EventKind::BoardUpdate,
        EventKind::ScoreUpdate,
        EventKind::WinnerAnnounced,
        EventKind::SquarePurchased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BoardUpdate => "board_update",
            Self::ScoreUpdate => "score_update",
            Self::WinnerAnnounced => "winner_announced",
            Self::SquarePurchased => "square_purchased",
            Self::TaskCompleted => "task_completed",
            Self::TaskError => "task_error",
        }
    }

    pub fn is_client_facing(&self) -> bool {
        Self::CLIENT_FACING.contains(self)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| format!("unknown event class: {key}"))
    }
}

/// Immutable, fire-and-forget domain event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub game_id: GameId,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, game_id: GameId, payload: Value) -> Self {
        Self {
            kind,
            game_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn stage_changed(
        game_id: GameId,
        stage: GameLifecycleStage,
        previous: Option<GameLifecycleStage>,
    ) -> Self {
        Self::new(
            EventKind::BoardUpdate,
            game_id,
            json!({ "stage": stage, "previousStage": previous }),
        )
    }

    pub fn square_purchased(game_id: GameId, square_index: usize, owner: &str) -> Self {
        Self::new(
            EventKind::SquarePurchased,
            game_id,
            json!({ "squareIndex": square_index, "owner": owner }),
        )
    }

    pub fn task_completed(game_id: GameId, task: &str, attempts: u32, result: Value) -> Self {
        Self::new(
            EventKind::TaskCompleted,
            game_id,
            json!({ "task": task, "attempts": attempts, "result": result }),
        )
    }

    pub fn task_error(game_id: GameId, error: &TaskDispatchError, will_retry: bool) -> Self {
        Self::new(
            EventKind::TaskError,
            game_id,
            json!({
                "task": error.task,
                "attempts": error.attempts,
                "error": error.source.to_string(),
                "willRetry": will_retry,
            }),
        )
    }

    pub fn task_dropped(game_id: GameId, task: &str, deferrals: u32) -> Self {
        Self::new(
            EventKind::TaskError,
            game_id,
            json!({
                "task": task,
                "attempts": 0,
                "error": format!("dependencies unresolved after {deferrals} cycles"),
                "willRetry": false,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("touchdown".parse::<EventKind>().is_err());
        assert!(EventKind::WinnerAnnounced.is_client_facing());
        assert!(!EventKind::TaskError.is_client_facing());
    }

    #[test]
    fn test_task_error_payload() {
        let err = TaskDispatchError {
            task: "notification.game_started".into(),
            attempts: 1,
            source: WorkerError::Timeout { elapsed_ms: 30 },
        };
        let event = DomainEvent::task_error(4, &err, true);
        assert_eq!(event.kind, EventKind::TaskError);
        assert_eq!(event.payload["task"], "notification.game_started");
        assert_eq!(event.payload["willRetry"], true);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_error");
        assert_eq!(json["gameId"], 4);
    }
}
