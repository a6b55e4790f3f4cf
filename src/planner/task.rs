//! Plan and task types

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::domain::{BoardRef, GameId, GameLifecycleStage, GameScore, LedgerRecord};
use crate::workers::WorkerCall;

pub type TaskId = String;

/// Dispatch priority in `[1, 10]`; higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Build from a table constant, clamping into range
    pub const fn of(value: u8) -> Self {
        if value < Self::MIN {
            Self(Self::MIN)
        } else if value > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(value)
        }
    }

    /// Strict conversion for untrusted input
    pub fn checked(value: i64) -> Option<Self> {
        (i64::from(Self::MIN)..=i64::from(Self::MAX))
            .contains(&value)
            .then(|| Self(value as u8))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

/// One unit of work for a worker capability
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub call: WorkerCall,
    pub priority: Priority,
    /// Task ids that must succeed earlier in the same cycle
    pub dependencies: BTreeSet<TaskId>,
}

impl Task {
    pub fn new(call: WorkerCall, priority: Priority) -> Self {
        Self {
            id: call.default_task_id(),
            call,
            priority,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Serialize)]
struct TaskView<'a> {
    id: &'a str,
    capability: &'static str,
    action: &'static str,
    arguments: Value,
    priority: u8,
    dependencies: &'a BTreeSet<TaskId>,
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaskView {
            id: &self.id,
            capability: self.call.capability().as_str(),
            action: self.call.action().as_str(),
            arguments: self.call.arguments(),
            priority: self.priority.get(),
            dependencies: &self.dependencies,
        }
        .serialize(serializer)
    }
}

/// Task as proposed by the advisory planner, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTask {
    #[serde(default)]
    pub id: Option<String>,
    pub capability: String,
    pub action: String,
    #[serde(default)]
    pub arguments: Value,
    pub priority: i64,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Inputs available to both planning strategies
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningContext {
    pub game_id: GameId,
    /// `None` while no board exists for the game
    pub stage: Option<GameLifecycleStage>,
    pub previous_stage: Option<GameLifecycleStage>,
    pub board_ref: BoardRef,
    pub player_count: usize,
    pub squares_sold: usize,
    pub score: GameScore,
    pub total_pot: u64,
    pub payout_pending: bool,
    pub winner: Option<String>,
}

impl PlanningContext {
    pub fn from_record(
        record: &LedgerRecord,
        stage: GameLifecycleStage,
        previous_stage: Option<GameLifecycleStage>,
    ) -> Self {
        Self {
            game_id: record.game_id,
            stage: Some(stage),
            previous_stage,
            board_ref: record.board_ref.clone(),
            player_count: record.player_count(),
            squares_sold: record.squares_sold(),
            score: record.score,
            total_pot: record.total_pot,
            payout_pending: record.payout_pending(),
            winner: record.winner.clone(),
        }
    }

    /// Context for a tracked game whose board has not been created yet
    pub fn unbootstrapped(game_id: GameId) -> Self {
        Self {
            game_id,
            stage: None,
            previous_stage: None,
            board_ref: BoardRef::derive(game_id),
            player_count: 0,
            squares_sold: 0,
            score: GameScore::default(),
            total_pot: 0,
            payout_pending: false,
            winner: None,
        }
    }

    /// True on the first cycle that observes the current stage
    pub fn entered_stage(&self) -> bool {
        self.stage != self.previous_stage
    }

    /// Channel that reaches every player on this board
    pub fn broadcast_recipient(&self) -> String {
        format!("game:{}", self.game_id)
    }

    pub fn notification_payload(&self) -> Value {
        json!({
            "gameId": self.game_id,
            "stage": self.stage,
            "homeScore": self.score.home_score,
            "awayScore": self.score.away_score,
            "quarter": self.score.quarter,
            "totalPot": self.total_pot,
            "playersCount": self.player_count,
            "winner": self.winner,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Advisory,
    Fallback,
}

/// A validated task list for one game and one cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub game_id: GameId,
    pub stage: Option<GameLifecycleStage>,
    pub source: PlanSource,
    pub tasks: Vec<Task>,
}
