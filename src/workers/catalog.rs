//! Closed catalog of worker operations
//!
//! Every task the planner may emit maps to exactly one [`WorkerCall`]
//! variant. Capability/action names coming from outside (advisory plans,
//! the HTTP gateway) are resolved against [`CATALOG`] before a plan is
//! accepted, so unknown combinations never reach dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::traits::{
    BoardCreated, NotificationKind, PayoutReceipt, RandomnessRequest, WinnerInfo, WorkerSet,
};
use crate::domain::{BoardRef, GameId, GameScore};
use crate::error::WorkerResult;

/// Worker capability provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Board,
    Randomizer,
    Oracle,
    Winner,
    Notification,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Randomizer => "randomizer",
            Self::Oracle => "oracle",
            Self::Winner => "winner",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "board" => Ok(Self::Board),
            "randomizer" => Ok(Self::Randomizer),
            "oracle" => Ok(Self::Oracle),
            "winner" | "settlement" => Ok(Self::Winner),
            "notification" | "notifier" => Ok(Self::Notification),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// Named operation on a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateBoard,
    RequestRandomization,
    FetchScores,
    SettleWinner,
    PayoutWinner,
    SendNotification,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBoard => "create_board",
            Self::RequestRandomization => "request_randomization",
            Self::FetchScores => "fetch_scores",
            Self::SettleWinner => "settle_winner",
            Self::PayoutWinner => "payout_winner",
            Self::SendNotification => "send_notification",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts both `snake_case` and `camelCase` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "createboard" => Ok(Self::CreateBoard),
            "requestrandomization" => Ok(Self::RequestRandomization),
            "fetchscores" => Ok(Self::FetchScores),
            "settlewinner" => Ok(Self::SettleWinner),
            "payoutwinner" => Ok(Self::PayoutWinner),
            "sendnotification" => Ok(Self::SendNotification),
            _ => Err(format!("unknown action: {}", s.trim())),
        }
    }
}

/// One (capability, action) pair the executor knows how to dispatch
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogEntry {
    pub capability: Capability,
    pub action: Action,
    /// Safe to repeat with the same arguments
    pub idempotent: bool,
    pub description: &'static str,
}

pub const CATALOG: [CatalogEntry; 6] = [
    CatalogEntry {
        capability: Capability::Board,
        action: Action::CreateBoard,
        idempotent: true,
        description: "Create the squares board for a game id; returns the existing board if present",
    },
    CatalogEntry {
        capability: Capability::Randomizer,
        action: Action::RequestRandomization,
        idempotent: false,
        description: "Request verifiable randomness to assign the row and column digits",
    },
    CatalogEntry {
        capability: Capability::Oracle,
        action: Action::FetchScores,
        idempotent: true,
        description: "Fetch the latest score and quarter and write it to the board",
    },
    CatalogEntry {
        capability: Capability::Winner,
        action: Action::SettleWinner,
        idempotent: false,
        description: "Settle the winning square once the game has ended",
    },
    CatalogEntry {
        capability: Capability::Winner,
        action: Action::PayoutWinner,
        idempotent: false,
        description: "Transfer the pot to the settled winner",
    },
    CatalogEntry {
        capability: Capability::Notification,
        action: Action::SendNotification,
        idempotent: true,
        description: "Send a templated notification (numbers_assigned, game_started, score_update, winner_announced, payout_sent)",
    },
];

/// Resolve a pair against the catalog; `None` for combinations that do not exist
pub fn lookup(capability: Capability, action: Action) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.capability == capability && entry.action == action)
}

/// A fully-typed worker invocation
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCall {
    CreateBoard {
        game_id: GameId,
    },
    RequestRandomization {
        board: BoardRef,
    },
    FetchScores {
        game_id: GameId,
    },
    SettleWinner {
        board: BoardRef,
    },
    PayoutWinner {
        board: BoardRef,
        winner: String,
    },
    SendNotification {
        kind: NotificationKind,
        recipient: String,
        payload: Value,
    },
}

impl WorkerCall {
    pub fn capability(&self) -> Capability {
        match self {
            Self::CreateBoard { .. } => Capability::Board,
            Self::RequestRandomization { .. } => Capability::Randomizer,
            Self::FetchScores { .. } => Capability::Oracle,
            Self::SettleWinner { .. } | Self::PayoutWinner { .. } => Capability::Winner,
            Self::SendNotification { .. } => Capability::Notification,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::CreateBoard { .. } => Action::CreateBoard,
            Self::RequestRandomization { .. } => Action::RequestRandomization,
            Self::FetchScores { .. } => Action::FetchScores,
            Self::SettleWinner { .. } => Action::SettleWinner,
            Self::PayoutWinner { .. } => Action::PayoutWinner,
            Self::SendNotification { .. } => Action::SendNotification,
        }
    }

    /// `capability.action`, the key used by the retry whitelist
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.capability(), self.action())
    }

    /// Default task name; notifications are named after their template
    pub fn default_task_id(&self) -> String {
        match self {
            Self::SendNotification { kind, .. } => format!("notification.{}", kind.as_str()),
            other => other.qualified_name(),
        }
    }

    /// Wire arguments (camelCase JSON)
    pub fn arguments(&self) -> Value {
        match self {
            Self::CreateBoard { game_id } | Self::FetchScores { game_id } => {
                json!({ "gameId": game_id })
            }
            Self::RequestRandomization { board } | Self::SettleWinner { board } => {
                json!({ "boardRef": board })
            }
            Self::PayoutWinner { board, winner } => {
                json!({ "boardRef": board, "winner": winner })
            }
            Self::SendNotification {
                kind,
                recipient,
                payload,
            } => json!({ "kind": kind, "recipient": recipient, "payload": payload }),
        }
    }
}

/// Typed result of a dispatched [`WorkerCall`]
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    BoardCreated(BoardCreated),
    Randomness(RandomnessRequest),
    Score(GameScore),
    Winner(WinnerInfo),
    Payout(PayoutReceipt),
    Notified(bool),
}

impl WorkerOutput {
    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::BoardCreated(v) => serde_json::to_value(v),
            Self::Randomness(v) => serde_json::to_value(v),
            Self::Score(v) => serde_json::to_value(v),
            Self::Winner(v) => serde_json::to_value(v),
            Self::Payout(v) => serde_json::to_value(v),
            Self::Notified(delivered) => Ok(json!({ "delivered": delivered })),
        };
        value.unwrap_or(Value::Null)
    }
}

impl WorkerSet {
    /// Route a call to the provider owning its capability
    pub async fn dispatch(&self, call: &WorkerCall) -> WorkerResult<WorkerOutput> {
        match call {
            WorkerCall::CreateBoard { game_id } => self
                .board
                .create_board(*game_id)
                .await
                .map(WorkerOutput::BoardCreated),
            WorkerCall::RequestRandomization { board } => self
                .randomizer
                .request_randomization(board)
                .await
                .map(WorkerOutput::Randomness),
            WorkerCall::FetchScores { game_id } => self
                .oracle
                .fetch_scores(*game_id)
                .await
                .map(WorkerOutput::Score),
            WorkerCall::SettleWinner { board } => self
                .settlement
                .settle_winner(board)
                .await
                .map(WorkerOutput::Winner),
            WorkerCall::PayoutWinner { board, winner } => self
                .settlement
                .payout_winner(board, winner)
                .await
                .map(WorkerOutput::Payout),
            WorkerCall::SendNotification {
                kind,
                recipient,
                payload,
            } => self
                .notification
                .send_notification(*kind, recipient, payload)
                .await
                .map(WorkerOutput::Notified),
        }
    }
}
