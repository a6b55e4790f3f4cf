//! Core traits for worker capabilities

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{BoardRef, GameId, GameScore};
use crate::error::WorkerResult;

/// Result of `createBoard`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCreated {
    pub board_ref: BoardRef,
    pub tx_ref: String,
}

/// Result of `requestRandomization`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomnessRequest {
    pub randomness_ref: String,
}

/// Result of `settleWinner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerInfo {
    pub winner: String,
    pub square_index: usize,
    pub payout_amount: u64,
    pub home_score: u16,
    pub away_score: u16,
    /// Last digits of (home, away)
    pub winning_digits: (u8, u8),
    pub tx_ref: String,
}

/// Result of `payoutWinner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub recipient: String,
    pub amount: u64,
    pub tx_ref: String,
}

/// Templates understood by the notification agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NumbersAssigned,
    GameStarted,
    ScoreUpdate,
    WinnerAnnounced,
    PayoutSent,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NumbersAssigned => "numbers_assigned",
            Self::GameStarted => "game_started",
            Self::ScoreUpdate => "score_update",
            Self::WinnerAnnounced => "winner_announced",
            Self::PayoutSent => "payout_sent",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "numbers_assigned" => Ok(Self::NumbersAssigned),
            "game_started" => Ok(Self::GameStarted),
            "score_update" => Ok(Self::ScoreUpdate),
            "winner_announced" => Ok(Self::WinnerAnnounced),
            "payout_sent" => Ok(Self::PayoutSent),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// Board agent. `create_board` must be safe to repeat for the same game id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BoardWorker: Send + Sync {
    async fn create_board(&self, game_id: GameId) -> WorkerResult<BoardCreated>;
}

/// Randomizer agent (VRF-backed header assignment)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RandomizerWorker: Send + Sync {
    async fn request_randomization(&self, board: &BoardRef) -> WorkerResult<RandomnessRequest>;
}

/// Oracle agent (score feed)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OracleWorker: Send + Sync {
    async fn fetch_scores(&self, game_id: GameId) -> WorkerResult<GameScore>;
}

/// Winner settlement agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementWorker: Send + Sync {
    async fn settle_winner(&self, board: &BoardRef) -> WorkerResult<WinnerInfo>;

    async fn payout_winner(&self, board: &BoardRef, winner: &str) -> WorkerResult<PayoutReceipt>;
}

/// Notification agent; returns whether the message was accepted for delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationWorker: Send + Sync {
    async fn send_notification(
        &self,
        kind: NotificationKind,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> WorkerResult<bool>;
}

/// The full set of capability providers the executor dispatches to
#[derive(Clone)]
pub struct WorkerSet {
    pub board: Arc<dyn BoardWorker>,
    pub randomizer: Arc<dyn RandomizerWorker>,
    pub oracle: Arc<dyn OracleWorker>,
    pub settlement: Arc<dyn SettlementWorker>,
    pub notification: Arc<dyn NotificationWorker>,
}

impl WorkerSet {
    /// Use one provider for every capability
    pub fn uniform<W>(worker: Arc<W>) -> Self
    where
        W: BoardWorker
            + RandomizerWorker
            + OracleWorker
            + SettlementWorker
            + NotificationWorker
            + 'static,
    {
        Self {
            board: worker.clone(),
            randomizer: worker.clone(),
            oracle: worker.clone(),
            settlement: worker.clone(),
            notification: worker,
        }
    }
}
