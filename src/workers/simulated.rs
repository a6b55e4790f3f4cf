//! In-memory chain for dry runs
//!
//! Plays the role of both the ledger and every worker capability, enforcing
//! the same preconditions the on-chain program does: one board per game,
//! randomize once, scores only after randomization, settle only after the
//! game ends, pay out once.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{
    BoardCreated, BoardWorker, NotificationKind, NotificationWorker, OracleWorker, PayoutReceipt,
    RandomizerWorker, RandomnessRequest, SettlementWorker, WinnerInfo,
};
use crate::domain::{BoardRef, GameId, GameScore, LedgerRecord, HEADER_COUNT, SQUARE_COUNT};
use crate::error::{LedgerError, WorkerError, WorkerResult};
use crate::ledger::{LedgerReader, RawBoardAccount};

/// Simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Squares pre-sold when a board is created
    pub seeded_players: usize,
    /// Price per square, in lamports
    pub square_price: u64,
    pub authority: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seeded_players: 40,
            square_price: 100_000_000,
            authority: "house".to_string(),
        }
    }
}

/// A notification captured by the simulated notifier
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: serde_json::Value,
}

/// Simulated board program plus worker agents
pub struct SimulatedChain {
    config: SimulationConfig,
    boards: RwLock<HashMap<GameId, LedgerRecord>>,
    notifications: Mutex<Vec<SentNotification>>,
}

fn signature() -> String {
    Uuid::new_v4().simple().to_string()
}

fn shuffled_digits() -> [u8; HEADER_COUNT] {
    let mut digits: [u8; HEADER_COUNT] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    digits.shuffle(&mut rand::thread_rng());
    digits
}

/// Touchdown / field goal style increments
fn quarter_points() -> u16 {
    const SCORES: [u16; 6] = [0, 3, 7, 7, 10, 14];
    SCORES[rand::thread_rng().gen_range(0..SCORES.len())]
}

fn seed_squares(record: &mut LedgerRecord, count: usize, price: u64) {
    let mut indices: Vec<usize> = (0..SQUARE_COUNT).collect();
    indices.shuffle(&mut rand::thread_rng());
    for (n, idx) in indices.into_iter().take(count.min(SQUARE_COUNT)).enumerate() {
        // a few players hold several squares
        record.squares[idx] = Some(format!("player-{}", n % 25));
        record.total_pot += price;
    }
}

impl SimulatedChain {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            boards: RwLock::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Install a record directly (test fixtures, replay)
    pub async fn insert_record(&self, record: LedgerRecord) {
        self.boards.write().await.insert(record.game_id, record);
    }

    pub async fn record(&self, game_id: GameId) -> Option<LedgerRecord> {
        self.boards.read().await.get(&game_id).cloned()
    }

    pub async fn notifications(&self) -> Vec<SentNotification> {
        self.notifications.lock().await.clone()
    }

    /// Buy one square; only allowed before the board is finalized
    pub async fn purchase_square(
        &self,
        game_id: GameId,
        index: usize,
        owner: &str,
    ) -> WorkerResult<()> {
        let mut boards = self.boards.write().await;
        let record = boards
            .get_mut(&game_id)
            .ok_or_else(|| WorkerError::NotFound(format!("board for game {game_id}")))?;
        if record.finalized {
            return Err(WorkerError::RemoteRejected("board is finalized".into()));
        }
        let square = record
            .squares
            .get_mut(index)
            .ok_or_else(|| WorkerError::RemoteRejected(format!("invalid square {index}")))?;
        if square.is_some() {
            return Err(WorkerError::RemoteRejected(format!(
                "square {index} already owned"
            )));
        }
        *square = Some(owner.to_string());
        record.total_pot += self.config.square_price;
        Ok(())
    }

    fn find_mut<'a>(
        boards: &'a mut HashMap<GameId, LedgerRecord>,
        board: &BoardRef,
    ) -> WorkerResult<&'a mut LedgerRecord> {
        boards
            .values_mut()
            .find(|record| &record.board_ref == board)
            .ok_or_else(|| WorkerError::NotFound(format!("board {board}")))
    }
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl LedgerReader for SimulatedChain {
    async fn fetch_board_record(&self, game_id: GameId) -> Result<RawBoardAccount, LedgerError> {
        self.boards
            .read()
            .await
            .get(&game_id)
            .map(RawBoardAccount::from)
            .ok_or(LedgerError::NotFound(game_id))
    }
}

#[async_trait]
impl BoardWorker for SimulatedChain {
    async fn create_board(&self, game_id: GameId) -> WorkerResult<BoardCreated> {
        let mut boards = self.boards.write().await;
        if let Some(existing) = boards.get(&game_id) {
            debug!(game_id, "board already exists");
            return Ok(BoardCreated {
                board_ref: existing.board_ref.clone(),
                tx_ref: String::new(),
            });
        }

        let mut record = LedgerRecord::empty(game_id);
        record.authority = self.config.authority.clone();
        seed_squares(
            &mut record,
            self.config.seeded_players,
            self.config.square_price,
        );
        let board_ref = record.board_ref.clone();
        info!(
            game_id,
            board = %board_ref,
            squares_sold = record.squares_sold(),
            "simulated board created"
        );
        boards.insert(game_id, record);

        Ok(BoardCreated {
            board_ref,
            tx_ref: signature(),
        })
    }
}

#[async_trait]
impl RandomizerWorker for SimulatedChain {
    async fn request_randomization(&self, board: &BoardRef) -> WorkerResult<RandomnessRequest> {
        let mut boards = self.boards.write().await;
        let record = Self::find_mut(&mut boards, board)?;
        if record.randomized {
            return Err(WorkerError::RemoteRejected("already randomized".into()));
        }

        record.finalized = true;
        record.randomized = true;
        record.home_headers = shuffled_digits();
        record.away_headers = shuffled_digits();
        info!(
            game_id = record.game_id,
            home = ?record.home_headers,
            away = ?record.away_headers,
            "simulated headers assigned"
        );

        Ok(RandomnessRequest {
            randomness_ref: format!("vrf-{}", signature()),
        })
    }
}

#[async_trait]
impl OracleWorker for SimulatedChain {
    /// Each poll advances the game: kickoff, then one quarter per poll, then the final whistle
    async fn fetch_scores(&self, game_id: GameId) -> WorkerResult<GameScore> {
        let mut boards = self.boards.write().await;
        let record = boards
            .get_mut(&game_id)
            .ok_or_else(|| WorkerError::NotFound(format!("board for game {game_id}")))?;
        if !record.randomized {
            return Err(WorkerError::RemoteRejected(
                "scores before randomization".into(),
            ));
        }

        if record.ended {
            return Ok(record.score);
        }

        if !record.started {
            record.started = true;
            record.score.quarter = 1;
        } else if record.score.quarter < 4 {
            record.score.quarter += 1;
        } else {
            record.ended = true;
            info!(game_id, score = ?record.score, "simulated game final");
            return Ok(record.score);
        }

        record.score.home_score += quarter_points();
        record.score.away_score += quarter_points();
        Ok(record.score)
    }
}

#[async_trait]
impl SettlementWorker for SimulatedChain {
    async fn settle_winner(&self, board: &BoardRef) -> WorkerResult<WinnerInfo> {
        let mut boards = self.boards.write().await;
        let record = Self::find_mut(&mut boards, board)?;
        if !record.ended {
            return Err(WorkerError::RemoteRejected("game has not ended".into()));
        }
        if record.winner.is_some() {
            return Err(WorkerError::RemoteRejected("winner already settled".into()));
        }

        let square_index = record
            .winning_square_index()
            .ok_or_else(|| WorkerError::RemoteRejected("headers not assigned".into()))?;
        let winner = record
            .winning_account()
            .ok_or_else(|| WorkerError::RemoteRejected("headers not assigned".into()))?;

        record.winner = Some(winner.clone());
        record.payout_amount = record.total_pot;

        Ok(WinnerInfo {
            winner,
            square_index,
            payout_amount: record.payout_amount,
            home_score: record.score.home_score,
            away_score: record.score.away_score,
            winning_digits: record.score.winning_digits(),
            tx_ref: signature(),
        })
    }

    async fn payout_winner(&self, board: &BoardRef, winner: &str) -> WorkerResult<PayoutReceipt> {
        let mut boards = self.boards.write().await;
        let record = Self::find_mut(&mut boards, board)?;
        let settled = record
            .winner
            .as_deref()
            .ok_or_else(|| WorkerError::RemoteRejected("no winner settled".into()))?;
        if settled != winner {
            return Err(WorkerError::Unauthorized(format!(
                "{winner} is not the settled winner"
            )));
        }
        if record.payout_amount == 0 {
            return Err(WorkerError::RemoteRejected("payout already sent".into()));
        }

        let amount = std::mem::take(&mut record.payout_amount);
        Ok(PayoutReceipt {
            recipient: winner.to_string(),
            amount,
            tx_ref: signature(),
        })
    }
}

#[async_trait]
impl NotificationWorker for SimulatedChain {
    async fn send_notification(
        &self,
        kind: NotificationKind,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> WorkerResult<bool> {
        debug!(kind = kind.as_str(), recipient, "simulated notification");
        self.notifications.lock().await.push(SentNotification {
            kind,
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{resolve, GameLifecycleStage};
    use crate::ledger::normalize;

    async fn stage(chain: &SimulatedChain, game_id: GameId) -> GameLifecycleStage {
        let raw = chain.fetch_board_record(game_id).await.unwrap();
        resolve(&normalize(game_id, raw).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_board_is_idempotent() {
        let chain = SimulatedChain::default();
        let first = chain.create_board(1).await.unwrap();
        let sold = chain.record(1).await.unwrap().squares_sold();
        let second = chain.create_board(1).await.unwrap();

        assert_eq!(first.board_ref, second.board_ref);
        assert_eq!(chain.record(1).await.unwrap().squares_sold(), sold);
        assert_eq!(sold, 40);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let chain = SimulatedChain::default();
        let board = chain.create_board(5).await.unwrap().board_ref;
        assert_eq!(stage(&chain, 5).await, GameLifecycleStage::Created);

        assert!(matches!(
            chain.fetch_scores(5).await,
            Err(WorkerError::RemoteRejected(_))
        ));

        chain.request_randomization(&board).await.unwrap();
        assert_eq!(stage(&chain, 5).await, GameLifecycleStage::Randomized);
        assert!(chain.request_randomization(&board).await.is_err());

        chain.fetch_scores(5).await.unwrap();
        assert_eq!(stage(&chain, 5).await, GameLifecycleStage::Started);
        assert!(chain.settle_winner(&board).await.is_err());

        for _ in 0..4 {
            chain.fetch_scores(5).await.unwrap();
        }
        assert_eq!(stage(&chain, 5).await, GameLifecycleStage::Ended);

        let info = chain.settle_winner(&board).await.unwrap();
        assert_eq!(stage(&chain, 5).await, GameLifecycleStage::Settled);
        let record = chain.record(5).await.unwrap();
        assert_eq!(Some(info.square_index), record.winning_square_index());
        assert_eq!(info.payout_amount, record.total_pot);
        assert!(record.payout_pending());

        assert!(matches!(
            chain.payout_winner(&board, "mallory").await,
            Err(WorkerError::Unauthorized(_))
        ));
        let receipt = chain.payout_winner(&board, &info.winner).await.unwrap();
        assert_eq!(receipt.amount, info.payout_amount);
        assert!(!chain.record(5).await.unwrap().payout_pending());
        assert!(chain.payout_winner(&board, &info.winner).await.is_err());
    }

    #[tokio::test]
    async fn test_purchase_square_rules() {
        let chain = SimulatedChain::new(SimulationConfig {
            seeded_players: 0,
            ..Default::default()
        });
        assert!(chain.purchase_square(2, 0, "alice").await.is_err());

        let board = chain.create_board(2).await.unwrap().board_ref;
        chain.purchase_square(2, 0, "alice").await.unwrap();
        assert!(chain.purchase_square(2, 0, "bob").await.is_err());
        assert!(chain.purchase_square(2, 100, "bob").await.is_err());

        chain.request_randomization(&board).await.unwrap();
        assert!(matches!(
            chain.purchase_square(2, 1, "bob").await,
            Err(WorkerError::RemoteRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_board_is_not_found() {
        let chain = SimulatedChain::default();
        assert_eq!(
            chain.fetch_board_record(9).await,
            Err(LedgerError::NotFound(9))
        );
        assert!(matches!(
            chain.settle_winner(&BoardRef::derive(9)).await,
            Err(WorkerError::NotFound(_))
        ));
    }
}
