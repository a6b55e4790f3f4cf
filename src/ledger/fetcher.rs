//! StateFetcher: reads and normalizes board records

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    resolve, BoardRef, GameId, GameLifecycleStage, GameScore, LedgerRecord, HEADER_COUNT,
    HEADER_UNSET, SQUARE_COUNT, SYSTEM_ADDRESS,
};
use crate::error::LedgerError;

/// Board account exactly as the indexer publishes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBoardAccount {
    pub game_id: GameId,
    #[serde(default)]
    pub board_pda: Option<String>,
    pub authority: String,
    pub finalized: bool,
    pub randomized: bool,
    pub game_started: bool,
    pub game_ended: bool,
    pub winner: String,
    pub payout_amount: u64,
    pub total_pot: u64,
    pub home_score: u16,
    pub away_score: u16,
    pub quarter: u8,
    pub squares: Vec<String>,
    pub home_headers: Vec<u8>,
    pub away_headers: Vec<u8>,
}

impl From<&LedgerRecord> for RawBoardAccount {
    fn from(record: &LedgerRecord) -> Self {
        let address = |owner: &Option<String>| {
            owner.clone().unwrap_or_else(|| SYSTEM_ADDRESS.to_string())
        };
        Self {
            game_id: record.game_id,
            board_pda: Some(record.board_ref.0.clone()),
            authority: record.authority.clone(),
            finalized: record.finalized,
            randomized: record.randomized,
            game_started: record.started,
            game_ended: record.ended,
            winner: address(&record.winner),
            payout_amount: record.payout_amount,
            total_pot: record.total_pot,
            home_score: record.score.home_score,
            away_score: record.score.away_score,
            quarter: record.score.quarter,
            squares: record.squares.iter().map(address).collect(),
            home_headers: record.home_headers.to_vec(),
            away_headers: record.away_headers.to_vec(),
        }
    }
}

/// Source of raw board accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Fetch the board account for a game; `LedgerError::NotFound` if no board exists
    async fn fetch_board_record(&self, game_id: GameId) -> Result<RawBoardAccount, LedgerError>;
}

fn account(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == SYSTEM_ADDRESS {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn headers(side: &str, raw: &[u8], randomized: bool) -> Result<[u8; HEADER_COUNT], LedgerError> {
    let arr: [u8; HEADER_COUNT] = raw.try_into().map_err(|_| {
        LedgerError::Malformed(format!(
            "{side} headers: expected {HEADER_COUNT} entries, got {}",
            raw.len()
        ))
    })?;

    if randomized {
        let mut seen = [false; HEADER_COUNT];
        for digit in arr {
            let slot = seen.get_mut(digit as usize).ok_or_else(|| {
                LedgerError::Malformed(format!("{side} headers: digit {digit} after randomization"))
            })?;
            if *slot {
                return Err(LedgerError::Malformed(format!(
                    "{side} headers: digit {digit} repeated"
                )));
            }
            *slot = true;
        }
    } else if let Some(bad) = arr.iter().find(|d| **d > HEADER_UNSET) {
        return Err(LedgerError::Malformed(format!(
            "{side} headers: value {bad} out of range"
        )));
    }

    Ok(arr)
}

/// Normalize a raw account into a [`LedgerRecord`].
///
/// Flags are copied verbatim; lifecycle legality is judged later by
/// [`resolve`], never corrected here.
pub fn normalize(expected: GameId, raw: RawBoardAccount) -> Result<LedgerRecord, LedgerError> {
    if raw.game_id != expected {
        return Err(LedgerError::Malformed(format!(
            "requested game {expected}, ledger returned game {}",
            raw.game_id
        )));
    }
    if raw.squares.len() != SQUARE_COUNT {
        return Err(LedgerError::Malformed(format!(
            "expected {SQUARE_COUNT} squares, got {}",
            raw.squares.len()
        )));
    }

    let home_headers = headers("home", &raw.home_headers, raw.randomized)?;
    let away_headers = headers("away", &raw.away_headers, raw.randomized)?;

    Ok(LedgerRecord {
        game_id: raw.game_id,
        board_ref: raw
            .board_pda
            .as_deref()
            .and_then(account)
            .map(BoardRef)
            .unwrap_or_else(|| BoardRef::derive(raw.game_id)),
        authority: raw.authority,
        finalized: raw.finalized,
        randomized: raw.randomized,
        started: raw.game_started,
        ended: raw.game_ended,
        winner: account(&raw.winner),
        payout_amount: raw.payout_amount,
        total_pot: raw.total_pot,
        score: GameScore {
            home_score: raw.home_score,
            away_score: raw.away_score,
            quarter: raw.quarter,
        },
        squares: raw.squares.iter().map(|s| account(s)).collect(),
        home_headers,
        away_headers,
    })
}

/// Point-in-time board view sent to observers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(flatten)]
    pub record: LedgerRecord,
    /// `None` when the flags are illegal and no stage can be derived
    pub stage: Option<GameLifecycleStage>,
    pub squares_sold: usize,
    pub players_count: usize,
    pub last_updated: i64,
}

/// Reads the current ledger record for a game and normalizes it
#[derive(Clone)]
pub struct StateFetcher {
    reader: Arc<dyn LedgerReader>,
}

impl StateFetcher {
    pub fn new(reader: Arc<dyn LedgerReader>) -> Self {
        Self { reader }
    }

    pub async fn fetch(&self, game_id: GameId) -> Result<LedgerRecord, LedgerError> {
        let raw = self.reader.fetch_board_record(game_id).await?;
        let record = normalize(game_id, raw)?;
        debug!(
            game_id,
            squares_sold = record.squares_sold(),
            randomized = record.randomized,
            started = record.started,
            ended = record.ended,
            "board record fetched"
        );
        Ok(record)
    }

    pub async fn snapshot(&self, game_id: GameId) -> Result<BoardSnapshot, LedgerError> {
        let record = self.fetch(game_id).await?;
        Ok(BoardSnapshot {
            stage: resolve(&record).ok(),
            squares_sold: record.squares_sold(),
            players_count: record.player_count(),
            last_updated: Utc::now().timestamp_millis(),
            record,
        })
    }
}
