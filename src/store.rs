//! Tracked-game registry
//!
//! Explicitly constructed and injected into the coordinator (writer) and the
//! broadcast hub (reader). Holds the last observed record and derived stage
//! per game so each tick can diff against the previous one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{GameId, GameLifecycleStage, LedgerRecord};

#[derive(Debug, Clone, Default)]
pub struct GameEntry {
    /// Last successfully derived stage; retained across illegal records
    pub stage: Option<GameLifecycleStage>,
    pub last_record: Option<LedgerRecord>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row in the `game_list` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: GameId,
    /// Stage name, or `pending` before a board exists
    pub status: String,
    pub players_count: usize,
    pub squares_sold: usize,
    pub total_pot: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone, Default)]
pub struct GameStore {
    games: Arc<RwLock<BTreeMap<GameId, GameEntry>>>,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_games(ids: impl IntoIterator<Item = GameId>) -> Self {
        let games = ids
            .into_iter()
            .map(|id| (id, GameEntry::default()))
            .collect();
        Self {
            games: Arc::new(RwLock::new(games)),
        }
    }

    /// Start tracking a game; no-op if already tracked
    pub async fn track(&self, game_id: GameId) {
        self.games.write().await.entry(game_id).or_default();
    }

    pub async fn tracked(&self) -> Vec<GameId> {
        self.games.read().await.keys().copied().collect()
    }

    pub async fn get(&self, game_id: GameId) -> Option<GameEntry> {
        self.games.read().await.get(&game_id).cloned()
    }

    /// Store a record whose stage derived cleanly and whose diff was published
    pub async fn observe(&self, game_id: GameId, record: LedgerRecord, stage: GameLifecycleStage) {
        let mut games = self.games.write().await;
        let entry = games.entry(game_id).or_default();
        entry.stage = Some(stage);
        entry.last_record = Some(record);
        entry.last_error = None;
        entry.updated_at = Some(Utc::now());
    }

    /// Note a failure; stage and last record are left as they were
    pub async fn record_error(&self, game_id: GameId, error: String) {
        let mut games = self.games.write().await;
        let entry = games.entry(game_id).or_default();
        entry.last_error = Some(error);
        entry.updated_at = Some(Utc::now());
    }

    pub async fn summaries(&self) -> Vec<GameSummary> {
        self.games
            .read()
            .await
            .iter()
            .map(|(game_id, entry)| {
                let record = entry.last_record.as_ref();
                GameSummary {
                    game_id: *game_id,
                    status: entry
                        .stage
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "pending".to_string()),
                    players_count: record.map(LedgerRecord::player_count).unwrap_or(0),
                    squares_sold: record.map(LedgerRecord::squares_sold).unwrap_or(0),
                    total_pot: record.map(|r| r.total_pot).unwrap_or(0),
                    last_error: entry.last_error.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_keeps_stage_and_record() {
        let store = GameStore::with_games([1]);
        store
            .observe(1, LedgerRecord::empty(1), GameLifecycleStage::Created)
            .await;
        store.record_error(1, "illegal flags".into()).await;

        let entry = store.get(1).await.unwrap();
        assert_eq!(entry.stage, Some(GameLifecycleStage::Created));
        assert_eq!(entry.last_record, Some(LedgerRecord::empty(1)));
        assert_eq!(entry.last_error.as_deref(), Some("illegal flags"));

        let json = serde_json::to_value(&store.summaries().await[0]).unwrap();
        assert_eq!(json["lastError"], "illegal flags");

        store
            .observe(1, LedgerRecord::empty(1), GameLifecycleStage::Created)
            .await;
        assert!(store.get(1).await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_summaries_report_pending_games() {
        let store = GameStore::with_games([2, 1]);
        let mut record = LedgerRecord::empty(1);
        record.squares[0] = Some("alice".into());
        store
            .observe(1, record, GameLifecycleStage::Created)
            .await;

        let games = store.summaries().await;
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].status, "created");
        assert_eq!(games[0].players_count, 1);
        assert_eq!(games[1].status, "pending");

        let json = serde_json::to_value(&games[1]).unwrap();
        assert_eq!(json["gameId"], 2);
        assert_eq!(json["playersCount"], 0);
        assert!(json.get("lastError").is_none());
    }
}
