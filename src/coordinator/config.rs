//! Coordinator Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::GameId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Fixed planning tick (ms)
    pub tick_interval_ms: u64,
    /// Game ids driven by the coordinator
    pub games: Vec<GameId>,
    /// Plan board creation for tracked games with no ledger record
    pub auto_create_boards: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            games: Vec::new(),
            auto_create_boards: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
