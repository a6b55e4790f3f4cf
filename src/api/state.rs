use chrono::{DateTime, Utc};

use crate::hub::BroadcastHub;
use crate::store::GameStore;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
    /// Tracked games, read-only from the API side
    pub games: GameStore,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(hub: BroadcastHub, games: GameStore) -> Self {
        Self {
            hub,
            games,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
