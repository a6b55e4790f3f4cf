use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::state::AppState;
use crate::hub::HubStats;
use crate::store::GameSummary;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub hub: HubStats,
    pub games: Vec<GameSummary>,
}

/// GET /health -- liveness probe with hub and game overview
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_seconds(),
        hub: state.hub.stats().await,
        games: state.games.summaries().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::hub::{BroadcastHub, HubConfig};
    use crate::ledger::StateFetcher;
    use crate::store::GameStore;
    use crate::workers::SimulatedChain;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let games = GameStore::with_games([3]);
        let fetcher = StateFetcher::new(Arc::new(SimulatedChain::default()));
        AppState::new(
            BroadcastHub::new(HubConfig::default(), fetcher, games.clone()),
            games,
        )
    }

    #[tokio::test]
    async fn test_health_reports_hub_and_games() {
        let state = state();
        let (_id, _rx) = state.hub.connect().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["hub"]["connectedClients"], 1);
        assert_eq!(json["games"][0]["gameId"], 3);
        assert_eq!(json["games"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let app = create_router(state());
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
