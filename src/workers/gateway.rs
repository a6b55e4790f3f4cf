//! HTTP worker gateway
//!
//! Reaches every capability over `POST {base_url}/{capability}/{action}` with
//! the call arguments as the JSON body.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::catalog::WorkerCall;
use super::traits::{
    BoardCreated, BoardWorker, NotificationKind, NotificationWorker, OracleWorker, PayoutReceipt,
    RandomizerWorker, RandomnessRequest, SettlementWorker, WinnerInfo,
};
use crate::domain::{BoardRef, GameId, GameScore};
use crate::error::{OrchestratorError, Result, WorkerError, WorkerResult};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Delivery {
    delivered: bool,
}

pub struct HttpWorkerGateway {
    config: GatewayConfig,
    http: Client,
}

/// Map a non-success status onto the worker error taxonomy
fn status_error(status: StatusCode, body: String, elapsed_ms: u64) -> WorkerError {
    match status {
        StatusCode::NOT_FOUND => WorkerError::NotFound(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => WorkerError::Unauthorized(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            WorkerError::Timeout { elapsed_ms }
        }
        _ => WorkerError::RemoteRejected(format!("{status}: {body}")),
    }
}

impl HttpWorkerGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, call: &WorkerCall) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            call.capability(),
            call.action()
        )
    }

    async fn invoke<T: DeserializeOwned>(&self, call: WorkerCall) -> WorkerResult<T> {
        let url = self.endpoint(&call);
        let started = Instant::now();
        debug!(task = %call.qualified_name(), %url, "dispatching to worker gateway");

        let response = self
            .http
            .post(&url)
            .json(&call.arguments())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WorkerError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    WorkerError::RemoteRejected(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(task = %call.qualified_name(), %status, "worker gateway error: {}", body);
            return Err(status_error(
                status,
                body,
                started.elapsed().as_millis() as u64,
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| WorkerError::RemoteRejected(format!("invalid worker response: {e}")))
    }
}

#[async_trait]
impl BoardWorker for HttpWorkerGateway {
    async fn create_board(&self, game_id: GameId) -> WorkerResult<BoardCreated> {
        self.invoke(WorkerCall::CreateBoard { game_id }).await
    }
}

#[async_trait]
impl RandomizerWorker for HttpWorkerGateway {
    async fn request_randomization(&self, board: &BoardRef) -> WorkerResult<RandomnessRequest> {
        self.invoke(WorkerCall::RequestRandomization {
            board: board.clone(),
        })
        .await
    }
}

#[async_trait]
impl OracleWorker for HttpWorkerGateway {
    async fn fetch_scores(&self, game_id: GameId) -> WorkerResult<GameScore> {
        self.invoke(WorkerCall::FetchScores { game_id }).await
    }
}

#[async_trait]
impl SettlementWorker for HttpWorkerGateway {
    async fn settle_winner(&self, board: &BoardRef) -> WorkerResult<WinnerInfo> {
        self.invoke(WorkerCall::SettleWinner {
            board: board.clone(),
        })
        .await
    }

    async fn payout_winner(&self, board: &BoardRef, winner: &str) -> WorkerResult<PayoutReceipt> {
        self.invoke(WorkerCall::PayoutWinner {
            board: board.clone(),
            winner: winner.to_string(),
        })
        .await
    }
}

#[async_trait]
impl NotificationWorker for HttpWorkerGateway {
    async fn send_notification(
        &self,
        kind: NotificationKind,
        recipient: &str,
        payload: &serde_json::Value,
    ) -> WorkerResult<bool> {
        let delivery: Delivery = self
            .invoke(WorkerCall::SendNotification {
                kind,
                recipient: recipient.to_string(),
                payload: payload.clone(),
            })
            .await?;
        Ok(delivery.delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "no board".into(), 5),
            WorkerError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, String::new(), 5),
            WorkerError::Unauthorized(_)
        ));
        assert_eq!(
            status_error(StatusCode::GATEWAY_TIMEOUT, String::new(), 42),
            WorkerError::Timeout { elapsed_ms: 42 }
        );
        assert!(matches!(
            status_error(StatusCode::CONFLICT, "already randomized".into(), 5),
            WorkerError::RemoteRejected(msg) if msg.contains("already randomized")
        ));
    }

    #[test]
    fn test_endpoint_layout() {
        let gateway = HttpWorkerGateway::new(GatewayConfig {
            base_url: "http://workers.local/".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let call = WorkerCall::SettleWinner {
            board: BoardRef::derive(4),
        };
        assert_eq!(
            gateway.endpoint(&call),
            "http://workers.local/winner/settle_winner"
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_rejected() {
        let gateway = HttpWorkerGateway::new(GatewayConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        let err = gateway.fetch_scores(1).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::RemoteRejected(_) | WorkerError::Timeout { .. }
        ));
    }
}
