//! Board indexer client
//!
//! Reads board accounts as JSON from `GET {base_url}/boards/{game_id}`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::fetcher::{LedgerReader, RawBoardAccount};
use crate::domain::GameId;
use crate::error::{LedgerError, OrchestratorError, Result};

/// Indexer client configuration
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LedgerClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8899".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP ledger reader backed by the chain indexer
pub struct HttpLedgerReader {
    config: LedgerClientConfig,
    http: Client,
}

impl HttpLedgerReader {
    pub fn new(config: LedgerClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, http })
    }

    fn board_url(&self, game_id: GameId) -> String {
        format!(
            "{}/boards/{}",
            self.config.base_url.trim_end_matches('/'),
            game_id
        )
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerReader {
    async fn fetch_board_record(&self, game_id: GameId) -> std::result::Result<RawBoardAccount, LedgerError> {
        let url = self.board_url(game_id);
        debug!(game_id, %url, "fetching board account");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(LedgerError::NotFound(game_id)),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                warn!(game_id, %status, "indexer error: {}", body);
                return Err(LedgerError::Unavailable(format!(
                    "indexer returned {}: {}",
                    status, body
                )));
            }
            _ => {}
        }

        response
            .json::<RawBoardAccount>()
            .await
            .map_err(|e| LedgerError::Malformed(format!("Failed to parse board account: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_url_trims_trailing_slash() {
        let reader = HttpLedgerReader::new(LedgerClientConfig {
            base_url: "https://indexer.example/".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(reader.board_url(12), "https://indexer.example/boards/12");
    }

    #[tokio::test]
    async fn test_unreachable_indexer_is_unavailable() {
        let reader = HttpLedgerReader::new(LedgerClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        assert!(matches!(
            reader.fetch_board_record(1).await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
