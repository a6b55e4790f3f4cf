//! Executor Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause before the single retry of a whitelisted action (ms)
    pub retry_backoff_ms: u64,
    /// Upper bound on one worker call (ms); exceeding it is a `Timeout` failure
    pub worker_timeout_ms: u64,
    /// `capability.action` names (or task ids) that may be retried once
    pub retry_whitelist: Vec<String>,
    /// Cycles a blocked task may be carried over before it is dropped
    pub max_deferrals: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 2_000,
            worker_timeout_ms: 30_000,
            retry_whitelist: vec![
                "notification.send_notification".to_string(),
                "oracle.fetch_scores".to_string(),
            ],
            max_deferrals: 5,
        }
    }
}

impl ExecutorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn is_retryable(&self, qualified_name: &str, task_id: &str) -> bool {
        self.retry_whitelist
            .iter()
            .any(|name| name == qualified_name || name == task_id)
    }
}
