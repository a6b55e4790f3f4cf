use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;
use crate::executor::ExecutorConfig;
use crate::hub::HubConfig;
use crate::ledger::LedgerClientConfig;
use crate::planner::AdvisorConfig;
use crate::workers::{GatewayConfig, SimulationConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub hub: HubConfig,
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub workers: WorkersConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    /// Drive the in-memory simulated chain instead of real workers
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub advisory_enabled: bool,
    /// Upper bound on one advisory call before the fallback table is used
    pub advisory_timeout_ms: u64,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the advisor API key
    pub api_key_env: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let advisor = AdvisorConfig::default();
        Self {
            advisory_enabled: false,
            advisory_timeout_ms: 5_000,
            base_url: advisor.base_url,
            model: advisor.model,
            api_key_env: "SQUARES_ADVISOR_API_KEY".to_string(),
        }
    }
}

impl PlannerConfig {
    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }

    /// Advisor client settings; the key is read from `api_key_env`
    pub fn advisor_config(&self) -> AdvisorConfig {
        AdvisorConfig {
            api_key: std::env::var(&self.api_key_env).unwrap_or_default(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Board indexer endpoint; absent means the simulated chain is used
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 10_000,
        }
    }
}

impl LedgerConfig {
    pub fn client_config(&self) -> Option<LedgerClientConfig> {
        self.base_url.as_ref().map(|base_url| LedgerClientConfig {
            base_url: base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Worker gateway endpoint
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let gateway = GatewayConfig::default();
        Self {
            base_url: gateway.base_url,
            timeout_ms: gateway.timeout.as_millis() as u64,
        }
    }
}

impl WorkersConfig {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
    /// Directory for the daily log file
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("dry_run", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SQUARES_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SQUARES_COORDINATOR__TICK_INTERVAL_MS, etc.)
            .add_source(
                Environment::with_prefix("SQUARES")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("coordinator.games")
                    .with_list_parse_key("executor.retry_whitelist"),
            );

        builder.build()?.try_deserialize()
    }

    /// True when the simulated chain stands in for ledger and workers
    pub fn simulated(&self) -> bool {
        self.dry_run || self.ledger.base_url.is_none()
    }
}
