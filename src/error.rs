use thiserror::Error;

use crate::domain::GameId;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Ledger / state errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("State derivation error: {0}")]
    StateDerivation(#[from] StateDerivationError),

    // Planning / execution errors
    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Task dispatch error: {0}")]
    TaskDispatch(#[from] TaskDispatchError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    // Observer transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for OrchestratorError
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Typed failures reported by worker capabilities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Remote rejected: {0}")]
    RemoteRejected(String),
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

/// Failures reading the authoritative board record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Board for game {0} not found")]
    NotFound(GameId),

    #[error("Malformed board record: {0}")]
    Malformed(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Ledger flags violate the forward-only lifecycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal flags for game {game_id}: {violation}")]
pub struct StateDerivationError {
    pub game_id: GameId,
    pub violation: &'static str,
}

/// Advisory planning failures (always recovered by the fallback table)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("Advisory planner unavailable: {0}")]
    Unavailable(String),

    #[error("Advisory planner timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed advisory response: {0}")]
    Malformed(String),

    #[error("Plan rejected: {0}")]
    Invalid(String),

    #[error("Advisory planner returned no tasks")]
    Empty,
}

/// A worker call that failed after the retry policy was applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task {task} failed after {attempts} attempt(s): {source}")]
pub struct TaskDispatchError {
    pub task: String,
    pub attempts: u32,
    #[source]
    pub source: WorkerError,
}

/// Delivery to a single observer failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("Observer channel closed")]
    Closed,

    #[error("Observer outbound buffer full")]
    Backpressure,
}
