//! Worker capabilities
//!
//! Each specialized agent (board, randomizer, oracle, winner settlement,
//! notification) exposes a small set of named operations. The executor only
//! ever reaches them through [`WorkerSet::dispatch`] with a [`WorkerCall`]
//! drawn from the closed catalog.

pub mod catalog;
pub mod gateway;
pub mod simulated;
pub mod traits;

pub use catalog::{Action, Capability, CatalogEntry, WorkerCall, WorkerOutput, CATALOG};
pub use gateway::{GatewayConfig, HttpWorkerGateway};
pub use simulated::{SentNotification, SimulatedChain, SimulationConfig};
pub use traits::{
    BoardCreated, BoardWorker, NotificationKind, NotificationWorker, OracleWorker, PayoutReceipt,
    RandomizerWorker, RandomnessRequest, SettlementWorker, WinnerInfo, WorkerSet,
};

#[cfg(test)]
pub use traits::{
    MockBoardWorker, MockNotificationWorker, MockOracleWorker, MockRandomizerWorker,
    MockSettlementWorker,
};
