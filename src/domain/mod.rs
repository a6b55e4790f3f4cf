//! Domain types for squares boards
//!
//! The board record is owned by the on-chain program; everything here is a
//! read-only, normalized view of it plus the lifecycle stage derived from it.

pub mod ledger;
pub mod stage;

pub use ledger::{
    BoardRef, GameId, GameScore, LedgerRecord, HEADER_COUNT, HEADER_UNSET, SQUARE_COUNT,
    SYSTEM_ADDRESS,
};
pub use stage::{resolve, GameLifecycleStage};
