//! Lifecycle stage derivation
//!
//! Stages are never stored. Each tick derives the stage from the freshly read
//! board flags with precedence Settled > Ended > Started > Randomized > Created.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::ledger::LedgerRecord;
use crate::error::StateDerivationError;

/// Coarse lifecycle phase of a board, forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameLifecycleStage {
    Created,
    Randomized,
    Started,
    Ended,
    Settled,
}

impl GameLifecycleStage {
    pub const ALL: [GameLifecycleStage; 5] = [
        GameLifecycleStage::Created,
        GameLifecycleStage::Randomized,
        GameLifecycleStage::Started,
        GameLifecycleStage::Ended,
        GameLifecycleStage::Settled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Randomized => "randomized",
            Self::Started => "started",
            Self::Ended => "ended",
            Self::Settled => "settled",
        }
    }
}

impl std::fmt::Display for GameLifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameLifecycleStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "randomized" => Ok(Self::Randomized),
            "started" => Ok(Self::Started),
            "ended" => Ok(Self::Ended),
            "settled" => Ok(Self::Settled),
            other => Err(format!("unknown lifecycle stage: {other}")),
        }
    }
}

/// Map a board record to its lifecycle stage.
///
/// Pure and idempotent. Each later flag must imply every earlier one; a record
/// that breaks the chain is rejected rather than rounded to a nearby stage.
pub fn resolve(record: &LedgerRecord) -> Result<GameLifecycleStage, StateDerivationError> {
    let settled = record.winner.is_some();

    let violation = if settled && !record.ended {
        Some("winner present but game not ended")
    } else if record.ended && !record.started {
        Some("ended without started")
    } else if record.started && !record.randomized {
        Some("started without randomized")
    } else {
        None
    };

    if let Some(violation) = violation {
        return Err(StateDerivationError {
            game_id: record.game_id,
            violation,
        });
    }

    let stage = if settled {
        GameLifecycleStage::Settled
    } else if record.ended {
        GameLifecycleStage::Ended
    } else if record.started {
        GameLifecycleStage::Started
    } else if record.randomized {
        GameLifecycleStage::Randomized
    } else {
        GameLifecycleStage::Created
    };

    Ok(stage)
}
