use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::domain::{resolve, GameId, GameLifecycleStage, LedgerRecord};
use crate::error::{OrchestratorError, Result};
use crate::ledger::{normalize, RawBoardAccount};
use crate::planner::{fallback_plan, Plan, PlanSource, PlanningContext};

#[derive(Parser)]
#[command(name = "squares")]
#[command(version)]
#[command(about = "Lifecycle orchestrator and live broadcast hub for football squares boards", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coordinator, hub and HTTP server
    Serve {
        /// Config directory
        #[arg(short, long, default_value = "config")]
        config: String,
        /// Use the simulated chain instead of live workers
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the fallback plan for a stage as JSON
    Plan {
        /// Lifecycle stage, or `none` for a game without a board
        #[arg(short, long)]
        stage: String,
        #[arg(short, long, default_value_t = 1)]
        game_id: GameId,
        /// Stage seen on the previous tick; omit to plan a stage entry
        #[arg(short, long)]
        previous: Option<String>,
        /// Settled winner with an unpaid pot
        #[arg(short, long)]
        winner: Option<String>,
    },
    /// Normalize a board account JSON file and print its stage
    Resolve {
        /// Path to the raw board account
        file: PathBuf,
    },
}

fn parse_stage(raw: &str) -> Result<Option<GameLifecycleStage>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "" => Ok(None),
        other => other
            .parse()
            .map(Some)
            .map_err(OrchestratorError::Validation),
    }
}

/// Fallback plan for a synthetic context at `stage`
pub fn plan_for_stage(
    game_id: GameId,
    stage: &str,
    previous: Option<&str>,
    winner: Option<&str>,
) -> Result<Plan> {
    let stage = parse_stage(stage)?;
    let previous = match previous {
        Some(raw) => parse_stage(raw)?,
        None => None,
    };

    let mut ctx = PlanningContext::unbootstrapped(game_id);
    ctx.stage = stage;
    ctx.previous_stage = previous;
    if let Some(winner) = winner {
        ctx.winner = Some(winner.to_string());
        ctx.payout_pending = true;
    }

    Ok(Plan {
        game_id,
        stage,
        source: PlanSource::Fallback,
        tasks: fallback_plan(&ctx),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub game_id: GameId,
    pub stage: Option<GameLifecycleStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub squares_sold: usize,
    pub players_count: usize,
}

impl Resolution {
    fn of(record: &LedgerRecord) -> Self {
        let (stage, error) = match resolve(record) {
            Ok(stage) => (Some(stage), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            game_id: record.game_id,
            stage,
            error,
            squares_sold: record.squares_sold(),
            players_count: record.player_count(),
        }
    }
}

/// Normalize a raw board account and derive its stage
pub fn resolve_account(json: &str) -> Result<Resolution> {
    let raw: RawBoardAccount = serde_json::from_str(json)?;
    let record = normalize(raw.game_id, raw)?;
    Ok(Resolution::of(&record))
}

pub fn resolve_file(path: &Path) -> Result<Resolution> {
    let contents = std::fs::read_to_string(path)?;
    resolve_account(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SYSTEM_ADDRESS;

    #[test]
    fn test_plan_command_covers_bootstrap_and_entry() {
        let plan = plan_for_stage(3, "none", None, None).unwrap();
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].id, "board.create_board");

        let entering = plan_for_stage(3, "started", Some("randomized"), None).unwrap();
        let steady = plan_for_stage(3, "started", Some("started"), None).unwrap();
        assert!(entering.tasks.len() > steady.tasks.len());

        let settled = plan_for_stage(3, "settled", Some("settled"), Some("alice")).unwrap();
        assert_eq!(settled.tasks.len(), 1);
        assert_eq!(settled.tasks[0].id, "winner.payout_winner");

        assert!(plan_for_stage(3, "halftime", None, None).is_err());
    }

    #[test]
    fn test_resolve_reports_stage_or_violation() {
        let mut raw = RawBoardAccount::from(&LedgerRecord::empty(6));
        let resolution = resolve_account(&serde_json::to_string(&raw).unwrap()).unwrap();
        assert_eq!(resolution.stage, Some(GameLifecycleStage::Created));
        assert!(resolution.error.is_none());

        raw.game_ended = true;
        raw.winner = SYSTEM_ADDRESS.to_string();
        let resolution = resolve_account(&serde_json::to_string(&raw).unwrap()).unwrap();
        assert_eq!(resolution.stage, None);
        assert!(resolution.error.is_some());

        assert!(resolve_account("{}").is_err());
    }
}
