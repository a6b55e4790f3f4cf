use anyhow::Context;
use clap::Parser;
use squares_orchestrator::cli::{self, Cli, Commands};
use squares_orchestrator::config::AppConfig;
use squares_orchestrator::coordinator;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, dry_run } => {
            let mut app_config = AppConfig::load_from(&config)
                .with_context(|| format!("failed to load configuration from {config}"))?;
            app_config.dry_run |= dry_run;
            init_logging(&app_config.logging);

            info!(
                games = ?app_config.coordinator.games,
                simulated = app_config.simulated(),
                "starting squares orchestrator"
            );
            coordinator::serve(&app_config).await?;
        }
        Commands::Plan {
            stage,
            game_id,
            previous,
            winner,
        } => {
            init_logging_simple();
            let plan =
                cli::plan_for_stage(game_id, &stage, previous.as_deref(), winner.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Resolve { file } => {
            init_logging_simple();
            let resolution = cli::resolve_file(&file)
                .with_context(|| format!("failed to resolve {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }

    Ok(())
}
