//! Runtime assembly
//!
//! Wires ledger, workers, planner, executor, bus, hub and HTTP server from an
//! [`AppConfig`] and runs them until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::coordinator::{record_task_errors, Coordinator};
use crate::api::{create_router, AppState};
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{EventBus, EventKind};
use crate::executor::TaskExecutor;
use crate::hub::BroadcastHub;
use crate::ledger::{HttpLedgerReader, LedgerReader, StateFetcher};
use crate::planner::{ChatAdvisor, TaskPlanner};
use crate::store::GameStore;
use crate::workers::{HttpWorkerGateway, SimulatedChain, WorkerSet};

/// Fully wired components, not yet running
pub struct Runtime {
    pub bus: EventBus,
    pub games: GameStore,
    pub hub: BroadcastHub,
    pub coordinator: Coordinator,
    /// Present in dry-run mode
    pub chain: Option<Arc<SimulatedChain>>,
}

impl Runtime {
    pub fn build(config: &AppConfig) -> Result<Self> {
        let (reader, workers, chain): (Arc<dyn LedgerReader>, WorkerSet, Option<Arc<SimulatedChain>>) =
            match config.ledger.client_config() {
                Some(ledger) if !config.dry_run => {
                    info!(ledger = %ledger.base_url, workers = %config.workers.base_url, "using live ledger and worker gateway");
                    let reader: Arc<dyn LedgerReader> = Arc::new(HttpLedgerReader::new(ledger)?);
                    let gateway = Arc::new(HttpWorkerGateway::new(config.workers.gateway_config())?);
                    (reader, WorkerSet::uniform(gateway), None)
                }
                _ => {
                    if !config.dry_run {
                        warn!("no ledger endpoint configured, falling back to the simulated chain");
                    }
                    let chain = Arc::new(SimulatedChain::new(config.simulation.clone()));
                    let reader: Arc<dyn LedgerReader> = chain.clone();
                    (reader, WorkerSet::uniform(chain.clone()), Some(chain))
                }
            };

        let planner = if config.planner.advisory_enabled {
            let advisor = config.planner.advisor_config();
            if advisor.is_configured() {
                info!(model = %advisor.model, "advisory planner enabled");
                TaskPlanner::with_advisor(
                    Arc::new(ChatAdvisor::new(advisor)?),
                    config.planner.advisory_timeout(),
                )
            } else {
                warn!(
                    env = %config.planner.api_key_env,
                    "advisory planner enabled but no API key set, using fallback table only"
                );
                TaskPlanner::deterministic()
            }
        } else {
            TaskPlanner::deterministic()
        };

        let bus = EventBus::new();
        let games = GameStore::with_games(config.coordinator.games.iter().copied());
        let fetcher = StateFetcher::new(reader);
        let executor = Arc::new(TaskExecutor::new(
            workers,
            bus.clone(),
            config.executor.clone(),
        ));
        let hub = BroadcastHub::new(config.hub.clone(), fetcher.clone(), games.clone());
        let coordinator = Coordinator::new(
            fetcher,
            planner,
            executor,
            bus.clone(),
            games.clone(),
            config.coordinator.clone(),
        );

        Ok(Self {
            bus,
            games,
            hub,
            coordinator,
            chain,
        })
    }
}

/// Running orchestrator
pub struct OrchestratorHandle {
    pub local_addr: SocketAddr,
    pub hub: BroadcastHub,
    pub chain: Option<Arc<SimulatedChain>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Sender that stops every component when signalled
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Wait until every component has stopped
    pub async fn join(self) {
        let timeout = Duration::from_secs(10);
        for task in self.tasks {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("component did not stop in time");
            }
        }
        self.hub.shutdown().await;
        info!("orchestrator shutdown complete");
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.join().await;
    }
}

/// Bind the server and start every component in the background
pub async fn start_orchestrator(config: &AppConfig) -> Result<OrchestratorHandle> {
    let runtime = Runtime::build(config)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    // subscribe before the first tick so no client-facing event is missed
    let bridge_rx = runtime.bus.subscribe_many(&EventKind::CLIENT_FACING);
    tasks.push(tokio::spawn(
        runtime
            .hub
            .clone()
            .run_event_bridge(bridge_rx, shutdown_tx.subscribe()),
    ));
    tasks.push(tokio::spawn(
        runtime.hub.clone().run_heartbeat(shutdown_tx.subscribe()),
    ));
    tasks.push(tokio::spawn(record_task_errors(
        runtime.games.clone(),
        runtime.bus.subscribe(EventKind::TaskError),
        shutdown_tx.subscribe(),
    )));

    let listener = TcpListener::bind(&config.server.bind).await?;
    let local_addr = listener.local_addr()?;
    let app = create_router(AppState::new(runtime.hub.clone(), runtime.games.clone()));
    let mut server_shutdown = shutdown_tx.subscribe();
    tasks.push(tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        });
        if let Err(e) = server.await {
            warn!(error = %e, "server exited with error");
        }
    }));
    info!(addr = %local_addr, "websocket hub listening on /ws");

    tasks.push(tokio::spawn(
        runtime.coordinator.clone().run(shutdown_tx.subscribe()),
    ));

    Ok(OrchestratorHandle {
        local_addr,
        hub: runtime.hub,
        chain: runtime.chain,
        shutdown_tx,
        tasks,
    })
}

/// Run until Ctrl+C
pub async fn serve(config: &AppConfig) -> Result<()> {
    let handle = start_orchestrator(config).await?;

    let stx = handle.shutdown_sender();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Ctrl+C received, initiating shutdown");
            let _ = stx.send(());
        }
    });

    handle.join().await;
    Ok(())
}
