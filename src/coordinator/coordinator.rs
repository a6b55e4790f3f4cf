//! Coordinator: the tick-driven planning loop
//!
//! Each cycle, for every tracked game:
//!   - fetch the ledger record and derive the lifecycle stage
//!   - publish ledger diffs (new square owners, stage changes)
//!   - plan (advisory or fallback table) and execute the plan
//!
//! Games are processed concurrently; a cycle lock guarantees at most one
//! cycle in flight, so overlapping ticks never dispatch the same task twice.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use crate::domain::{resolve, GameId, GameLifecycleStage, LedgerRecord};
use crate::error::LedgerError;
use crate::events::{DomainEvent, EventBus};
use crate::executor::{CycleReport, TaskExecutor};
use crate::ledger::StateFetcher;
use crate::planner::{PlanningContext, TaskPlanner};
use crate::store::{GameEntry, GameStore};

/// Result of one tick
#[derive(Debug)]
pub enum CycleOutcome {
    /// One report per game that reached planning
    Completed(Vec<CycleReport>),
    /// A previous cycle was still running; this tick was dropped
    Skipped,
}

#[derive(Clone)]
pub struct Coordinator {
    fetcher: StateFetcher,
    planner: TaskPlanner,
    executor: Arc<TaskExecutor>,
    bus: EventBus,
    games: GameStore,
    config: CoordinatorConfig,
    cycle_lock: Arc<Mutex<()>>,
}

impl Coordinator {
    pub fn new(
        fetcher: StateFetcher,
        planner: TaskPlanner,
        executor: Arc<TaskExecutor>,
        bus: EventBus,
        games: GameStore,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            fetcher,
            planner,
            executor,
            bus,
            games,
            config,
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn games(&self) -> &GameStore {
        &self.games
    }

    /// Run one planning cycle over all tracked games
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("previous cycle still running, tick dropped");
            return CycleOutcome::Skipped;
        };

        let game_ids = self.games.tracked().await;
        let reports: Vec<CycleReport> = join_all(game_ids.into_iter().map(|id| self.run_game(id)))
            .await
            .into_iter()
            .flatten()
            .collect();

        debug!(games = reports.len(), "cycle complete");
        CycleOutcome::Completed(reports)
    }

    async fn run_game(&self, game_id: GameId) -> Option<CycleReport> {
        let previous = self.games.get(game_id).await.unwrap_or_default();

        let ctx = match self.fetcher.fetch(game_id).await {
            Ok(record) => {
                let stage = match resolve(&record) {
                    Ok(stage) => stage,
                    Err(e) => {
                        // keep the last published record so the next diff still sees these squares
                        warn!(game_id, error = %e, retained = ?previous.stage, "stage derivation failed, skipping game");
                        self.games.record_error(game_id, e.to_string()).await;
                        return None;
                    }
                };
                self.publish_diff(&previous, &record, stage);
                let ctx = PlanningContext::from_record(&record, stage, previous.stage);
                self.games.observe(game_id, record, stage).await;
                ctx
            }
            Err(LedgerError::NotFound(_)) if self.config.auto_create_boards => {
                debug!(game_id, "no board yet, planning bootstrap");
                PlanningContext::unbootstrapped(game_id)
            }
            Err(LedgerError::NotFound(_)) => {
                debug!(game_id, "no board and auto-create disabled, skipping game");
                return None;
            }
            Err(e) => {
                warn!(game_id, error = %e, "ledger read failed, skipping game");
                self.games.record_error(game_id, e.to_string()).await;
                return None;
            }
        };

        let plan = self.planner.plan(&ctx).await;
        let report = self.executor.execute(plan).await;
        info!(
            game_id,
            stage = ?ctx.stage,
            source = ?report.source,
            dispatched = report.dispatch_order.len(),
            failed = report.failures.len(),
            deferred = report.deferred.len(),
            "game cycle finished"
        );
        Some(report)
    }

    fn publish_diff(
        &self,
        previous: &GameEntry,
        record: &LedgerRecord,
        stage: GameLifecycleStage,
    ) {
        let game_id = record.game_id;
        // the first observation is the baseline; only later purchases are news
        if let Some(last) = &previous.last_record {
            for (index, owner) in record.newly_claimed_since(last) {
                self.bus
                    .publish(DomainEvent::square_purchased(game_id, index, &owner));
            }
        }
        if previous.stage != Some(stage) {
            info!(game_id, from = ?previous.stage, to = %stage, "stage changed");
            self.bus
                .publish(DomainEvent::stage_changed(game_id, stage, previous.stage));
        }
    }

    /// Tick until shutdown. Each tick runs its cycle in the background so a
    /// slow cycle makes later ticks drop instead of queueing.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        for game_id in &self.config.games {
            self.games.track(*game_id).await;
        }
        info!(
            games = self.config.games.len(),
            tick_ms = self.config.tick_interval_ms,
            advisory = self.planner.has_advisor(),
            "coordinator starting main loop"
        );

        let mut tick = interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    cycles.retain(|handle| !handle.is_finished());
                    let coordinator = self.clone();
                    cycles.push(tokio::spawn(async move {
                        coordinator.run_cycle().await;
                    }));
                }
                _ = shutdown_rx.recv() => {
                    info!("coordinator: shutdown signal received");
                    break;
                }
            }
        }

        // let spawned cycles finish their dispatches, including one not yet started
        for result in join_all(cycles).await {
            if let Err(e) = result {
                warn!(error = %e, "cycle task failed");
            }
        }
        info!("coordinator: main loop exited");
    }
}

/// Record `task_error` events against their game so failures show up in
/// `/health` and `game_list`
pub async fn record_task_errors(
    games: GameStore,
    mut errors: mpsc::UnboundedReceiver<DomainEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            event = errors.recv() => {
                let Some(event) = event else { break };
                let task = event.payload["task"].as_str().unwrap_or("unknown");
                let error = event.payload["error"].as_str().unwrap_or("unknown error");
                let will_retry = event.payload["willRetry"].as_bool().unwrap_or(false);
                debug!(game_id = event.game_id, task, will_retry, error, "task error recorded");
                if !will_retry {
                    games
                        .record_error(event.game_id, format!("{task}: {error}"))
                        .await;
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::executor::ExecutorConfig;
    use crate::ledger::{LedgerReader, RawBoardAccount};
    use crate::planner::PlanSource;
    use crate::workers::{SimulatedChain, WorkerSet};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn coordinator_with(
        reader: Arc<dyn LedgerReader>,
        workers: WorkerSet,
        bus: EventBus,
        config: CoordinatorConfig,
    ) -> Coordinator {
        let games = GameStore::with_games(config.games.clone());
        Coordinator::new(
            StateFetcher::new(reader),
            TaskPlanner::deterministic(),
            Arc::new(TaskExecutor::new(workers, bus.clone(), ExecutorConfig::default())),
            bus,
            games,
            config,
        )
    }

    fn tracking(games: &[GameId]) -> CoordinatorConfig {
        CoordinatorConfig {
            games: games.to_vec(),
            ..Default::default()
        }
    }

    fn reports(outcome: CycleOutcome) -> Vec<CycleReport> {
        match outcome {
            CycleOutcome::Completed(reports) => reports,
            CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_creates_and_randomizes() {
        let chain = Arc::new(SimulatedChain::default());
        let coordinator = coordinator_with(
            chain.clone(),
            WorkerSet::uniform(chain.clone()),
            EventBus::new(),
            tracking(&[1]),
        );

        let reports = reports(coordinator.run_cycle().await);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].source, PlanSource::Fallback);
        assert_eq!(
            reports[0].dispatch_order,
            vec!["board.create_board", "randomizer.request_randomization"]
        );

        let record = chain.record(1).await.unwrap();
        assert_eq!(resolve(&record), Ok(GameLifecycleStage::Randomized));
    }

    #[tokio::test]
    async fn test_missing_board_skipped_without_auto_create() {
        let chain = Arc::new(SimulatedChain::default());
        let coordinator = coordinator_with(
            chain.clone(),
            WorkerSet::uniform(chain.clone()),
            EventBus::new(),
            CoordinatorConfig {
                auto_create_boards: false,
                ..tracking(&[1])
            },
        );

        assert!(reports(coordinator.run_cycle().await).is_empty());
        assert!(chain.record(1).await.is_none());
    }

    #[tokio::test]
    async fn test_illegal_flags_retain_previous_stage() {
        let chain = Arc::new(SimulatedChain::default());
        let bus = EventBus::new();
        let mut updates = bus.subscribe(EventKind::BoardUpdate);
        let coordinator = coordinator_with(
            chain.clone(),
            WorkerSet::uniform(Arc::new(SimulatedChain::default())),
            bus,
            tracking(&[2]),
        );

        chain.insert_record(LedgerRecord::empty(2)).await;
        coordinator.run_cycle().await;
        assert!(updates.try_recv().is_ok());

        let mut broken = LedgerRecord::empty(2);
        broken.ended = true;
        chain.insert_record(broken).await;

        assert!(reports(coordinator.run_cycle().await).is_empty());
        assert!(updates.try_recv().is_err());
        let entry = coordinator.games().get(2).await.unwrap();
        assert_eq!(entry.stage, Some(GameLifecycleStage::Created));
        assert!(!entry.last_record.unwrap().ended);
        assert!(entry.last_error.is_some());
    }

    #[tokio::test]
    async fn test_purchase_during_illegal_cycle_is_announced_later() {
        let chain = Arc::new(SimulatedChain::default());
        let bus = EventBus::new();
        let mut purchases = bus.subscribe(EventKind::SquarePurchased);
        let coordinator = coordinator_with(
            chain.clone(),
            WorkerSet::uniform(Arc::new(SimulatedChain::default())),
            bus,
            tracking(&[3]),
        );

        chain.insert_record(LedgerRecord::empty(3)).await;
        coordinator.run_cycle().await;

        let mut broken = LedgerRecord::empty(3);
        broken.ended = true;
        broken.squares[42] = Some("bob".into());
        chain.insert_record(broken).await;
        coordinator.run_cycle().await;
        assert!(purchases.try_recv().is_err());

        let mut fixed = LedgerRecord::empty(3);
        fixed.squares[42] = Some("bob".into());
        chain.insert_record(fixed).await;
        coordinator.run_cycle().await;

        let event = purchases.try_recv().unwrap();
        assert_eq!(event.payload["squareIndex"], 42);
        assert_eq!(event.payload["owner"], "bob");
        assert!(purchases.try_recv().is_err());
        assert!(coordinator.games().get(3).await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_final_task_errors_are_recorded_on_the_game() {
        let bus = EventBus::new();
        let games = GameStore::with_games([8]);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let recorder = tokio::spawn(record_task_errors(
            games.clone(),
            bus.subscribe(EventKind::TaskError),
            shutdown_tx.subscribe(),
        ));

        let failure = |attempts| crate::error::TaskDispatchError {
            task: "oracle.fetch_scores".into(),
            attempts,
            source: crate::error::WorkerError::Timeout { elapsed_ms: 10 },
        };
        bus.publish(DomainEvent::task_error(8, &failure(1), true));
        bus.publish(DomainEvent::task_error(8, &failure(2), false));
        bus.publish(DomainEvent::task_dropped(8, "randomizer.request_randomization", 5));

        shutdown_tx.send(()).unwrap();
        recorder.await.unwrap();

        let entry = games.get(8).await.unwrap();
        let error = entry.last_error.unwrap();
        assert!(error.starts_with("randomizer.request_randomization:"));
        assert!(error.contains("5 cycles"));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_spawned_cycles() {
        let ledger = Arc::new(GatedLedger {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let chain = Arc::new(SimulatedChain::default());
        let coordinator = coordinator_with(
            ledger.clone(),
            WorkerSet::uniform(chain.clone()),
            EventBus::new(),
            tracking(&[11]),
        );
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let runner = tokio::spawn(coordinator.run(shutdown_tx.subscribe()));

        ledger.entered.notified().await;
        shutdown_tx.send(()).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!runner.is_finished());

        ledger.release.notify_one();
        runner.await.unwrap();
        assert!(chain.record(11).await.is_some());
    }

    struct GatedLedger {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LedgerReader for GatedLedger {
        async fn fetch_board_record(&self, game_id: GameId) -> Result<RawBoardAccount, LedgerError> {
            self.entered.notify_one();
            self.release.notified().await;
            Err(LedgerError::NotFound(game_id))
        }
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_dropped() {
        let ledger = Arc::new(GatedLedger {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let chain = Arc::new(SimulatedChain::default());
        let coordinator = coordinator_with(
            ledger.clone(),
            WorkerSet::uniform(chain.clone()),
            EventBus::new(),
            tracking(&[9]),
        );

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_cycle().await })
        };
        ledger.entered.notified().await;

        assert!(matches!(
            coordinator.run_cycle().await,
            CycleOutcome::Skipped
        ));

        ledger.release.notify_one();
        let reports = reports(first.await.unwrap());
        assert_eq!(reports.len(), 1);
        assert!(reports[0].was_dispatched("board.create_board"));
        assert!(chain.record(9).await.is_some());
    }
}
