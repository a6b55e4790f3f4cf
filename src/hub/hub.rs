//! BroadcastHub: observer registry, control messages, fan-out, heartbeat

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::observer::{EventClasses, ObserverChannel, ObserverId, Subscription};
use super::protocol::{InboundMessage, OutboundBody, OutboundMessage};
use crate::domain::GameId;
use crate::error::TransportError;
use crate::events::DomainEvent;
use crate::ledger::StateFetcher;
use crate::store::GameStore;

/// Hub Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub heartbeat_interval_secs: u64,
    /// Evict observers silent for longer than this
    pub stale_after_secs: u64,
    /// Per-observer outbound queue capacity
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            stale_after_secs: 60,
            outbound_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connected_clients: usize,
    pub total_subscriptions: usize,
    /// Distinct game ids with at least one subscription
    pub active_games: usize,
}

struct Observer {
    channel: Arc<ObserverChannel>,
    subscriptions: Vec<Subscription>,
    last_seen: Instant,
}

struct HubInner {
    config: HubConfig,
    fetcher: StateFetcher,
    games: GameStore,
    observers: RwLock<HashMap<ObserverId, Observer>>,
}

/// Cheap to clone; all clones share one registry
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

fn new_observer_id() -> ObserverId {
    format!("client_{}", Uuid::new_v4().simple())
}

impl BroadcastHub {
    pub fn new(config: HubConfig, fetcher: StateFetcher, games: GameStore) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                fetcher,
                games,
                observers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Register a new observer. The returned receiver is the observer's outbound queue.
    pub async fn connect(&self) -> (ObserverId, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.inner.config.outbound_buffer.max(1));
        let id = new_observer_id();
        let channel = Arc::new(ObserverChannel::new(tx));

        // a fresh queue always has room for the greeting
        let _ = channel.send(
            OutboundBody::Connected {
                client_id: id.clone(),
            }
            .into(),
        );

        self.inner.observers.write().await.insert(
            id.clone(),
            Observer {
                channel,
                subscriptions: Vec::new(),
                last_seen: Instant::now(),
            },
        );
        info!(observer = %id, "observer connected");
        (id, rx)
    }

    /// Remove an observer and release its queue
    pub async fn disconnect(&self, id: &str) -> bool {
        let removed = self.inner.observers.write().await.remove(id).is_some();
        if removed {
            info!(observer = %id, "observer disconnected");
        }
        removed
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.inner.observers.read().await.contains_key(id)
    }

    async fn evict(&self, ids: &[ObserverId], reason: &str) {
        if ids.is_empty() {
            return;
        }
        let mut observers = self.inner.observers.write().await;
        for id in ids {
            if observers.remove(id).is_some() {
                warn!(observer = %id, reason, "observer evicted");
            }
        }
    }

    async fn channel(&self, id: &str) -> Option<Arc<ObserverChannel>> {
        self.inner
            .observers
            .read()
            .await
            .get(id)
            .map(|o| o.channel.clone())
    }

    /// Send a direct reply; a failed send evicts the observer
    async fn reply(&self, id: &str, body: OutboundBody) {
        let Some(channel) = self.channel(id).await else {
            return;
        };
        if let Err(e) = channel.send(body.into()) {
            self.evict(&[id.to_string()], transport_reason(e)).await;
        }
    }

    /// Record activity from an observer; false if it is not connected
    pub async fn touch(&self, id: &str) -> bool {
        match self.inner.observers.write().await.get_mut(id) {
            Some(observer) => {
                observer.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Handle one raw text frame from an observer. Any frame counts as activity.
    pub async fn handle_text(&self, id: &str, text: &str) {
        if !self.touch(id).await {
            debug!(observer = %id, "message from unknown observer");
            return;
        }
        match InboundMessage::parse(text) {
            Ok(message) => self.handle_message(id, message).await,
            Err(e) => {
                debug!(observer = %id, error = %e, "rejected inbound message");
                self.reply(id, OutboundBody::error(e)).await;
            }
        }
    }

    pub async fn handle_message(&self, id: &str, message: InboundMessage) {
        match message {
            InboundMessage::Subscribe { game_id, events } => {
                self.subscribe(id, game_id, events.as_deref()).await
            }
            InboundMessage::Unsubscribe { game_id } => self.unsubscribe(id, game_id).await,
            InboundMessage::Ping => self.reply(id, OutboundBody::Pong {}).await,
            InboundMessage::GetBoardState { game_id: None } => {
                self.reply(id, OutboundBody::error("gameId is required"))
                    .await
            }
            InboundMessage::GetBoardState {
                game_id: Some(game_id),
            } => {
                let body = self.board_state(game_id).await;
                self.reply(id, body).await;
            }
            InboundMessage::GetGameList => {
                let games = self.inner.games.summaries().await;
                self.reply(id, OutboundBody::GameList { games }).await;
            }
        }
    }

    async fn board_state(&self, game_id: GameId) -> OutboundBody {
        match self.inner.fetcher.snapshot(game_id).await {
            Ok(snapshot) => OutboundBody::BoardState(Box::new(snapshot)),
            Err(e) => {
                debug!(game_id, error = %e, "board state unavailable");
                OutboundBody::error(format!("Failed to fetch board state: {e}"))
            }
        }
    }

    async fn subscribe(&self, id: &str, game_id: Option<GameId>, events: Option<&[String]>) {
        let events = match EventClasses::parse(events) {
            Ok(events) => events,
            Err(e) => {
                self.reply(id, OutboundBody::error(e)).await;
                return;
            }
        };
        let subscription = Subscription { game_id, events };

        // register and start holding live events in one step
        let channel = {
            let mut observers = self.inner.observers.write().await;
            let Some(observer) = observers.get_mut(id) else {
                return;
            };
            if let Some(game_id) = game_id {
                observer.channel.hold(game_id);
            }
            if !observer.subscriptions.contains(&subscription) {
                observer.subscriptions.push(subscription.clone());
            }
            observer.channel.clone()
        };
        debug!(observer = %id, game_id, "observer subscribed");

        if let Err(e) = channel.send(OutboundBody::Subscribed(subscription).into()) {
            self.evict(&[id.to_string()], transport_reason(e)).await;
            return;
        }

        if let Some(game_id) = game_id {
            let snapshot = self.board_state(game_id).await;
            if let Err(e) = channel.release(game_id, snapshot.into()) {
                self.evict(&[id.to_string()], transport_reason(e)).await;
            }
        }
    }

    async fn unsubscribe(&self, id: &str, game_id: Option<GameId>) {
        {
            let mut observers = self.inner.observers.write().await;
            let Some(observer) = observers.get_mut(id) else {
                return;
            };
            observer.subscriptions.retain(|s| s.game_id != game_id);
        }
        debug!(observer = %id, game_id, "observer unsubscribed");
        self.reply(id, OutboundBody::Unsubscribed { game_id }).await;
    }

    /// Fan a domain event out to every matching observer.
    ///
    /// Works on a point-in-time copy of the registry; observers whose send
    /// fails are evicted after the pass and never interrupt it. Returns the
    /// number of observers the event was delivered (or queued) to.
    pub async fn broadcast(&self, event: &DomainEvent) -> usize {
        let Some(body) = OutboundBody::from_event(event) else {
            return 0;
        };
        let message = OutboundMessage::new(body);

        let targets: Vec<(ObserverId, Arc<ObserverChannel>)> = self
            .inner
            .observers
            .read()
            .await
            .iter()
            .filter(|(_, o)| o.subscriptions.iter().any(|s| s.matches(event)))
            .map(|(id, o)| (id.clone(), o.channel.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, channel) in targets {
            match channel.deliver(event.game_id, message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(observer = %id, error = %e, "broadcast send failed");
                    failed.push((id, e));
                }
            }
        }

        for (id, e) in &failed {
            self.evict(std::slice::from_ref(id), transport_reason(*e)).await;
        }
        debug!(
            kind = %event.kind,
            game_id = event.game_id,
            delivered,
            evicted = failed.len(),
            "event broadcast"
        );
        delivered
    }

    /// Evict stale observers and heartbeat the rest; returns the evicted ids
    pub async fn sweep(&self) -> Vec<ObserverId> {
        let stale_after = Duration::from_secs(self.inner.config.stale_after_secs);
        let now = Instant::now();

        let (stale, live): (Vec<ObserverId>, Vec<(ObserverId, Arc<ObserverChannel>)>) = {
            let mut observers = self.inner.observers.write().await;
            let stale: Vec<ObserverId> = observers
                .iter()
                .filter(|(_, o)| now.duration_since(o.last_seen) > stale_after)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                observers.remove(id);
                info!(observer = %id, "removing stale observer");
            }
            let live = observers
                .iter()
                .map(|(id, o)| (id.clone(), o.channel.clone()))
                .collect();
            (stale, live)
        };

        let heartbeat = OutboundMessage::new(OutboundBody::Heartbeat {});
        let mut failed = Vec::new();
        for (id, channel) in live {
            if let Err(e) = channel.send(heartbeat.clone()) {
                debug!(observer = %id, error = %e, "heartbeat send failed");
                failed.push(id);
            }
        }
        self.evict(&failed, "heartbeat send failed").await;

        stale.into_iter().chain(failed).collect()
    }

    pub async fn stats(&self) -> HubStats {
        let observers = self.inner.observers.read().await;
        let total_subscriptions = observers.values().map(|o| o.subscriptions.len()).sum();
        let active_games: HashSet<GameId> = observers
            .values()
            .flat_map(|o| o.subscriptions.iter().filter_map(|s| s.game_id))
            .collect();
        HubStats {
            connected_clients: observers.len(),
            total_subscriptions,
            active_games: active_games.len(),
        }
    }

    /// Periodic staleness sweep until shutdown
    pub async fn run_heartbeat(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(
            self.inner.config.heartbeat_interval_secs.max(1),
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep().await;
                    if !evicted.is_empty() {
                        debug!(count = evicted.len(), "heartbeat sweep evicted observers");
                    }
                }
                _ = shutdown.recv() => {
                    info!("hub heartbeat shutting down");
                    break;
                }
            }
        }
    }

    /// Forward bus events to observers until the bus or shutdown closes
    pub async fn run_event_bridge(
        self,
        mut events: mpsc::UnboundedReceiver<DomainEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.broadcast(&event).await;
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        info!("hub event bridge stopped");
    }

    /// Drop every observer; their writer tasks see a closed queue and end
    pub async fn shutdown(&self) {
        let mut observers = self.inner.observers.write().await;
        let count = observers.len();
        observers.clear();
        info!(count, "hub shut down");
    }
}

fn transport_reason(e: TransportError) -> &'static str {
    match e {
        TransportError::Closed => "transport closed",
        TransportError::Backpressure => "outbound buffer full",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LedgerRecord;
    use crate::error::LedgerError;
    use crate::events::EventKind;
    use crate::ledger::{LedgerReader, RawBoardAccount};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    /// Ledger whose reads block until released
    struct GatedLedger {
        gate: Notify,
    }

    #[async_trait]
    impl LedgerReader for GatedLedger {
        async fn fetch_board_record(&self, game_id: GameId) -> Result<RawBoardAccount, LedgerError> {
            self.gate.notified().await;
            Ok(RawBoardAccount::from(&LedgerRecord::empty(game_id)))
        }
    }

    struct OpenLedger;

    #[async_trait]
    impl LedgerReader for OpenLedger {
        async fn fetch_board_record(&self, game_id: GameId) -> Result<RawBoardAccount, LedgerError> {
            if game_id == 404 {
                return Err(LedgerError::NotFound(game_id));
            }
            Ok(RawBoardAccount::from(&LedgerRecord::empty(game_id)))
        }
    }

    fn hub_with(config: HubConfig) -> BroadcastHub {
        BroadcastHub::new(
            config,
            StateFetcher::new(Arc::new(OpenLedger)),
            GameStore::with_games([1, 2]),
        )
    }

    fn hub() -> BroadcastHub {
        hub_with(HubConfig::default())
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| serde_json::to_value(&m).unwrap())
            .collect()
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages.iter().filter_map(|m| m["type"].as_str()).collect()
    }

    fn event(kind: EventKind, game_id: GameId) -> DomainEvent {
        DomainEvent::new(kind, game_id, json!({ "n": 1 }))
    }

    #[tokio::test]
    async fn test_connect_greets_with_client_id() {
        let hub = hub();
        let (id, mut rx) = hub.connect().await;
        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["connected"]);
        assert_eq!(messages[0]["data"]["clientId"], id.as_str());
        assert_eq!(hub.stats().await.connected_clients, 1);
    }

    #[tokio::test]
    async fn test_subscribe_sends_ack_then_snapshot() {
        let hub = hub();
        let (id, mut rx) = hub.connect().await;
        hub.handle_text(&id, r#"{"type":"subscribe","gameId":1}"#).await;

        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["connected", "subscribed", "board_state"]);
        assert_eq!(messages[1]["data"]["events"], json!(["all"]));
        assert_eq!(messages[2]["data"]["gameId"], 1);
        assert_eq!(messages[2]["data"]["stage"], "created");

        assert_eq!(hub.broadcast(&event(EventKind::BoardUpdate, 1)).await, 1);
        assert_eq!(types(&drain(&mut rx)), vec!["board_update"]);
    }

    #[tokio::test]
    async fn test_snapshot_precedes_live_update() {
        let ledger = Arc::new(GatedLedger {
            gate: Notify::new(),
        });
        let hub = BroadcastHub::new(
            HubConfig::default(),
            StateFetcher::new(ledger.clone()),
            GameStore::new(),
        );
        let (id, mut rx) = hub.connect().await;

        let subscribing = {
            let hub = hub.clone();
            let id = id.clone();
            tokio::spawn(async move {
                hub.handle_text(&id, r#"{"type":"subscribe","gameId":7,"events":["board_update"]}"#)
                    .await
            })
        };

        // wait until the subscription is registered and the snapshot read is in flight
        while hub.stats().await.total_subscriptions == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.broadcast(&event(EventKind::BoardUpdate, 7)).await, 1);

        ledger.gate.notify_one();
        subscribing.await.unwrap();

        let messages = drain(&mut rx);
        assert_eq!(
            types(&messages),
            vec!["connected", "subscribed", "board_state", "board_update"]
        );
    }

    #[tokio::test]
    async fn test_failed_observer_does_not_block_others() {
        let hub = hub();
        let (x, rx_x) = hub.connect().await;
        let (y, mut rx_y) = hub.connect().await;
        for id in [&x, &y] {
            hub.handle_message(
                id,
                InboundMessage::Subscribe {
                    game_id: Some(2),
                    events: None,
                },
            )
            .await;
        }
        drain(&mut rx_y);
        drop(rx_x);

        assert_eq!(hub.broadcast(&event(EventKind::ScoreUpdate, 2)).await, 1);
        assert_eq!(types(&drain(&mut rx_y)), vec!["score_update"]);
        assert!(!hub.is_connected(&x).await);
        assert!(hub.is_connected(&y).await);
    }

    #[tokio::test]
    async fn test_full_buffer_evicts_slow_observer() {
        let hub = hub_with(HubConfig {
            outbound_buffer: 3,
            ..Default::default()
        });
        let (slow, _rx_slow) = hub.connect().await;
        let (fast, mut rx_fast) = hub.connect().await;
        for id in [&slow, &fast] {
            hub.handle_text(id, r#"{"type":"subscribe","events":["all"]}"#)
                .await;
        }

        for _ in 0..3 {
            drain(&mut rx_fast);
            hub.broadcast(&event(EventKind::SquarePurchased, 1)).await;
        }
        assert!(!hub.is_connected(&slow).await);
        assert!(hub.is_connected(&fast).await);
        assert_eq!(types(&drain(&mut rx_fast)), vec!["square_purchased"]);
    }

    #[tokio::test]
    async fn test_class_filter_excludes_other_events() {
        let hub = hub();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (id, mut rx) = hub.connect().await;
            hub.handle_text(&id, r#"{"type":"subscribe","gameId":1,"events":["score_update"]}"#)
                .await;
            drain(&mut rx);
            receivers.push(rx);
        }

        assert_eq!(hub.broadcast(&event(EventKind::WinnerAnnounced, 1)).await, 0);
        for rx in receivers.iter_mut() {
            assert!(drain(rx).is_empty());
        }
        assert_eq!(hub.broadcast(&event(EventKind::ScoreUpdate, 1)).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_silent_observers() {
        let hub = hub();
        let (silent, _rx_silent) = hub.connect().await;
        let (chatty, mut rx_chatty) = hub.connect().await;
        for id in [&silent, &chatty] {
            hub.handle_text(id, r#"{"type":"subscribe","gameId":1}"#).await;
        }

        tokio::time::advance(Duration::from_secs(45)).await;
        hub.handle_text(&chatty, r#"{"type":"ping"}"#).await;
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(hub.sweep().await, vec![silent.clone()]);
        assert!(!hub.is_connected(&silent).await);
        assert_eq!(hub.broadcast(&event(EventKind::BoardUpdate, 1)).await, 1);

        let messages = drain(&mut rx_chatty);
        assert_eq!(
            &types(&messages)[messages.len() - 3..],
            &["pong", "heartbeat", "board_update"]
        );
    }

    #[tokio::test]
    async fn test_control_messages() {
        let hub = hub();
        let (id, mut rx) = hub.connect().await;
        drain(&mut rx);

        hub.handle_text(&id, "{not json").await;
        hub.handle_text(&id, r#"{"type":"get_board_state"}"#).await;
        hub.handle_text(&id, r#"{"type":"get_board_state","gameId":404}"#).await;
        hub.handle_text(&id, r#"{"type":"subscribe","events":["gossip"]}"#).await;
        hub.handle_text(&id, r#"{"type":"get_game_list"}"#).await;
        let messages = drain(&mut rx);
        assert_eq!(
            types(&messages),
            vec!["error", "error", "error", "error", "game_list"]
        );
        assert_eq!(messages[1]["data"]["message"], "gameId is required");
        assert_eq!(messages[4]["data"]["games"][1]["status"], "pending");
    }

    #[tokio::test]
    async fn test_unsubscribe_and_stats() {
        let hub = hub();
        let (id, mut rx) = hub.connect().await;
        hub.handle_text(&id, r#"{"type":"subscribe","gameId":1}"#).await;
        hub.handle_text(&id, r#"{"type":"subscribe","gameId":2}"#).await;
        assert_eq!(
            hub.stats().await,
            HubStats {
                connected_clients: 1,
                total_subscriptions: 2,
                active_games: 2,
            }
        );

        hub.handle_text(&id, r#"{"type":"unsubscribe","gameId":1}"#).await;
        assert_eq!(hub.stats().await.active_games, 1);
        drain(&mut rx);

        assert_eq!(hub.broadcast(&event(EventKind::BoardUpdate, 1)).await, 0);
        assert_eq!(hub.broadcast(&event(EventKind::BoardUpdate, 2)).await, 1);
        assert_eq!(types(&drain(&mut rx)), vec!["board_update"]);

        hub.shutdown().await;
        assert_eq!(hub.stats().await.connected_clients, 0);
    }

    #[tokio::test]
    async fn test_internal_events_are_not_broadcast() {
        let hub = hub();
        let (id, mut rx) = hub.connect().await;
        hub.handle_text(&id, r#"{"type":"subscribe"}"#).await;
        drain(&mut rx);
        assert_eq!(hub.broadcast(&event(EventKind::TaskError, 1)).await, 0);
        assert!(drain(&mut rx).is_empty());
    }
}
