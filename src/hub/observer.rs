use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::protocol::OutboundMessage;
use crate::domain::GameId;
use crate::error::TransportError;
use crate::events::{DomainEvent, EventKind};

pub type ObserverId = String;

/// Event classes an observer wants; `All` also matches every game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClasses {
    All,
    Only(BTreeSet<EventKind>),
}

impl EventClasses {
    /// Parse client class names. Missing or empty means all; `all` or `*` is the wildcard.
    pub fn parse(names: Option<&[String]>) -> Result<Self, String> {
        let Some(names) = names.filter(|n| !n.is_empty()) else {
            return Ok(Self::All);
        };
        if names.iter().any(|n| n == "all" || n == "*") {
            return Ok(Self::All);
        }

        let mut kinds = BTreeSet::new();
        for name in names {
            let kind: EventKind = name.parse()?;
            if !kind.is_client_facing() {
                return Err(format!("event class {name} is not available to clients"));
            }
            kinds.insert(kind);
        }
        Ok(Self::Only(kinds))
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

impl Serialize for EventClasses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => ["all"].serialize(serializer),
            Self::Only(kinds) => kinds
                .iter()
                .map(EventKind::as_str)
                .collect::<Vec<_>>()
                .serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub game_id: Option<GameId>,
    pub events: EventClasses,
}

impl Subscription {
    /// Game filter (absent or equal) and class filter (wildcard or contains) must both pass
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.game_id.map_or(true, |id| id == event.game_id) && self.events.contains(event.kind)
    }
}

/// Outbound side of one observer connection.
///
/// While a snapshot for a game is being fetched, live messages for that game
/// are parked in `held` and flushed right after the snapshot, so a subscriber
/// never sees an update before the state it applies to.
pub struct ObserverChannel {
    sink: mpsc::Sender<OutboundMessage>,
    held: Mutex<HashMap<GameId, Vec<OutboundMessage>>>,
}

fn push(sink: &mpsc::Sender<OutboundMessage>, message: OutboundMessage) -> Result<(), TransportError> {
    sink.try_send(message).map_err(|e| match e {
        TrySendError::Full(_) => TransportError::Backpressure,
        TrySendError::Closed(_) => TransportError::Closed,
    })
}

impl ObserverChannel {
    pub fn new(sink: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            sink,
            held: Mutex::new(HashMap::new()),
        }
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashMap<GameId, Vec<OutboundMessage>>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send immediately, bypassing any hold
    pub fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        push(&self.sink, message)
    }

    /// Deliver a live message for `game_id`, parking it if a snapshot is pending
    pub fn deliver(&self, game_id: GameId, message: OutboundMessage) -> Result<(), TransportError> {
        let mut held = self.held();
        match held.get_mut(&game_id) {
            Some(queue) => {
                queue.push(message);
                Ok(())
            }
            None => push(&self.sink, message),
        }
    }

    /// Start parking live messages for `game_id`
    pub fn hold(&self, game_id: GameId) {
        self.held().entry(game_id).or_default();
    }

    /// Send the snapshot (or its error) and flush everything parked behind it
    pub fn release(&self, game_id: GameId, snapshot: OutboundMessage) -> Result<(), TransportError> {
        let mut held = self.held();
        let parked = held.remove(&game_id).unwrap_or_default();
        push(&self.sink, snapshot)?;
        for message in parked {
            push(&self.sink, message)?;
        }
        Ok(())
    }
}
