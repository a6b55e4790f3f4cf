//! Client wire protocol
//!
//! Inbound control messages are `{"type": ..., "gameId"?, "events"?}`; the
//! same fields nested under `data` are accepted too. Outbound messages are
//! `{"type": ..., "data": {...}, "timestamp": <epoch ms>}`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::observer::Subscription;
use crate::domain::GameId;
use crate::events::{DomainEvent, EventKind};
use crate::ledger::BoardSnapshot;
use crate::store::GameSummary;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Subscribe {
        #[serde(default, rename = "gameId")]
        game_id: Option<GameId>,
        #[serde(default)]
        events: Option<Vec<String>>,
    },
    Unsubscribe {
        #[serde(default, rename = "gameId")]
        game_id: Option<GameId>,
    },
    Ping,
    GetBoardState {
        #[serde(default, rename = "gameId")]
        game_id: Option<GameId>,
    },
    GetGameList,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut value: Value =
            serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

        // lift `data` fields to the top level
        if let Value::Object(map) = &mut value {
            if let Some(Value::Object(data)) = map.remove("data") {
                for (key, field) in data {
                    map.entry(key).or_insert(field);
                }
            }
        }

        serde_json::from_value(value).map_err(|e| format!("unsupported message: {e}"))
    }
}

/// Payload of a live game event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub game_id: GameId,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundBody {
    #[serde(rename_all = "camelCase")]
    Connected { client_id: String },
    Subscribed(Subscription),
    #[serde(rename_all = "camelCase")]
    Unsubscribed { game_id: Option<GameId> },
    BoardUpdate(EventData),
    ScoreUpdate(EventData),
    WinnerAnnounced(EventData),
    SquarePurchased(EventData),
    BoardState(Box<BoardSnapshot>),
    GameList { games: Vec<GameSummary> },
    Heartbeat {},
    Pong {},
    Error { message: String },
}

impl OutboundBody {
    /// Wire form of a client-facing event; `None` for internal event types
    pub fn from_event(event: &DomainEvent) -> Option<Self> {
        let data = EventData {
            game_id: event.game_id,
            payload: event.payload.clone(),
        };
        match event.kind {
            EventKind::BoardUpdate => Some(Self::BoardUpdate(data)),
            EventKind::ScoreUpdate => Some(Self::ScoreUpdate(data)),
            EventKind::WinnerAnnounced => Some(Self::WinnerAnnounced(data)),
            EventKind::SquarePurchased => Some(Self::SquarePurchased(data)),
            EventKind::TaskCompleted | EventKind::TaskError => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub body: OutboundBody,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl OutboundMessage {
    pub fn new(body: OutboundBody) -> Self {
        Self {
            body,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<OutboundBody> for OutboundMessage {
    fn from(body: OutboundBody) -> Self {
        Self::new(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_and_nested_forms() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"subscribe","gameId":7,"events":["score_update"]}"#),
            Ok(InboundMessage::Subscribe {
                game_id: Some(7),
                events: Some(vec!["score_update".into()]),
            })
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"get_board_state","data":{"gameId":3}}"#),
            Ok(InboundMessage::GetBoardState { game_id: Some(3) })
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"subscribe"}"#),
            Ok(InboundMessage::Subscribe {
                game_id: None,
                events: None
            })
        );
        assert_eq!(
            InboundMessage::parse(r#"{"type":"ping","timestamp":1}"#),
            Ok(InboundMessage::Ping)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_invalid() {
        assert!(InboundMessage::parse(r#"{"type":"buy_square"}"#).is_err());
        assert!(InboundMessage::parse("not json").is_err());
    }

    #[test]
    fn test_outbound_wire_shape() {
        let msg = OutboundMessage::new(OutboundBody::Connected {
            client_id: "client_1".into(),
        });
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["data"]["clientId"], "client_1");
        assert!(json["timestamp"].as_i64().unwrap() > 0);

        let json = serde_json::to_value(OutboundMessage::new(OutboundBody::Heartbeat {})).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["data"], json!({}));
    }

    #[test]
    fn test_event_mapping() {
        let event = DomainEvent::new(EventKind::ScoreUpdate, 4, json!({ "homeScore": 14 }));
        let body = OutboundBody::from_event(&event).unwrap();
        let json = serde_json::to_value(OutboundMessage::new(body)).unwrap();
        assert_eq!(json["type"], "score_update");
        assert_eq!(json["data"]["gameId"], 4);
        assert_eq!(json["data"]["payload"]["homeScore"], 14);

        let internal = DomainEvent::new(EventKind::TaskError, 4, json!({}));
        assert!(OutboundBody::from_event(&internal).is_none());
    }
}
