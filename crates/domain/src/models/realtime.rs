//! Realtime wire protocol.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geo::{GeoPoint, RoomKey};
use super::heatmap::Heatmap;
use super::incident::NewIncidentPayload;
use crate::error::ValidationError;

/// Opaque handle of one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Named broadcast channels that are not geographic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Coarse feed of every incident, independent of geography.
    AllIncidents,
    /// Per-user channel for risk alerts.
    User(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::AllIncidents => f.write_str("incidents:all"),
            Channel::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Parameters of a viewport (un)subscription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSubscription {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

impl LocationSubscription {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn room_key(&self) -> Result<RoomKey, ValidationError> {
        RoomKey::new(self.center(), self.radius)
    }
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "subscribe:location")]
    SubscribeLocation(LocationSubscription),
    #[serde(rename = "unsubscribe:location")]
    UnsubscribeLocation(LocationSubscription),
    #[serde(rename = "subscribe:incidents")]
    SubscribeIncidents,
}

impl ClientEvent {
    /// Parses one text frame. An empty `data` object is accepted in place of
    /// no payload, as sent by clients for `subscribe:incidents`.
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(fields) = frame.as_object_mut() {
            let empty_data = fields
                .get("data")
                .is_some_and(|data| data.is_null() || data.as_object().is_some_and(|m| m.is_empty()));
            if empty_data {
                fields.remove("data");
            }
        }
        serde_json::from_value(frame)
    }
}

/// Acknowledgement of a viewport subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribedAck {
    pub room: String,
}

/// Heatmap pushed to the members of one viewport room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapUpdate {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    pub heatmap: Heatmap,
    pub timestamp: DateTime<Utc>,
}

/// Risk alert pushed to a single user's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAlert {
    pub user_id: String,
    pub location: GeoPoint,
    pub risk_score: f64,
    pub risk_level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "subscribed")]
    Subscribed(SubscribedAck),
    #[serde(rename = "heatmap:update")]
    HeatmapUpdate(HeatmapUpdate),
    #[serde(rename = "incident:new")]
    IncidentNew(NewIncidentPayload),
    #[serde(rename = "risk:alert")]
    RiskAlert(RiskAlert),
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Subscribed(_) => "subscribed",
            ServerEvent::HeatmapUpdate(_) => "heatmap:update",
            ServerEvent::IncidentNew(_) => "incident:new",
            ServerEvent::RiskAlert(_) => "risk:alert",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::AllIncidents.to_string(), "incidents:all");
        assert_eq!(Channel::User("u-42".into()).to_string(), "user:u-42");
    }

    #[test]
    fn test_client_event_wire_format() {
        let frame = ClientEvent::SubscribeLocation(LocationSubscription {
            lat: 13.08,
            lng: 80.27,
            radius: 1000.0,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "subscribe:location");
        assert_eq!(json["data"]["radius"], 1000.0);
    }

    #[test]
    fn test_client_event_parses_incident_subscription() {
        let frame: ClientEvent =
            serde_json::from_value(json!({"event": "subscribe:incidents"})).unwrap();
        assert_eq!(frame, ClientEvent::SubscribeIncidents);
    }

    #[test]
    fn test_client_event_accepts_empty_payload() {
        let frame = ClientEvent::from_frame(r#"{"event":"subscribe:incidents","data":{}}"#).unwrap();
        assert_eq!(frame, ClientEvent::SubscribeIncidents);

        let frame = ClientEvent::from_frame(
            r#"{"event":"subscribe:location","data":{"lat":13.08,"lng":80.27,"radius":1000}}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientEvent::SubscribeLocation(sub) if sub.radius == 1000.0));

        assert!(ClientEvent::from_frame(r#"{"event":"subscribe:location","data":{}}"#).is_err());
        assert!(ClientEvent::from_frame("not json").is_err());
    }

    #[test]
    fn test_client_event_rejects_unknown_event() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"event": "subscribe:galaxy", "data": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_subscription_room_key() {
        let sub = LocationSubscription {
            lat: 13.08,
            lng: 80.27,
            radius: 1000.0,
        };
        assert_eq!(
            sub.room_key().unwrap().to_string(),
            "location:13.0800:80.2700:1000"
        );
    }

    #[test]
    fn test_server_event_names_match_wire() {
        let event = ServerEvent::Subscribed(SubscribedAck {
            room: "location:13.0800:80.2700:1000".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["room"], "location:13.0800:80.2700:1000");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
