//! Realtime connection hub.
//!
//! Owns the geo-room index, the named channels and one bounded outbound queue
//! per WebSocket connection. A single mutex covers all three, and every
//! join, leave and fan-out pass runs under it to completion, so an incident
//! sees one consistent snapshot of the rooms.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use domain::models::geo::RoomKey;
use domain::models::heatmap::Heatmap;
use domain::models::incident::IncidentEvent;
use domain::models::realtime::{
    Channel, ClientEvent, ConnectionId, RiskAlert, ServerEvent, SubscribedAck,
};
use domain::services::{
    emit_heatmap_update, emit_risk_alert, fan_out_incident, EventSink, FanoutReport, GeoRoomIndex,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::middleware::metrics::{record_dropped_frame, record_fanout, record_realtime_connections};

/// Serialized frame shared by every recipient of one event.
pub type Frame = Arc<str>;

struct ConnectionHandle {
    tx: mpsc::Sender<Frame>,
    user_id: Option<String>,
}

#[derive(Default)]
struct HubState {
    index: GeoRoomIndex,
    channels: HashMap<Channel, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl HubState {
    fn join_channel(&mut self, connection: ConnectionId, channel: Channel) {
        self.channels.entry(channel).or_default().insert(connection);
    }

    fn leave_channels(&mut self, connection: ConnectionId) {
        self.channels.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }
}

/// Read-only view of the hub used as the fan-out sink.
struct HubSink<'a> {
    state: &'a HubState,
}

impl HubSink<'_> {
    fn deliver<'c>(
        &self,
        recipients: impl Iterator<Item = &'c ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let mut delivered = 0;
        for id in recipients {
            if send_frame(self.state, *id, event.name(), frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl EventSink for HubSink<'_> {
    fn emit_to_room(&self, room: &RoomKey, event: &ServerEvent) -> usize {
        let members: Vec<ConnectionId> = self.state.index.members(room).collect();
        self.deliver(members.iter(), event)
    }

    fn emit_to_channel(&self, channel: &Channel, event: &ServerEvent) -> usize {
        match self.state.channels.get(channel) {
            Some(members) => self.deliver(members.iter(), event),
            None => 0,
        }
    }

    fn channel_has_subscribers(&self, channel: &Channel) -> bool {
        self.state
            .channels
            .get(channel)
            .is_some_and(|members| !members.is_empty())
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to encode realtime event");
            None
        }
    }
}

/// Queues `frame` for one connection without waiting.
///
/// A full queue drops the frame for that connection only.
fn send_frame(state: &HubState, id: ConnectionId, event: &'static str, frame: Frame) -> bool {
    let Some(handle) = state.connections.get(&id) else {
        return false;
    };
    match handle.tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection_id = %id, event, "Outbound queue full, dropping frame");
            record_dropped_frame(event);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection_id = %id, event, "Connection closed before delivery");
            record_dropped_frame(event);
            false
        }
    }
}

/// Shared registry of realtime connections and their subscriptions.
pub struct RealtimeHub {
    state: Mutex<HubState>,
    outbound_buffer: usize,
}

impl RealtimeHub {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection and returns its outbound frame queue.
    ///
    /// A connection opened for a user joins that user's alert channel.
    pub fn register(&self, user_id: Option<String>) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.outbound_buffer);

        let mut state = self.lock();
        if let Some(user) = &user_id {
            state.join_channel(id, Channel::User(user.clone()));
        }
        state.connections.insert(id, ConnectionHandle { tx, user_id });
        record_realtime_connections(state.connections.len());
        drop(state);

        info!(connection_id = %id, "Realtime client connected");
        (id, rx)
    }

    /// Removes a connection from every room and channel.
    pub fn unregister(&self, id: ConnectionId) {
        let mut state = self.lock();
        let room = state.index.leave_all(id);
        state.leave_channels(id);
        let handle = state.connections.remove(&id);
        record_realtime_connections(state.connections.len());
        drop(state);

        if handle.is_some() {
            info!(
                connection_id = %id,
                room = ?room.map(|r| r.to_string()),
                "Realtime client disconnected"
            );
        }
    }

    /// Parses and applies one inbound text frame.
    pub fn handle_frame(&self, id: ConnectionId, text: &str) {
        match ClientEvent::from_frame(text) {
            Ok(event) => self.handle_client_event(id, event),
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Unrecognized client frame");
                self.send_to(
                    id,
                    &ServerEvent::Error {
                        message: "Unrecognized event".to_string(),
                    },
                );
            }
        }
    }

    /// Applies a client subscription event.
    pub fn handle_client_event(&self, id: ConnectionId, event: ClientEvent) {
        let mut state = self.lock();
        if !state.connections.contains_key(&id) {
            return;
        }

        match event {
            ClientEvent::SubscribeLocation(sub) => {
                let reply = match state.index.join(id, sub.center(), sub.radius) {
                    Ok(room) => {
                        debug!(connection_id = %id, room = %room, "Joined viewport room");
                        ServerEvent::Subscribed(SubscribedAck {
                            room: room.to_string(),
                        })
                    }
                    Err(e) => {
                        debug!(connection_id = %id, error = %e, "Rejected viewport subscription");
                        ServerEvent::Error { message: e.to_string() }
                    }
                };
                if let Some(frame) = encode(&reply) {
                    send_frame(&state, id, reply.name(), frame);
                }
            }
            ClientEvent::UnsubscribeLocation(sub) => {
                if state.index.leave(id, sub.center(), sub.radius) {
                    debug!(connection_id = %id, "Left viewport room");
                }
            }
            ClientEvent::SubscribeIncidents => {
                state.join_channel(id, Channel::AllIncidents);
                debug!(connection_id = %id, "Subscribed to all incidents");
            }
        }
    }

    /// Fans an incident out to the global channel and every matching room.
    pub fn publish_incident(&self, incident: &IncidentEvent) -> FanoutReport {
        let state = self.lock();
        let sink = HubSink { state: &state };
        let report = fan_out_incident(&state.index, &sink, incident, Utc::now());
        drop(state);

        record_fanout(incident.incident_type().as_str(), &report);
        info!(
            incident_id = %incident.incident_id(),
            incident_type = %incident.incident_type(),
            rooms_matched = report.rooms_matched,
            deliveries = report.total_deliveries(),
            "Incident broadcast"
        );
        report
    }

    /// Pushes a heatmap to the members of `room`.
    pub fn publish_heatmap(&self, room: &RoomKey, heatmap: Heatmap) -> usize {
        let state = self.lock();
        emit_heatmap_update(&HubSink { state: &state }, room, heatmap, Utc::now())
    }

    /// Sends a risk alert to the user's channel.
    pub fn publish_risk_alert(&self, alert: RiskAlert) -> usize {
        let state = self.lock();
        emit_risk_alert(&HubSink { state: &state }, alert)
    }

    fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> bool {
        let state = self.lock();
        match encode(event) {
            Some(frame) => send_frame(&state, id, event.name(), frame),
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.lock().index.room_count()
    }

    /// User the connection was opened for, if any.
    pub fn user_of(&self, id: ConnectionId) -> Option<String> {
        self.lock()
            .connections
            .get(&id)
            .and_then(|handle| handle.user_id.clone())
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::geo::GeoPoint;
    use domain::models::incident::IncidentType;
    use domain::models::realtime::LocationSubscription;
    use serde_json::Value;

    fn subscribe(hub: &RealtimeHub, id: ConnectionId, lat: f64, lng: f64, radius: f64) {
        hub.handle_client_event(
            id,
            ClientEvent::SubscribeLocation(LocationSubscription { lat, lng, radius }),
        );
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    fn incident(lat: f64, lng: f64) -> IncidentEvent {
        IncidentEvent::new(
            "report_1700000000000_user-1",
            GeoPoint::new(lat, lng),
            IncidentType::CommunityReport,
            3,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_subscribe_acknowledges_room() {
        let hub = RealtimeHub::new(8);
        let (id, mut rx) = hub.register(None);

        subscribe(&hub, id, 13.08, 80.27, 1000.0);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "subscribed");
        assert_eq!(frames[0]["data"]["room"], "location:13.0800:80.2700:1000");
        assert_eq!(hub.room_count(), 1);
    }

    #[test]
    fn test_invalid_subscription_is_rejected() {
        let hub = RealtimeHub::new(8);
        let (id, mut rx) = hub.register(None);

        subscribe(&hub, id, 13.08, 80.27, -5.0);

        let frames = drain(&mut rx);
        assert_eq!(frames[0]["event"], "error");
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn test_only_matching_room_receives_incident() {
        let hub = RealtimeHub::new(8);
        let (near, mut near_rx) = hub.register(None);
        let (far, mut far_rx) = hub.register(None);
        subscribe(&hub, near, 13.08, 80.27, 1000.0);
        subscribe(&hub, far, 13.50, 80.50, 500.0);
        drain(&mut near_rx);
        drain(&mut far_rx);

        let report = hub.publish_incident(&incident(13.081, 80.271));

        assert_eq!(report.rooms_scanned, 2);
        assert_eq!(report.rooms_matched, 1);
        let near_frames = drain(&mut near_rx);
        assert_eq!(near_frames.len(), 1);
        assert_eq!(near_frames[0]["event"], "incident:new");
        assert!(drain(&mut far_rx).is_empty());
    }

    #[test]
    fn test_global_subscriber_receives_every_incident() {
        let hub = RealtimeHub::new(8);
        let (id, mut rx) = hub.register(None);
        hub.handle_client_event(id, ClientEvent::SubscribeIncidents);

        let report = hub.publish_incident(&incident(-33.87, 151.21));

        assert_eq!(report.global_deliveries, 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_unregister_cleans_rooms_and_channels() {
        let hub = RealtimeHub::new(8);
        let (id, _rx) = hub.register(Some("user-1".into()));
        subscribe(&hub, id, 13.08, 80.27, 1000.0);
        hub.handle_client_event(id, ClientEvent::SubscribeIncidents);
        assert_eq!(hub.user_of(id).as_deref(), Some("user-1"));

        hub.unregister(id);

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.room_count(), 0);
        assert!(hub.lock().channels.is_empty());
        assert_eq!(hub.publish_incident(&incident(13.08, 80.27)).total_deliveries(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking_others() {
        let hub = RealtimeHub::new(1);
        let (slow, _slow_rx) = hub.register(None);
        let (fast, mut fast_rx) = hub.register(None);
        hub.handle_client_event(slow, ClientEvent::SubscribeIncidents);
        hub.handle_client_event(fast, ClientEvent::SubscribeIncidents);

        hub.publish_incident(&incident(13.08, 80.27));
        drain(&mut fast_rx);
        let second = hub.publish_incident(&incident(13.08, 80.27));

        assert_eq!(second.global_deliveries, 1);
        assert_eq!(drain(&mut fast_rx).len(), 1);
    }

    #[test]
    fn test_risk_alert_reaches_user_channel_only() {
        let hub = RealtimeHub::new(8);
        let (_alice, mut alice_rx) = hub.register(Some("alice".into()));
        let (_bob, mut bob_rx) = hub.register(Some("bob".into()));

        let delivered = hub.publish_risk_alert(RiskAlert {
            user_id: "alice".into(),
            location: GeoPoint::new(13.08, 80.27),
            risk_score: 4.5,
            risk_level: "high".into(),
            message: "You are entering a high-risk area".into(),
            timestamp: Utc::now(),
        });

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut alice_rx)[0]["event"], "risk:alert");
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_malformed_frame_gets_error_reply() {
        let hub = RealtimeHub::new(8);
        let (id, mut rx) = hub.register(None);

        hub.handle_frame(id, "{\"event\":\"subscribe:galaxy\"}");
        hub.handle_frame(id, "not json");

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f["event"] == "error"));
    }
}
