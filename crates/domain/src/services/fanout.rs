//! Incident fan-out.
//!
//! Delivers one incident to the global incident channel and to every viewport
//! room whose circle contains it. Delivery is best-effort: the sink decides
//! what a failed send means for a single connection, and the pass always
//! continues with the remaining rooms.

use chrono::{DateTime, Utc};

use super::room_index::GeoRoomIndex;
use crate::models::geo::RoomKey;
use crate::models::heatmap::Heatmap;
use crate::models::incident::IncidentEvent;
use crate::models::realtime::{Channel, HeatmapUpdate, RiskAlert, ServerEvent};

/// Destination for outbound realtime events.
///
/// Emits are synchronous so a fan-out pass runs to completion without
/// yielding. Each method returns the number of connections the event was
/// handed to.
pub trait EventSink {
    /// Emits to every member of `room`.
    fn emit_to_room(&self, room: &RoomKey, event: &ServerEvent) -> usize;

    /// Emits to every subscriber of `channel`.
    fn emit_to_channel(&self, channel: &Channel, event: &ServerEvent) -> usize;

    fn channel_has_subscribers(&self, channel: &Channel) -> bool;
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub rooms_scanned: usize,
    pub rooms_matched: usize,
    pub room_deliveries: usize,
    pub global_deliveries: usize,
}

impl FanoutReport {
    pub fn total_deliveries(&self) -> usize {
        self.room_deliveries + self.global_deliveries
    }
}

/// Fans `incident` out to the global channel and all matching rooms.
///
/// The caller must keep `index` stable for the whole pass; rooms joined after
/// the call starts are not visited.
pub fn fan_out_incident(
    index: &GeoRoomIndex,
    sink: &dyn EventSink,
    incident: &IncidentEvent,
    delivered_at: DateTime<Utc>,
) -> FanoutReport {
    let event = ServerEvent::IncidentNew(incident.to_payload(delivered_at));
    let position = incident.position();
    let mut report = FanoutReport::default();

    if sink.channel_has_subscribers(&Channel::AllIncidents) {
        report.global_deliveries = sink.emit_to_channel(&Channel::AllIncidents, &event);
    }

    for room in index.all_rooms() {
        report.rooms_scanned += 1;
        let distance = room.center.distance_meters(&position);
        if distance <= room.radius_meters {
            report.rooms_matched += 1;
            report.room_deliveries += sink.emit_to_room(&room.key, &event);
        }
    }

    tracing::debug!(
        incident_id = %incident.incident_id(),
        rooms_scanned = report.rooms_scanned,
        rooms_matched = report.rooms_matched,
        deliveries = report.total_deliveries(),
        "Incident fan-out complete"
    );

    report
}

/// Pushes a freshly computed heatmap to the room that requested it.
pub fn emit_heatmap_update(
    sink: &dyn EventSink,
    room: &RoomKey,
    heatmap: Heatmap,
    timestamp: DateTime<Utc>,
) -> usize {
    let center = room.center();
    let event = ServerEvent::HeatmapUpdate(HeatmapUpdate {
        lat: center.lat,
        lng: center.lng,
        radius: room.radius_meters(),
        heatmap,
        timestamp,
    });
    sink.emit_to_room(room, &event)
}

/// Sends a risk alert to the alerted user's personal channel.
pub fn emit_risk_alert(sink: &dyn EventSink, alert: RiskAlert) -> usize {
    let channel = Channel::User(alert.user_id.clone());
    sink.emit_to_channel(&channel, &ServerEvent::RiskAlert(alert))
}
