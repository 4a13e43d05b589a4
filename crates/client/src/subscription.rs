//! Client subscription manager.
//!
//! Holds at most one active viewport subscription plus the incident and
//! risk-alert callbacks. Outgoing frames are queued in an outbox that the
//! connection driver drains; nothing is queued while disconnected, and the
//! recorded subscriptions are replayed on every (re)connect.
//!
//! Inbound events are routed to a [`Delivery`] instead of being invoked in
//! place, so the owner can release its lock on the manager before user
//! callbacks run.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use domain::models::geo::{GeoPoint, RoomKey};
use domain::models::incident::NewIncidentPayload;
use domain::models::realtime::{
    ClientEvent, HeatmapUpdate, LocationSubscription, RiskAlert, ServerEvent,
};
use domain::ValidationError;
use tokio::time::Instant;

use crate::config::DedupSettings;
use crate::dedup::DedupCache;

pub type HeatmapCallback = Box<dyn FnMut(HeatmapUpdate) + Send>;
pub type IncidentCallback = Box<dyn FnMut(NewIncidentPayload) + Send>;
pub type RiskAlertCallback = Box<dyn FnMut(RiskAlert) + Send>;

pub type SharedCallback<T> = Arc<Mutex<Box<dyn FnMut(T) + Send>>>;

fn share<T>(callback: Box<dyn FnMut(T) + Send>) -> SharedCallback<T> {
    Arc::new(Mutex::new(callback))
}

fn invoke<T>(callback: &SharedCallback<T>, value: T) {
    let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
    callback(value)
}

/// A routed server event waiting for its callback to be invoked.
#[must_use = "a delivery does nothing until it is run"]
pub enum Delivery {
    Heatmap(SharedCallback<HeatmapUpdate>, HeatmapUpdate),
    Incident(SharedCallback<NewIncidentPayload>, NewIncidentPayload),
    RiskAlert(SharedCallback<RiskAlert>, RiskAlert),
}

impl Delivery {
    pub fn run(self) {
        match self {
            Delivery::Heatmap(callback, update) => invoke(&callback, update),
            Delivery::Incident(callback, incident) => invoke(&callback, incident),
            Delivery::RiskAlert(callback, alert) => invoke(&callback, alert),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Heatmap(..) => write!(f, "Delivery::Heatmap"),
            Delivery::Incident(_, incident) => {
                write!(f, "Delivery::Incident({})", incident.incident_id)
            }
            Delivery::RiskAlert(..) => write!(f, "Delivery::RiskAlert"),
        }
    }
}

/// Connection lifecycle as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

struct ActiveViewport {
    key: RoomKey,
    params: LocationSubscription,
    on_update: SharedCallback<HeatmapUpdate>,
}

pub struct SubscriptionManager {
    state: ConnectionState,
    viewport: Option<ActiveViewport>,
    on_incident: Option<SharedCallback<NewIncidentPayload>>,
    on_risk_alert: Option<SharedCallback<RiskAlert>>,
    dedup: DedupCache,
    outbox: VecDeque<ClientEvent>,
}

impl SubscriptionManager {
    pub fn new(dedup: &DedupSettings) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            viewport: None,
            on_incident: None,
            on_risk_alert: None,
            dedup: DedupCache::new(dedup),
            outbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Key of the active viewport subscription.
    pub fn active_room(&self) -> Option<RoomKey> {
        self.viewport.as_ref().map(|v| v.key)
    }

    /// Subscribes to heatmap updates for the viewport around `center`.
    ///
    /// Re-subscribing to the active room only swaps the callback. Moving to a
    /// different room unsubscribes from the old one first.
    pub fn subscribe_to_viewport(
        &mut self,
        center: GeoPoint,
        radius_meters: f64,
        on_update: HeatmapCallback,
    ) -> Result<RoomKey, ValidationError> {
        let key = RoomKey::new(center, radius_meters)?;

        if let Some(active) = self.viewport.as_mut() {
            if active.key == key {
                active.on_update = share(on_update);
                return Ok(key);
            }
        }

        if let Some(previous) = self.viewport.take() {
            self.emit(ClientEvent::UnsubscribeLocation(previous.params));
        }

        let params = LocationSubscription {
            lat: center.lat,
            lng: center.lng,
            radius: radius_meters,
        };
        self.emit(ClientEvent::SubscribeLocation(params));
        self.viewport = Some(ActiveViewport {
            key,
            params,
            on_update: share(on_update),
        });

        tracing::debug!(room = %key, "Viewport subscription active");
        Ok(key)
    }

    /// Drops the active viewport subscription, if any.
    pub fn unsubscribe_from_viewport(&mut self) {
        if let Some(previous) = self.viewport.take() {
            self.emit(ClientEvent::UnsubscribeLocation(previous.params));
            tracing::debug!(room = %previous.key, "Viewport subscription cleared");
        }
    }

    /// Joins the global incident feed. Later calls only replace the callback.
    pub fn subscribe_to_incidents(&mut self, on_incident: IncidentCallback) {
        let first = self.on_incident.is_none();
        self.on_incident = Some(share(on_incident));
        if first {
            self.emit(ClientEvent::SubscribeIncidents);
        }
    }

    /// Registers the callback for `risk:alert` events on the user channel.
    pub fn subscribe_to_risk_alerts(&mut self, on_alert: RiskAlertCallback) {
        self.on_risk_alert = Some(share(on_alert));
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Marks the transport as up and replays recorded subscriptions.
    pub fn on_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.outbox.clear();

        if self.on_incident.is_some() {
            self.outbox.push_back(ClientEvent::SubscribeIncidents);
        }
        if let Some(active) = &self.viewport {
            self.outbox
                .push_back(ClientEvent::SubscribeLocation(active.params));
        }

        tracing::info!(replayed = self.outbox.len(), "Realtime connected");
    }

    /// Marks the transport as down. Recorded subscriptions are kept for replay.
    pub fn on_disconnected(&mut self) {
        if self.state == ConnectionState::Connected {
            tracing::info!("Realtime disconnected; continuing without live updates");
        }
        self.state = ConnectionState::Disconnected;
        self.outbox.clear();
    }

    /// Forgets every subscription and callback.
    pub fn reset(&mut self) {
        self.viewport = None;
        self.on_incident = None;
        self.on_risk_alert = None;
        self.outbox.clear();
        self.state = ConnectionState::Disconnected;
    }

    /// Takes the frames queued for sending.
    pub fn drain_outbox(&mut self) -> Vec<ClientEvent> {
        self.outbox.drain(..).collect()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Routes an inbound server event to the matching callback.
    ///
    /// The callback is not invoked here; run the returned delivery once the
    /// manager is no longer borrowed.
    pub fn handle_event(&mut self, event: ServerEvent) -> Option<Delivery> {
        match event {
            ServerEvent::IncidentNew(incident) => {
                if !self
                    .dedup
                    .check_and_record(&incident.incident_id, Instant::now())
                {
                    tracing::trace!(incident_id = %incident.incident_id, "Duplicate incident dropped");
                    return None;
                }
                let callback = Arc::clone(self.on_incident.as_ref()?);
                Some(Delivery::Incident(callback, incident))
            }
            ServerEvent::HeatmapUpdate(update) => {
                let callback = Arc::clone(&self.viewport.as_ref()?.on_update);
                Some(Delivery::Heatmap(callback, update))
            }
            ServerEvent::RiskAlert(alert) => {
                let callback = Arc::clone(self.on_risk_alert.as_ref()?);
                Some(Delivery::RiskAlert(callback, alert))
            }
            ServerEvent::Subscribed(ack) => {
                tracing::debug!(room = %ack.room, "Subscribed to location room");
                None
            }
            ServerEvent::Error { message } => {
                tracing::warn!(error = %message, "Server rejected realtime request");
                None
            }
        }
    }

    fn emit(&mut self, frame: ClientEvent) {
        if self.state == ConnectionState::Connected {
            self.outbox.push_back(frame);
        }
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("state", &self.state)
            .field("active_room", &self.active_room())
            .field("incidents", &self.on_incident.is_some())
            .field("outbox", &self.outbox.len())
            .finish()
    }
}
