//! Common test utilities for integration tests.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`, and
//! realtime clients are plain hub registrations whose frame queues the tests
//! read directly.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::models::realtime::{ClientEvent, ConnectionId, LocationSubscription};
use domain::services::{MockRiskService, RiskService};
use safety_map_api::{
    app::{build_router, AppState},
    config::{Config, LoggingConfig, MlServiceConfig, RealtimeConfig, SecurityConfig, ServerConfig},
    services::realtime_hub::Frame,
    services::RealtimeHub,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Test configuration pointing at an ML service nobody calls.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Use random port
            request_timeout_secs: 30,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            cors_origins: vec![],
        },
        ml_service: MlServiceConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 1000,
            circuit_breaker_failures: 3,
            circuit_breaker_reset_secs: 60,
            enabled: true,
        },
        realtime: RealtimeConfig { outbound_buffer: 16 },
    }
}

pub fn test_state(risk: MockRiskService) -> AppState {
    let risk: Arc<dyn RiskService> = Arc::new(risk);
    AppState::new(test_config(), risk)
}

/// Create a test application router over `state`.
pub fn create_test_app(state: &AppState) -> Router {
    build_router(state.clone())
}

/// Build a JSON request without authentication.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// A realtime client connected straight to the hub.
pub struct TestClient {
    pub id: ConnectionId,
    pub frames: mpsc::Receiver<Frame>,
}

impl TestClient {
    pub fn connect(hub: &RealtimeHub, user_id: Option<&str>) -> Self {
        let (id, frames) = hub.register(user_id.map(str::to_string));
        Self { id, frames }
    }

    /// Joins a viewport room and discards the acknowledgement.
    pub fn subscribe_location(&mut self, hub: &RealtimeHub, lat: f64, lng: f64, radius: f64) {
        hub.handle_client_event(
            self.id,
            ClientEvent::SubscribeLocation(LocationSubscription { lat, lng, radius }),
        );
        let ack = self.drain();
        assert_eq!(ack.len(), 1, "expected one subscription ack");
        assert_eq!(ack[0]["event"], "subscribed");
    }

    pub fn subscribe_incidents(&self, hub: &RealtimeHub) {
        hub.handle_client_event(self.id, ClientEvent::SubscribeIncidents);
    }

    /// Frames queued so far, decoded.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }

    /// Decoded frames carrying `event`.
    pub fn events(&mut self, event: &str) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|frame| frame["event"] == event)
            .collect()
    }
}

/// A valid community report body around `(lat, lng)`.
pub fn report_body(user_id: &str, lat: f64, lng: f64) -> Value {
    use fake::faker::lorem::en::Sentence;
    use fake::Fake;

    let description: String = Sentence(4..10).fake();
    serde_json::json!({
        "userId": user_id,
        "type": "community_report",
        "category": "harassment",
        "description": description,
        "severity": 4,
        "location": {"latitude": lat, "longitude": lng}
    })
}
