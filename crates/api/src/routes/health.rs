//! Health check endpoint handlers.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppState;

pub const SERVICE_NAME: &str = "safety-map-api";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub ml_service: MlServiceHealth,
    pub realtime: RealtimeHealth,
}

/// ML service health as seen by the gateway, without issuing a request.
#[derive(Debug, Serialize)]
pub struct MlServiceHealth {
    /// Whether the ML service is switched on in configuration.
    pub enabled: bool,
    /// Whether requests are currently let through.
    pub available: bool,
    pub circuit_state: String,
}

#[derive(Debug, Serialize)]
pub struct RealtimeHealth {
    pub connections: usize,
    pub rooms: usize,
}

/// Simple status response for liveness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
///
/// Always `200`: an unavailable ML service degrades responses but does not
/// take the API down.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ml_status = state.risk.status();

    Json(HealthResponse {
        status: "OK".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        ml_service: MlServiceHealth {
            enabled: state.config.ml_service.enabled,
            available: ml_status.available,
            circuit_state: ml_status.circuit_state,
        },
        realtime: RealtimeHealth {
            connections: state.hub.connection_count(),
            rooms: state.hub.room_count(),
        },
    })
}

/// Liveness probe endpoint.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "OK".to_string(),
            service: SERVICE_NAME.to_string(),
            version: "0.3.0".to_string(),
            timestamp: Utc::now(),
            ml_service: MlServiceHealth {
                enabled: true,
                available: false,
                circuit_state: "open".to_string(),
            },
            realtime: RealtimeHealth {
                connections: 2,
                rooms: 1,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["service"], "safety-map-api");
        assert_eq!(json["ml_service"]["circuit_state"], "open");
        assert_eq!(json["realtime"]["connections"], 2);
    }

    #[tokio::test]
    async fn test_live() {
        let Json(response) = live().await;
        assert_eq!(response.status, "alive");
    }
}
