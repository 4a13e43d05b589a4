//! Panic alert endpoint handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;
use domain::models::geo::GeoPoint;
use domain::models::incident::{IncidentEvent, IncidentType};
use domain::models::panic::{
    MlProcessingSummary, PanicActions, PanicTriggerRequest, PanicTriggerResponse, PANIC_SEVERITY,
};
use domain::models::risk::ProcessIncidentRequest;
use tracing::warn;
use validator::Validate;

use super::reports::broadcast_and_process;
use crate::app::AppState;
use crate::error::ApiError;

/// Trigger an emergency panic alert.
///
/// POST /api/panic/trigger
///
/// The alert is broadcast like any other incident with maximum severity.
pub async fn trigger_panic(
    State(state): State<AppState>,
    payload: Result<Json<PanicTriggerRequest>, JsonRejection>,
) -> Result<Json<PanicTriggerResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let now = Utc::now();
    let panic_id = format!("panic_{}", now.timestamp_millis());

    let incident = IncidentEvent::new(
        panic_id.clone(),
        GeoPoint::new(request.location.latitude, request.location.longitude),
        IncidentType::PanicAlert,
        PANIC_SEVERITY,
        now,
    )?;

    warn!(
        panic_id = %panic_id,
        user_id = %request.user_id,
        panic_type = request.panic_type.as_deref().unwrap_or("manual"),
        contacts = request.emergency_contacts.len(),
        "Panic alert received"
    );

    let ml_request = ProcessIncidentRequest {
        category: Some("emergency".to_string()),
        verified: true,
        user_id: Some(request.user_id.clone()),
        timezone_offset_minutes: request.timezone_offset_minutes,
        ..ProcessIncidentRequest::from_incident(&incident)
    };

    let ml_processing = broadcast_and_process(&state, &incident, ml_request)
        .await
        .map(|response| MlProcessingSummary {
            affected_zones: response.affected_zones,
            model_updated: response.model_updated,
        });

    Ok(Json(PanicTriggerResponse {
        success: true,
        panic_id,
        message: "Emergency alert triggered successfully".to_string(),
        timestamp: now,
        actions: PanicActions {
            contacts_notified: request.emergency_contacts.len(),
            authorities_alerted: true,
            location_tracking_started: true,
        },
        ml_processing,
    }))
}
