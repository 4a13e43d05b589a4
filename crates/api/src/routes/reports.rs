//! Community report endpoint handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;
use domain::models::geo::GeoPoint;
use domain::models::incident::{IncidentEvent, IncidentType};
use domain::models::report::{SubmitReportRequest, SubmitReportResponse, DEFAULT_SEVERITY};
use domain::models::risk::{ProcessIncidentRequest, ProcessIncidentResponse};
use tracing::{info, warn};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

/// Broadcasts an accepted incident, then feeds it to the risk model.
///
/// Realtime delivery never waits on the ML service; a failed model update
/// yields `None` and the incident stays accepted.
pub(crate) async fn broadcast_and_process(
    state: &AppState,
    incident: &IncidentEvent,
    ml_request: ProcessIncidentRequest,
) -> Option<ProcessIncidentResponse> {
    state.hub.publish_incident(incident);

    match state.risk.process_incident(&ml_request).await {
        Ok(response) => Some(response),
        Err(e) => {
            warn!(
                incident_id = %incident.incident_id(),
                error = %e,
                "Incident accepted without model update"
            );
            None
        }
    }
}

/// Submit a community incident report.
///
/// POST /api/reports/submit
pub async fn submit_report(
    State(state): State<AppState>,
    payload: Result<Json<SubmitReportRequest>, JsonRejection>,
) -> Result<Json<SubmitReportResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let now = Utc::now();
    let incident_type = IncidentType::from_str_lossy(&request.report_type);
    let severity = request.severity.unwrap_or(DEFAULT_SEVERITY);
    let report_id = format!("report_{}_{}", now.timestamp_millis(), request.user_id);

    let incident = IncidentEvent::new(
        report_id.clone(),
        GeoPoint::new(request.location.latitude, request.location.longitude),
        incident_type,
        severity,
        request.timestamp.unwrap_or(now),
    )?;

    info!(
        report_id = %report_id,
        user_id = %request.user_id,
        incident_type = %incident_type,
        category = %request.category,
        severity,
        "Community report received"
    );

    let ml_request = ProcessIncidentRequest {
        category: Some(request.category.clone()),
        verified: false,
        user_id: Some(request.user_id.clone()),
        ..ProcessIncidentRequest::from_incident(&incident)
    };

    let ml_response = broadcast_and_process(&state, &incident, ml_request).await;

    Ok(Json(SubmitReportResponse {
        success: true,
        message: "Report submitted successfully".to_string(),
        report_id,
        timestamp: Utc::now(),
        ml_processed: ml_response.is_some_and(|r| r.success),
    }))
}
