//! Location update and heatmap endpoint handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::{Duration, Local, Timelike, Utc};
use domain::models::geo::{GeoPoint, RoomKey};
use domain::models::heatmap::{Heatmap, HeatmapQuery, HeatmapResponse};
use domain::models::location::{
    HeatmapParams, LocationUpdateRequest, LocationUpdateResponse, RiskAssessment,
};
use domain::models::realtime::RiskAlert;
use domain::models::risk::RiskScore;
use tracing::{info, warn};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

pub const ML_UNAVAILABLE_WARNING: &str = "ML service unavailable - showing empty heatmap";

/// How long clients should wait before asking for the same heatmap again.
const HEATMAP_REFRESH_INTERVAL_SECS: i64 = 30;

const HIGH_RISK_MESSAGE: &str = "You are entering a high-risk area. Stay alert.";

/// Record a user's position and assess its risk.
///
/// POST /api/location/update
///
/// A high-risk score also pushes a `risk:alert` to the user's realtime
/// channel. An unreachable ML service scores the location as very safe.
pub async fn update_location(
    State(state): State<AppState>,
    payload: Result<Json<LocationUpdateRequest>, JsonRejection>,
) -> Result<Json<LocationUpdateResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let location = GeoPoint::new(request.latitude, request.longitude);
    info!(
        user_id = %request.user_id,
        accuracy = ?request.accuracy,
        "Location update received"
    );

    let score = match state.risk.risk_score(location).await {
        Ok(score) => score,
        Err(e) => {
            warn!(error = %e, "Risk score unavailable, assuming safe");
            RiskScore::safe_default(location)
        }
    };

    let is_high_risk = score.is_high_risk();
    let now = Utc::now();

    if is_high_risk {
        let delivered = state.hub.publish_risk_alert(RiskAlert {
            user_id: request.user_id.clone(),
            location,
            risk_score: score.risk_score,
            risk_level: score.risk_level.clone(),
            message: HIGH_RISK_MESSAGE.to_string(),
            timestamp: now,
        });
        info!(
            user_id = %request.user_id,
            risk_score = score.risk_score,
            delivered,
            "High-risk alert raised"
        );
    }

    Ok(Json(LocationUpdateResponse {
        success: true,
        message: "Location updated successfully".to_string(),
        timestamp: now,
        risk_assessment: RiskAssessment {
            risk_score: score.risk_score,
            risk_level: score.risk_level,
            is_high_risk,
        },
    }))
}

/// Get the safety heatmap around a point.
///
/// GET /api/location/heatmap
///
/// Falls back to an empty heatmap with a warning when the ML service is
/// unavailable. A fresh heatmap is also pushed to the matching viewport room.
pub async fn get_heatmap(
    State(state): State<AppState>,
    params: Result<Query<HeatmapParams>, QueryRejection>,
) -> Result<Json<HeatmapResponse>, ApiError> {
    let Query(params) = params?;
    params.validate()?;

    let query = HeatmapQuery {
        lat: params.lat,
        lng: params.lng,
        radius: params.radius,
        grid_size: params.grid_size,
        local_hour: params.local_hour.unwrap_or_else(|| Local::now().hour()),
        timezone_offset_minutes: params.timezone_offset_minutes,
    };
    let now = Utc::now();

    let heatmap = match state.risk.heatmap(&query).await {
        Ok(heatmap) => heatmap,
        Err(e) => {
            warn!(error = %e, lat = query.lat, lng = query.lng, "Serving empty heatmap");
            return Ok(Json(HeatmapResponse {
                success: true,
                heatmap: Heatmap::empty(&query),
                timestamp: now,
                warning: Some(ML_UNAVAILABLE_WARNING.to_string()),
                error: None,
            }));
        }
    };

    let heatmap = Heatmap {
        calculated_at: heatmap.calculated_at.or(Some(now)),
        next_update_recommended: Some(now + Duration::seconds(HEATMAP_REFRESH_INTERVAL_SECS)),
        ..heatmap
    };

    if let Ok(room) = RoomKey::new(GeoPoint::new(query.lat, query.lng), query.radius) {
        state.hub.publish_heatmap(&room, heatmap.clone());
    }

    info!(
        lat = query.lat,
        lng = query.lng,
        radius = query.radius,
        cells = heatmap.cells.len(),
        "Heatmap served"
    );

    Ok(Json(HeatmapResponse {
        success: true,
        heatmap,
        timestamp: now,
        warning: None,
        error: None,
    }))
}
