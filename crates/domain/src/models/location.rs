//! Location update and heatmap query models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request payload for a user location update.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy: Option<f64>,

    pub timestamp: Option<DateTime<Utc>>,
}

/// Risk summary attached to a location update response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: String,
    pub is_high_risk: bool,
}

/// Response payload for a location update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub risk_assessment: RiskAssessment,
}

/// Query string of the heatmap endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HeatmapParams {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub lat: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub lng: f64,

    #[serde(default = "default_radius")]
    #[validate(custom(function = "shared::validation::validate_radius_meters"))]
    pub radius: f64,

    #[serde(default = "default_grid_size")]
    #[validate(range(min = 10.0, max = 1000.0, message = "grid_size must be between 10 and 1000 meters"))]
    pub grid_size: f64,

    #[validate(custom(function = "shared::validation::validate_local_hour"))]
    pub local_hour: Option<u32>,

    pub timezone_offset_minutes: Option<i32>,
}

fn default_radius() -> f64 {
    1000.0
}

fn default_grid_size() -> f64 {
    100.0
}
