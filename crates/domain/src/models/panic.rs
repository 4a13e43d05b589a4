//! Panic alert domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::report::ReportLocation;

/// Severity of every panic alert.
pub const PANIC_SEVERITY: u8 = 5;

/// An emergency contact notified on panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Request payload for triggering a panic alert.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PanicTriggerRequest {
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,

    #[validate(nested)]
    pub location: ReportLocation,

    pub emergency_contacts: Vec<EmergencyContact>,

    #[serde(default)]
    pub panic_type: Option<String>,

    #[serde(default, rename = "timezone_offset_minutes")]
    pub timezone_offset_minutes: Option<i32>,
}

/// Side effects reported back to the panicking user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanicActions {
    pub contacts_notified: usize,
    pub authorities_alerted: bool,
    pub location_tracking_started: bool,
}

/// Risk-model side effects of a panic alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlProcessingSummary {
    pub affected_zones: Vec<String>,
    pub model_updated: bool,
}

/// Response payload for a panic trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanicTriggerResponse {
    pub success: bool,
    pub panic_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub actions: PanicActions,
    pub ml_processing: Option<MlProcessingSummary>,
}
