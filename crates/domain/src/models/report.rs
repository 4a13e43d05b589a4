//! Community report domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Severity assumed when a report does not carry one.
pub const DEFAULT_SEVERITY: u8 = 3;

/// Coordinates as sent by the mobile client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct ReportLocation {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,
}

/// Request payload for submitting a community report.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest {
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,

    /// Raw incident type; unknown values fall back to `community_report`.
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "type is required"))]
    pub report_type: String,

    #[validate(length(min = 1, max = 100, message = "category must be 1-100 characters"))]
    pub category: String,

    #[validate(length(min = 1, max = 2000, message = "description must be 1-2000 characters"))]
    pub description: String,

    #[validate(custom(function = "shared::validation::validate_severity"))]
    pub severity: Option<u8>,

    #[validate(nested)]
    pub location: ReportLocation,

    pub timestamp: Option<DateTime<Utc>>,
}

/// Response payload for a submitted report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportResponse {
    pub success: bool,
    pub message: String,
    pub report_id: String,
    pub timestamp: DateTime<Utc>,
    pub ml_processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::lorem::en::Sentence;
    use fake::Fake;
    use serde_json::json;

    fn valid_body() -> serde_json::Value {
        let description: String = Sentence(3..8).fake();
        json!({
            "userId": "user-1",
            "type": "community_report",
            "category": "harassment",
            "description": description,
            "severity": 4,
            "location": {"latitude": 13.081, "longitude": 80.271}
        })
    }

    #[test]
    fn test_valid_report_passes() {
        let request: SubmitReportRequest = serde_json::from_value(valid_body()).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.report_type, "community_report");
        assert!(request.timestamp.is_none());
    }

    #[test]
    fn test_severity_out_of_range_fails() {
        let mut body = valid_body();
        body["severity"] = json!(7);
        let request: SubmitReportRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_missing_severity_is_allowed() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("severity");
        let request: SubmitReportRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.severity.unwrap_or(DEFAULT_SEVERITY), 3);
    }

    #[test]
    fn test_invalid_coordinates_fail() {
        let mut body = valid_body();
        body["location"]["latitude"] = json!(123.0);
        let request: SubmitReportRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_empty_description_fails() {
        let mut body = valid_body();
        body["description"] = json!("");
        let request: SubmitReportRequest = serde_json::from_value(body).unwrap();
        assert!(request.validate().is_err());
    }
}
