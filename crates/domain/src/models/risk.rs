//! Risk-scoring service contract types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;
use super::incident::{IncidentEvent, IncidentType};

/// Risk score at or above which a location counts as high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 4.0;

/// Incident submitted to the risk service for model updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessIncidentRequest {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i32>,
}

impl ProcessIncidentRequest {
    pub fn from_incident(incident: &IncidentEvent) -> Self {
        let position = incident.position();
        Self {
            id: incident.incident_id().to_string(),
            latitude: position.lat,
            longitude: position.lng,
            timestamp: incident.timestamp(),
            incident_type: incident.incident_type(),
            severity: incident.severity(),
            category: None,
            verified: false,
            user_id: None,
            timezone_offset_minutes: None,
        }
    }
}

/// Result of incident processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessIncidentResponse {
    pub success: bool,
    pub incident_id: String,
    #[serde(default)]
    pub affected_zones: Vec<String>,
    #[serde(default)]
    pub model_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Risk assessment for a single location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub location: GeoPoint,
    pub risk_score: f64,
    pub risk_level: String,
    #[serde(default)]
    pub factors: serde_json::Value,
}

impl RiskScore {
    /// Neutral score reported when the risk service cannot be reached.
    pub fn safe_default(location: GeoPoint) -> Self {
        Self {
            location,
            risk_score: 0.0,
            risk_level: "very_safe".to_string(),
            factors: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_score >= HIGH_RISK_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_request_from_incident() {
        let incident = IncidentEvent::new(
            "panic_1700000000000",
            GeoPoint::new(13.08, 80.27),
            IncidentType::PanicAlert,
            5,
            Utc::now(),
        )
        .unwrap();

        let request = ProcessIncidentRequest::from_incident(&incident);
        assert_eq!(request.id, "panic_1700000000000");
        assert_eq!(request.severity, 5);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "panic_alert");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn test_safe_default_is_not_high_risk() {
        let score = RiskScore::safe_default(GeoPoint::new(0.0, 0.0));
        assert_eq!(score.risk_level, "very_safe");
        assert!(!score.is_high_risk());
    }

    #[test]
    fn test_high_risk_threshold_is_inclusive() {
        let mut score = RiskScore::safe_default(GeoPoint::new(0.0, 0.0));
        score.risk_score = 4.0;
        assert!(score.is_high_risk());
        score.risk_score = 3.99;
        assert!(!score.is_high_risk());
    }

    #[test]
    fn test_process_response_defaults() {
        let raw = serde_json::json!({"success": true, "incident_id": "r1"});
        let response: ProcessIncidentResponse = serde_json::from_value(raw).unwrap();
        assert!(response.affected_zones.is_empty());
        assert!(!response.model_updated);
    }
}
