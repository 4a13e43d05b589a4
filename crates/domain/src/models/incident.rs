//! Incident domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::validate_severity;

use super::geo::GeoPoint;
use crate::error::ValidationError;

/// Kind of reported incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    PanicAlert,
    CommunityReport,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::PanicAlert => "panic_alert",
            IncidentType::CommunityReport => "community_report",
        }
    }

    /// Parses a client-supplied type, treating anything unknown as a community report.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "panic_alert" => IncidentType::PanicAlert,
            _ => IncidentType::CommunityReport,
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reported incident, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEvent {
    incident_id: String,
    latitude: f64,
    longitude: f64,
    #[serde(rename = "type")]
    incident_type: IncidentType,
    severity: u8,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<GeoPoint>,
}

impl IncidentEvent {
    pub fn new(
        incident_id: impl Into<String>,
        position: GeoPoint,
        incident_type: IncidentType,
        severity: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let incident_id = incident_id.into();
        if incident_id.is_empty() {
            return Err(ValidationError::new("incidentId", "Incident id must not be empty"));
        }
        position.validate()?;
        validate_severity(severity).map_err(|e| ValidationError::from_field("severity", e))?;

        Ok(Self {
            incident_id,
            latitude: position.lat,
            longitude: position.lng,
            incident_type,
            severity,
            timestamp,
            location: Some(position),
        })
    }

    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn incident_type(&self) -> IncidentType {
        self.incident_type
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Builds the outbound `incident:new` payload stamped with the delivery time.
    pub fn to_payload(&self, delivered_at: DateTime<Utc>) -> NewIncidentPayload {
        NewIncidentPayload {
            incident_id: self.incident_id.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            incident_type: self.incident_type,
            severity: self.severity,
            location: self.location,
            reported_at: self.timestamp,
            timestamp: delivered_at,
        }
    }
}

/// Wire payload of the `incident:new` event.
///
/// `timestamp` is the server delivery time; the original report time travels
/// in `reportedAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncidentPayload {
    pub incident_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub reported_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}
