//! Heatmap models shared by the ML gateway, the API and the client.
//!
//! Field names follow the risk-scoring service's snake_case wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;

/// Parameters of a heatmap request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    pub grid_size: f64,
    /// Local hour of day (0-23) used for time-of-day risk.
    pub local_hour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i32>,
}

/// One grid cell of a heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub lat: f64,
    pub lng: f64,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub incident_count: u32,
}

/// A cluster of incidents detected by the risk service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCluster {
    pub id: String,
    pub center: GeoPoint,
    pub radius: f64,
    pub risk_score: f64,
    #[serde(default)]
    pub incident_count: u32,
}

/// A computed heatmap for a circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub center: GeoPoint,
    pub radius: f64,
    pub grid_size: f64,
    #[serde(default)]
    pub cells: Vec<HeatmapCell>,
    #[serde(default)]
    pub clusters: Vec<RiskCluster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_factors: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_update_recommended: Option<DateTime<Utc>>,
}

impl Heatmap {
    /// A structurally valid heatmap with no cells, used when the risk service is down.
    pub fn empty(query: &HeatmapQuery) -> Self {
        Self {
            center: GeoPoint::new(query.lat, query.lng),
            radius: query.radius,
            grid_size: query.grid_size,
            cells: Vec::new(),
            clusters: Vec::new(),
            time_factors: None,
            calculated_at: None,
            next_update_recommended: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Response envelope of the heatmap endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapResponse {
    pub success: bool,
    pub heatmap: Heatmap,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
