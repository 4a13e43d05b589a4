//! Risk-scoring service contract.
//!
//! Every failure of the upstream service surfaces as [`UpstreamUnavailable`];
//! callers decide which degraded value to fall back to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::error::UpstreamUnavailable;
use crate::models::geo::GeoPoint;
use crate::models::heatmap::{Heatmap, HeatmapQuery};
use crate::models::risk::{ProcessIncidentRequest, ProcessIncidentResponse, RiskScore};

/// Health of the connection to the risk service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskServiceStatus {
    pub available: bool,
    pub circuit_state: String,
}

/// Risk-scoring collaborator.
#[async_trait::async_trait]
pub trait RiskService: Send + Sync {
    /// Computes a heatmap for the queried region.
    async fn heatmap(&self, query: &HeatmapQuery) -> Result<Heatmap, UpstreamUnavailable>;

    /// Feeds a new incident into the model.
    async fn process_incident(
        &self,
        request: &ProcessIncidentRequest,
    ) -> Result<ProcessIncidentResponse, UpstreamUnavailable>;

    /// Scores a single location.
    async fn risk_score(&self, location: GeoPoint) -> Result<RiskScore, UpstreamUnavailable>;

    /// Current health without issuing a request.
    fn status(&self) -> RiskServiceStatus;
}

/// In-memory risk service for development and testing.
#[derive(Debug, Clone, Default)]
pub struct MockRiskService {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    /// Score returned by [`RiskService::risk_score`].
    pub score: f64,
    processed: Arc<AtomicUsize>,
}

impl MockRiskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock service that simulates an unreachable upstream.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    pub fn with_score(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }

    /// Number of incidents successfully processed so far.
    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), UpstreamUnavailable> {
        if self.simulate_failure {
            tracing::warn!("Mock risk service simulating failure");
            return Err(UpstreamUnavailable::new("Simulated failure"));
        }
        Ok(())
    }
}

fn level_for(score: f64) -> &'static str {
    match score {
        s if s >= 4.0 => "high",
        s if s >= 3.0 => "medium",
        s if s >= 2.0 => "low",
        s if s >= 1.0 => "safe",
        _ => "very_safe",
    }
}

#[async_trait::async_trait]
impl RiskService for MockRiskService {
    async fn heatmap(&self, query: &HeatmapQuery) -> Result<Heatmap, UpstreamUnavailable> {
        self.check()?;

        let mut heatmap = Heatmap::empty(query);
        heatmap.cells.push(crate::models::heatmap::HeatmapCell {
            lat: query.lat,
            lng: query.lng,
            risk_score: self.score,
            risk_level: Some(level_for(self.score).to_string()),
            incident_count: 0,
        });
        heatmap.calculated_at = Some(Utc::now());
        Ok(heatmap)
    }

    async fn process_incident(
        &self,
        request: &ProcessIncidentRequest,
    ) -> Result<ProcessIncidentResponse, UpstreamUnavailable> {
        self.check()?;

        self.processed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(incident_id = %request.id, "Mock: processed incident");

        Ok(ProcessIncidentResponse {
            success: true,
            incident_id: request.id.clone(),
            affected_zones: Vec::new(),
            model_updated: true,
            error: None,
        })
    }

    async fn risk_score(&self, location: GeoPoint) -> Result<RiskScore, UpstreamUnavailable> {
        self.check()?;

        Ok(RiskScore {
            location,
            risk_score: self.score,
            risk_level: level_for(self.score).to_string(),
            factors: serde_json::json!({}),
        })
    }

    fn status(&self) -> RiskServiceStatus {
        RiskServiceStatus {
            available: !self.simulate_failure,
            circuit_state: if self.simulate_failure { "open" } else { "closed" }.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::incident::{IncidentEvent, IncidentType};

    fn query() -> HeatmapQuery {
        HeatmapQuery {
            lat: 13.08,
            lng: 80.27,
            radius: 1000.0,
            grid_size: 100.0,
            local_hour: 22,
            timezone_offset_minutes: None,
        }
    }

    #[tokio::test]
    async fn test_mock_heatmap() {
        let service = MockRiskService::with_score(2.5);
        let heatmap = service.heatmap(&query()).await.unwrap();
        assert_eq!(heatmap.cells.len(), 1);
        assert_eq!(heatmap.cells[0].risk_level.as_deref(), Some("low"));
        assert!(heatmap.calculated_at.is_some());
    }

    #[tokio::test]
    async fn test_mock_counts_processed_incidents() {
        let service = MockRiskService::new();
        let incident = IncidentEvent::new(
            "panic_1",
            GeoPoint::new(13.08, 80.27),
            IncidentType::PanicAlert,
            5,
            Utc::now(),
        )
        .unwrap();

        let response = service
            .process_incident(&ProcessIncidentRequest::from_incident(&incident))
            .await
            .unwrap();

        assert!(response.model_updated);
        assert_eq!(response.incident_id, "panic_1");
        assert_eq!(service.clone().processed_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_mock_reports_unavailable() {
        let service = MockRiskService::failing();
        assert!(service.heatmap(&query()).await.is_err());
        assert!(service.risk_score(GeoPoint::new(0.0, 0.0)).await.is_err());
        assert!(!service.status().available);
        assert_eq!(service.status().circuit_state, "open");
    }

    #[tokio::test]
    async fn test_risk_score_levels() {
        let high = MockRiskService::with_score(4.5)
            .risk_score(GeoPoint::new(0.0, 0.0))
            .await
            .unwrap();
        assert_eq!(high.risk_level, "high");
        assert!(high.is_high_risk());

        assert_eq!(level_for(0.4), "very_safe");
        assert_eq!(level_for(3.0), "medium");
    }
}
