//! Risk-scoring ML service integration.
//!
//! HTTP client for the ML service's heatmap, incident processing and risk
//! score endpoints, guarded by a timeout and a consecutive-failure circuit
//! breaker. Every failure leaves this module as [`UpstreamUnavailable`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use domain::models::geo::GeoPoint;
use domain::models::heatmap::{Heatmap, HeatmapQuery};
use domain::models::risk::{ProcessIncidentRequest, ProcessIncidentResponse, RiskScore};
use domain::services::{RiskService, RiskServiceStatus};
use domain::UpstreamUnavailable;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MlServiceConfig;
use crate::middleware::metrics::record_ml_request;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while talking to the ML service.
#[derive(Debug, Error)]
pub enum MlGatewayError {
    #[error("ML service is disabled")]
    Disabled,

    #[error("ML service URL not configured")]
    NotConfigured,

    #[error("Circuit breaker is open, service temporarily unavailable")]
    CircuitOpen,

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from ML service: {0}")]
    InvalidResponse(String),

    #[error("ML service error: {0}")]
    ServiceError(String),
}

impl MlGatewayError {
    /// Whether the error says something about the service's health.
    ///
    /// Local refusals (disabled, not configured, circuit open) do not count
    /// towards the circuit breaker.
    fn is_upstream_failure(&self) -> bool {
        !matches!(
            self,
            MlGatewayError::Disabled | MlGatewayError::NotConfigured | MlGatewayError::CircuitOpen
        )
    }

    fn outcome(&self) -> &'static str {
        match self {
            MlGatewayError::Disabled | MlGatewayError::NotConfigured => "disabled",
            MlGatewayError::CircuitOpen => "circuit_open",
            MlGatewayError::Timeout(_) => "timeout",
            MlGatewayError::Http(_) => "http_error",
            MlGatewayError::InvalidResponse(_) => "invalid_response",
            MlGatewayError::ServiceError(_) => "service_error",
        }
    }
}

impl From<MlGatewayError> for UpstreamUnavailable {
    fn from(err: MlGatewayError) -> Self {
        UpstreamUnavailable::new(err.to_string())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HeatmapEnvelope {
    success: bool,
    #[serde(default)]
    heatmap: Option<Heatmap>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RiskScoreEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(flatten)]
    score: RiskScore,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker for external service protection.
struct CircuitBreaker {
    is_open: AtomicBool,
    /// Consecutive failure count.
    failure_count: AtomicU32,
    failure_threshold: u32,
    /// Time to stay open before half-open retry.
    reset_timeout: Duration,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, reset_timeout_secs: u64) -> Self {
        Self {
            is_open: AtomicBool::new(false),
            failure_count: AtomicU32::new(0),
            failure_threshold,
            reset_timeout: Duration::from_secs(reset_timeout_secs),
            opened_at: Mutex::new(None),
        }
    }

    fn opened_at(&self) -> Option<Instant> {
        *self.opened_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_opened_at(&self, value: Option<Instant>) {
        *self.opened_at.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }

    /// Check if request is allowed.
    fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                debug!("Circuit breaker half-open, allowing trial request");
                true
            }
            CircuitState::Open => false,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        if self.is_open.swap(false, Ordering::Relaxed) {
            info!("Circuit breaker closed after successful request");
            self.set_opened_at(None);
        }
    }

    fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;

        if self.is_open.load(Ordering::Relaxed) {
            // Failed half-open trial: wait a full reset period again
            self.set_opened_at(Some(Instant::now()));
        } else if count >= self.failure_threshold {
            warn!(
                failure_count = count,
                threshold = self.failure_threshold,
                "Circuit breaker opened due to consecutive failures"
            );
            self.is_open.store(true, Ordering::Relaxed);
            self.set_opened_at(Some(Instant::now()));
        }
    }

    fn state(&self) -> CircuitState {
        if !self.is_open.load(Ordering::Relaxed) {
            return CircuitState::Closed;
        }

        match self.opened_at() {
            Some(opened) if opened.elapsed() >= self.reset_timeout => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

// ============================================================================
// ML Gateway Client
// ============================================================================

/// Client for the risk-scoring ML service.
pub struct MlGatewayClient {
    client: Client,
    config: MlServiceConfig,
    circuit_breaker: CircuitBreaker,
}

impl MlGatewayClient {
    pub fn new(config: MlServiceConfig) -> Result<Self, MlGatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(MlGatewayError::Http)?;

        let circuit_breaker =
            CircuitBreaker::new(config.circuit_breaker_failures, config.circuit_breaker_reset_secs);

        Ok(Self {
            client,
            config,
            circuit_breaker,
        })
    }

    /// Check if the ML service is enabled and configured.
    pub fn is_available(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Probes `/ml/health`. Does not touch the circuit breaker.
    pub async fn check_health(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        let result = async {
            let response = self
                .client
                .get(self.url("/ml/health"))
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;
            read_json::<HealthResponse>(response).await
        }
        .await;

        match result {
            Ok(health) => health.status == "healthy",
            Err(e) => {
                warn!(error = %e, "ML service health check failed");
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> MlGatewayError {
        if e.is_timeout() {
            MlGatewayError::Timeout(self.config.timeout_ms)
        } else {
            MlGatewayError::Http(e)
        }
    }

    /// Runs one guarded request: availability and breaker checks first,
    /// then outcome bookkeeping.
    async fn guarded<T, Fut>(&self, endpoint: &'static str, request: Fut) -> Result<T, MlGatewayError>
    where
        Fut: std::future::Future<Output = Result<T, MlGatewayError>>,
    {
        if !self.config.enabled {
            return Err(MlGatewayError::Disabled);
        }
        if self.config.url.is_empty() {
            return Err(MlGatewayError::NotConfigured);
        }
        if !self.circuit_breaker.is_allowed() {
            record_ml_request(endpoint, MlGatewayError::CircuitOpen.outcome(), 0.0);
            return Err(MlGatewayError::CircuitOpen);
        }

        let start = Instant::now();
        let result = request.await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => {
                self.circuit_breaker.record_success();
                record_ml_request(endpoint, "ok", elapsed.as_secs_f64());
                debug!(
                    endpoint,
                    duration_ms = elapsed.as_millis() as u64,
                    "ML request succeeded"
                );
            }
            Err(e) => {
                if e.is_upstream_failure() {
                    self.circuit_breaker.record_failure();
                }
                record_ml_request(endpoint, e.outcome(), elapsed.as_secs_f64());
                warn!(
                    endpoint,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "ML request failed"
                );
            }
        }
        result
    }

    async fn fetch_heatmap(&self, query: &HeatmapQuery) -> Result<Heatmap, MlGatewayError> {
        let mut params = vec![
            ("lat", query.lat.to_string()),
            ("lng", query.lng.to_string()),
            ("radius", query.radius.to_string()),
            ("grid_size", query.grid_size.to_string()),
            ("timestamp", Utc::now().to_rfc3339()),
            ("local_hour", query.local_hour.to_string()),
            ("include_time_factor", "true".to_string()),
        ];
        if let Some(offset) = query.timezone_offset_minutes {
            params.push(("timezone_offset_minutes", offset.to_string()));
        }

        let response = self
            .client
            .get(self.url("/ml/heatmap"))
            .query(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let envelope: HeatmapEnvelope = read_json(response).await?;
        if !envelope.success {
            return Err(MlGatewayError::ServiceError(
                envelope.error.unwrap_or_else(|| "heatmap generation failed".into()),
            ));
        }
        envelope
            .heatmap
            .ok_or_else(|| MlGatewayError::InvalidResponse("No heatmap in response".into()))
    }

    async fn post_incident(
        &self,
        request: &ProcessIncidentRequest,
    ) -> Result<ProcessIncidentResponse, MlGatewayError> {
        let response = self
            .client
            .post(self.url("/ml/incidents/process"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let body: ProcessIncidentResponse = read_json(response).await?;
        if !body.success {
            return Err(MlGatewayError::ServiceError(
                body.error.unwrap_or_else(|| "incident processing failed".into()),
            ));
        }
        Ok(body)
    }

    async fn fetch_risk_score(&self, location: GeoPoint) -> Result<RiskScore, MlGatewayError> {
        let response = self
            .client
            .get(self.url("/ml/risk-score"))
            .query(&[("lat", location.lat), ("lng", location.lng)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let envelope: RiskScoreEnvelope = read_json(response).await?;
        if !envelope.success {
            return Err(MlGatewayError::ServiceError(
                envelope.error.unwrap_or_else(|| "risk scoring failed".into()),
            ));
        }
        Ok(envelope.score)
    }
}

/// Checks the status code and decodes the body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, MlGatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MlGatewayError::ServiceError(format!("HTTP {}: {}", status, body)));
    }
    response
        .json()
        .await
        .map_err(|e| MlGatewayError::InvalidResponse(e.to_string()))
}

#[async_trait::async_trait]
impl RiskService for MlGatewayClient {
    async fn heatmap(&self, query: &HeatmapQuery) -> Result<Heatmap, UpstreamUnavailable> {
        Ok(self.guarded("heatmap", self.fetch_heatmap(query)).await?)
    }

    async fn process_incident(
        &self,
        request: &ProcessIncidentRequest,
    ) -> Result<ProcessIncidentResponse, UpstreamUnavailable> {
        Ok(self
            .guarded("incidents_process", self.post_incident(request))
            .await?)
    }

    async fn risk_score(&self, location: GeoPoint) -> Result<RiskScore, UpstreamUnavailable> {
        Ok(self
            .guarded("risk_score", self.fetch_risk_score(location))
            .await?)
    }

    fn status(&self) -> RiskServiceStatus {
        let state = self.circuit_state();
        RiskServiceStatus {
            available: self.is_available() && state != CircuitState::Open,
            circuit_state: state.as_str().to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config(enabled: bool) -> MlServiceConfig {
        MlServiceConfig {
            url: if enabled {
                "http://localhost:8000".to_string()
            } else {
                String::new()
            },
            timeout_ms: 120_000,
            circuit_breaker_failures: 3,
            circuit_breaker_reset_secs: 60,
            enabled,
        }
    }

    fn query() -> HeatmapQuery {
        HeatmapQuery {
            lat: 13.0827,
            lng: 80.2707,
            radius: 1000.0,
            grid_size: 100.0,
            local_hour: 22,
            timezone_offset_minutes: Some(330),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = MlGatewayClient::new(create_test_config(false)).unwrap();
        assert!(!client.is_available());
        assert!(!client.status().available);
        assert_eq!(client.status().circuit_state, "closed");
    }

    #[test]
    fn test_client_available_when_enabled() {
        let client = MlGatewayClient::new(create_test_config(true)).unwrap();
        assert!(client.is_available());
        assert!(client.status().available);
    }

    #[tokio::test]
    async fn test_disabled_service_is_upstream_unavailable() {
        let mut config = create_test_config(true);
        config.enabled = false;
        let client = MlGatewayClient::new(config).unwrap();

        let err = client.heatmap(&query()).await.unwrap_err();
        assert_eq!(err.reason, "ML service is disabled");
        // Refusals are not upstream failures
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_missing_url_is_upstream_unavailable() {
        let mut config = create_test_config(true);
        config.url = String::new();
        let client = MlGatewayClient::new(config).unwrap();

        let err = client.risk_score(GeoPoint::new(13.0, 80.0)).await.unwrap_err();
        assert!(err.reason.contains("not configured"));
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let breaker = CircuitBreaker::new(3, 60);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_allowed());
    }

    #[test]
    fn test_circuit_breaker_opens_after_failures() {
        let breaker = CircuitBreaker::new(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_allowed());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_after_reset_timeout() {
        let breaker = CircuitBreaker::new(1, 60);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.is_allowed());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_for_full_period() {
        let breaker = CircuitBreaker::new(1, 60);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_gateway_error_counts_towards_breaker() {
        assert!(!MlGatewayError::Disabled.is_upstream_failure());
        assert!(!MlGatewayError::CircuitOpen.is_upstream_failure());
        assert!(MlGatewayError::Timeout(120_000).is_upstream_failure());
        assert!(MlGatewayError::ServiceError("HTTP 500".into()).is_upstream_failure());
    }

    #[test]
    fn test_gateway_error_into_upstream_unavailable() {
        let err: UpstreamUnavailable = MlGatewayError::Timeout(120_000).into();
        assert_eq!(err.reason, "Request timeout after 120000ms");
    }

    #[test]
    fn test_risk_score_envelope_parses() {
        let raw = serde_json::json!({
            "success": true,
            "location": {"lat": 13.08, "lng": 80.27},
            "risk_score": 4.2,
            "risk_level": "high",
            "factors": {"time_of_day": 1.3}
        });
        let envelope: RiskScoreEnvelope = serde_json::from_value(raw).unwrap();
        assert!(envelope.success);
        assert!(envelope.score.is_high_risk());
        assert_eq!(envelope.score.factors["time_of_day"], 1.3);
    }

    #[test]
    fn test_heatmap_envelope_failure_parses() {
        let raw = serde_json::json!({"success": false, "error": "model not loaded"});
        let envelope: HeatmapEnvelope = serde_json::from_value(raw).unwrap();
        assert!(!envelope.success);
        assert!(envelope.heatmap.is_none());
        assert_eq!(envelope.error.as_deref(), Some("model not loaded"));
    }
}
