use axum::{middleware, routing::get, routing::post, Router};
use domain::services::RiskService;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, location, panic, realtime, reports};
use crate::services::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<RealtimeHub>,
    pub risk: Arc<dyn RiskService>,
}

impl AppState {
    pub fn new(config: Config, risk: Arc<dyn RiskService>) -> Self {
        let hub = Arc::new(RealtimeHub::new(config.realtime.outbound_buffer));
        Self {
            config: Arc::new(config),
            hub,
            risk,
        }
    }
}

pub fn create_app(config: Config, risk: Arc<dyn RiskService>) -> Router {
    build_router(AppState::new(config, risk))
}

/// Builds the router around an existing state, so callers can keep a handle
/// on the realtime hub.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let api_routes = Router::new()
        .route("/api/location/heatmap", get(location::get_heatmap))
        .route("/api/location/update", post(location::update_location))
        .route("/api/reports/submit", post(reports::submit_report))
        .route("/api/panic/trigger", post(panic::trigger_panic));

    let realtime_routes = Router::new().route("/ws", get(realtime::ws_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(realtime_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
