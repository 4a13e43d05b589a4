//! Safety map API server.
//!
//! HTTP endpoints for incident reports, panic alerts, location updates and
//! heatmaps, plus the WebSocket hub that fans incidents out to viewport rooms.

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
