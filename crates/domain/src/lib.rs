//! Domain layer for the safety map backend and client.
//!
//! This crate contains:
//! - Domain models (viewport rooms, incidents, heatmaps, realtime wire events)
//! - The geo-room index and incident fan-out engine
//! - The risk-scoring service contract
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::{UpstreamUnavailable, ValidationError};
