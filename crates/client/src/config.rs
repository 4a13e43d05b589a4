//! Client tuning knobs.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Client configuration. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the safety map API, e.g. `http://localhost:3000`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default)]
    pub planner: PlannerSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RealtimeSettings {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DedupSettings {
    #[serde(default = "default_dedup_window_ms")]
    pub window_ms: u64,
    /// The table is pruned once it holds more entries than this.
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlannerSettings {
    #[serde(default = "default_max_radius_meters")]
    pub max_radius_meters: f64,
    #[serde(default = "default_max_grid_size_meters")]
    pub max_grid_size_meters: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_dedup_window_ms() -> u64 {
    10_000
}

fn default_prune_threshold() -> usize {
    200
}

fn default_max_radius_meters() -> f64 {
    10_000.0
}

fn default_max_grid_size_meters() -> u32 {
    200
}

fn default_debounce_ms() -> u64 {
    450
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            realtime: RealtimeSettings::default(),
            dedup: DedupSettings::default(),
            planner: PlannerSettings::default(),
        }
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl RealtimeSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window_ms: default_dedup_window_ms(),
            prune_threshold: default_prune_threshold(),
        }
    }
}

impl DedupSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_radius_meters: default_max_radius_meters(),
            max_grid_size_meters: default_max_grid_size_meters(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PlannerSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("api_base_url must start with http:// or https://")]
    InvalidBaseUrl,

    #[error("planner.max_radius_meters must be at least {min}, got {actual}")]
    MaxRadiusTooSmall { min: f64, actual: f64 },

    #[error("planner.max_grid_size_meters must be at least {min}, got {actual}")]
    MaxGridTooSmall { min: u32, actual: u32 },

    #[error("dedup.window_ms must be greater than zero")]
    ZeroDedupWindow,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ClientConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ClientConfigError::InvalidBaseUrl);
        }
        if !(self.planner.max_radius_meters >= crate::planner::MIN_RADIUS_METERS) {
            return Err(ClientConfigError::MaxRadiusTooSmall {
                min: crate::planner::MIN_RADIUS_METERS,
                actual: self.planner.max_radius_meters,
            });
        }
        let smallest_grid = crate::planner::GRID_LADDER[0];
        if self.planner.max_grid_size_meters < smallest_grid {
            return Err(ClientConfigError::MaxGridTooSmall {
                min: smallest_grid,
                actual: self.planner.max_grid_size_meters,
            });
        }
        if self.dedup.window_ms == 0 {
            return Err(ClientConfigError::ZeroDedupWindow);
        }
        Ok(())
    }
}
