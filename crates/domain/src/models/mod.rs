//! Domain models for the safety map.

pub mod geo;
pub mod heatmap;
pub mod incident;
pub mod location;
pub mod panic;
pub mod realtime;
pub mod report;
pub mod risk;

pub use geo::{GeoPoint, RoomKey};
pub use heatmap::{Heatmap, HeatmapCell, HeatmapQuery, RiskCluster};
pub use incident::{IncidentEvent, IncidentType, NewIncidentPayload};
pub use realtime::{Channel, ClientEvent, ConnectionId, ServerEvent};
