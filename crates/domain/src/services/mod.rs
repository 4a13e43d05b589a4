//! Domain services.

pub mod fanout;
pub mod risk;
pub mod room_index;

pub use fanout::{emit_heatmap_update, emit_risk_alert, fan_out_incident, EventSink, FanoutReport};
pub use risk::{MockRiskService, RiskService, RiskServiceStatus};
pub use room_index::{GeoRoomIndex, RoomEntry};
