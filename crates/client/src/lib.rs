//! Safety map client core.
//!
//! Realtime subscription management with reconnect and delivery dedup, and
//! viewport-driven heatmap fetching. Rendering is left to the host UI.

pub mod config;
pub mod debounce;
pub mod dedup;
pub mod error;
pub mod heatmap;
pub mod planner;
pub mod realtime;
pub mod subscription;
pub mod transport;

pub use config::ClientConfig;
pub use error::{FetchError, TransportError};
pub use heatmap::{
    HeatmapController, HeatmapFeed, HeatmapSource, HttpHeatmapSource, RefreshOutcome,
};
pub use planner::{QueryRegion, Viewport, ViewportPlanner};
pub use realtime::RealtimeClient;
pub use subscription::{ConnectionState, Delivery, SubscriptionManager};
pub use transport::{Connection, Connector, ReconnectPolicy};
