//! Realtime fan-out and external service integrations.

pub mod ml_gateway;
pub mod realtime_hub;

pub use ml_gateway::{CircuitState, MlGatewayClient, MlGatewayError};
pub use realtime_hub::RealtimeHub;
