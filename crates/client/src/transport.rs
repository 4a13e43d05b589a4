//! Transport seam for the realtime connection.
//!
//! The driver only needs to open a connection, send client frames and read
//! server frames; the wire transport behind these traits is up to the host
//! application.

use std::time::Duration;

use domain::models::realtime::{ClientEvent, ServerEvent};

use crate::config::RealtimeSettings;
use crate::error::TransportError;

/// Opens realtime connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open realtime connection.
#[async_trait::async_trait]
pub trait Connection: Send {
    async fn send(&mut self, frame: &ClientEvent) -> Result<(), TransportError>;

    /// Next server frame. `None` means the connection closed.
    async fn recv(&mut self) -> Option<Result<ServerEvent, TransportError>>;
}

/// Fixed-delay, capped-attempt reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &RealtimeSettings) -> Self {
        Self {
            delay: settings.reconnect_delay(),
            max_attempts: settings.reconnect_attempts,
            connect_timeout: settings.connect_timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_attempts).then_some(self.delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&RealtimeSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay, Duration::from_millis(3000));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(3000)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(3000)));
        assert_eq!(policy.delay_for(4), None);
    }
}
