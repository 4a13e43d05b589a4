//! Client error types.
//!
//! None of these reach UI callbacks. Transport errors are absorbed by the
//! reconnect driver and fetch errors become a stale-data flag.

use thiserror::Error;

/// Connection drop, timeout or handshake failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

/// Failure to fetch a heatmap from the API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request: {0}")]
    Rejected(String),
}
