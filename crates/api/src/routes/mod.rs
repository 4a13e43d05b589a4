//! HTTP route handlers.

pub mod health;
pub mod location;
pub mod panic;
pub mod realtime;
pub mod reports;
