//! Shared utilities for the safety map backend and client.
//!
//! This crate provides functionality used across all other crates:
//! - Coordinate, radius and severity validation
//! - Great-circle distance and coordinate rounding

pub mod geo;
pub mod validation;
