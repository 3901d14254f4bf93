//! Common types and configuration shared across Quarry crates.
//!
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Identity**: The caller's security context (`auth`).
//! - **Models**: Dataset, chart, filter and result set types (`models`).
//! - **Telemetry**: Logging and tracing setup (`telemetry`).
//! - **Scrubbing**: Log-safe SQL rendering (`scrubber`).
pub mod auth;
pub mod config;
pub mod models;
pub mod scrubber;
pub mod telemetry;
