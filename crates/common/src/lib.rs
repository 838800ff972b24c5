//! Common utilities, types, and configurations shared across Vantage crates.
//!
//! This crate contains the base building blocks for the Vantage system:
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Models**: Request/response contracts, connection descriptors, and the
//!   tagged row value type (`models`).
//! - **Telemetry**: Logging setup (`telemetry`).
//! - **Scrubbing**: Best-effort PII redaction for logged SQL (`scrubber`).
pub mod config;
pub mod models;
pub mod scrubber;
pub mod telemetry;
