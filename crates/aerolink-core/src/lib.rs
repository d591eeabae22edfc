//! AeroLink Core Types and Traits
//!
//! This crate provides the fundamental types shared across AeroLink:
//! - Account, token, and request-outcome value types
//! - The telemetry record model persisted to the remote store
//! - The `TelemetrySink` capability implemented by both backends

pub mod record;
pub mod sink;
pub mod types;

pub use record::{TelemetryRecord, storage_key};
pub use sink::{SinkError, TelemetrySink};
pub use types::{Account, RequestResult, TokenState, TransportErrorKind};
