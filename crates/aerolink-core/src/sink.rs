//! The `TelemetrySink` capability.
//!
//! The sampling loop persists records and manages retention through
//! this trait rather than a concrete backend, so the document-tree
//! store and the fixed-endpoint ingest API are interchangeable.

use crate::record::TelemetryRecord;
use crate::types::TransportErrorKind;
use thiserror::Error;

/// Failure surfaced by a sink operation. Sinks recover what they can
/// (local retries, one re-authentication) before reporting; the
/// sampling loop logs and continues on the next cycle.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("authentication failed")]
    Auth,
    #[error("request failed with status {0}")]
    Request(u16),
    #[error("transport failure: {0}")]
    Transport(TransportErrorKind),
    #[error("malformed response")]
    Malformed,
    #[error("retention pass failed: {0}")]
    Retention(String),
}

/// A destination for telemetry records with bounded remote storage.
#[async_trait::async_trait]
pub trait TelemetrySink: Send {
    /// Persists one record. `key` is the time-derived storage key;
    /// sinks whose backend assigns its own ordering may ignore it.
    async fn ingest(&mut self, key: &str, record: &TelemetryRecord) -> Result<(), SinkError>;

    /// Removes every record this device has stored.
    async fn delete_all(&mut self) -> Result<(), SinkError>;

    /// Removes up to `batch_size` of the oldest records and returns the
    /// count removed.
    async fn trim_oldest(&mut self, batch_size: u32) -> Result<usize, SinkError>;
}
