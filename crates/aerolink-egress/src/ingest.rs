//! Fixed-endpoint ingest backend.
//!
//! The simpler of the two backends: pre-formed JSON is POSTed to a
//! fixed ingestion URL, and administrative trims/deletes go to a fixed
//! admin URL as op-coded command bodies. Both are protected by a static
//! API-key header; there is no credential lifecycle and no retry loop —
//! the sampling loop retries on its own cadence.

use crate::backend::RequestBackend;
use crate::executor::{ResilientExecutor, RetryPolicy};
use aerolink_core::types::TransportErrorKind;
use reqwest::Method;
use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Single-attempt request timeout for both endpoints.
const INGEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Trim batch size used when the caller passes zero.
const DEFAULT_TRIM_BATCH: u32 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("transport failure: {0}")]
    Transport(TransportErrorKind),
    #[error("ingest endpoint returned status {0}")]
    Http(u16),
}

impl IngestError {
    /// Numeric code kept for parity with the device's return-code
    /// convention: transport failures map to -2 and HTTP-level failures
    /// to `-100 - status`; success is 0 at call sites.
    pub fn code(&self) -> i32 {
        match self {
            IngestError::Transport(_) => -2,
            IngestError::Http(status) => -100 - i32::from(*status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub ingest_url: String,
    pub admin_url: String,
    pub api_key: String,
    pub device_id: String,
    pub timeout: Duration,
}

impl IngestConfig {
    pub fn new(
        ingest_url: impl Into<String>,
        admin_url: impl Into<String>,
        api_key: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            ingest_url: ingest_url.into(),
            admin_url: admin_url.into(),
            api_key: api_key.into(),
            device_id: device_id.into(),
            timeout: INGEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Client for the fixed ingest and admin endpoints.
#[derive(Debug)]
pub struct IngestClient<B> {
    executor: ResilientExecutor<B>,
    config: IngestConfig,
}

impl<B: RequestBackend> IngestClient<B> {
    pub fn new(backend: B, config: IngestConfig) -> Self {
        let executor = ResilientExecutor::new(backend)
            .with_policy(RetryPolicy::single_attempt())
            .with_default_timeout(config.timeout);
        Self { executor, config }
    }

    /// POSTs one record to the ingest endpoint, injecting this device's
    /// identifier into the payload when it is absent.
    pub async fn ingest(&mut self, payload: &Value) -> Result<(), IngestError> {
        let body = ensure_device_id(payload, &self.config.device_id);
        let url = self.config.ingest_url.clone();
        let outcome = self.post_json(&url, &body).await;
        match &outcome {
            Ok(()) => info!("ingest accepted"),
            Err(err) => warn!(code = err.code(), %err, "ingest failed"),
        }
        outcome
    }

    /// Asks the admin endpoint to drop every row for `device_id`
    /// (this device's when `None`).
    pub async fn delete_all_for_device(
        &mut self,
        device_id: Option<&str>,
    ) -> Result<(), IngestError> {
        let device = device_id.unwrap_or(&self.config.device_id).to_string();
        let body = json!({"op": "delete_all", "device_id": device});
        let url = self.config.admin_url.clone();
        let outcome = self.post_json(&url, &body).await;
        match &outcome {
            Ok(()) => info!(device, "delete_all accepted"),
            Err(err) => warn!(device, code = err.code(), %err, "delete_all failed"),
        }
        outcome
    }

    /// Asks the admin endpoint to drop the oldest `batch_size` rows for
    /// `device_id`. Zero selects the default batch size.
    pub async fn trim_oldest_batch(
        &mut self,
        device_id: Option<&str>,
        batch_size: u32,
    ) -> Result<(), IngestError> {
        let device = device_id.unwrap_or(&self.config.device_id).to_string();
        let batch_size = if batch_size == 0 {
            DEFAULT_TRIM_BATCH
        } else {
            batch_size
        };
        let body = json!({"op": "trim_oldest", "device_id": device, "batch_size": batch_size});
        let url = self.config.admin_url.clone();
        let outcome = self.post_json(&url, &body).await;
        match &outcome {
            Ok(()) => info!(device, batch_size, "trim_oldest accepted"),
            Err(err) => warn!(device, code = err.code(), %err, "trim_oldest failed"),
        }
        outcome
    }

    async fn post_json(&mut self, url: &str, body: &Value) -> Result<(), IngestError> {
        let body = body.to_string();
        let headers = [("X-API-Key", self.config.api_key.as_str())];
        let result = self
            .executor
            .execute_with_headers(url, Method::POST, Some(body.as_str()), &headers)
            .await;
        self.executor.clear_buffer();
        if let Some(kind) = result.transport_error {
            return Err(IngestError::Transport(kind));
        }
        if !(200..300).contains(&result.status_code) {
            return Err(IngestError::Http(result.status_code));
        }
        Ok(())
    }
}

/// Injects `device_id` when the payload lacks one. Non-object payloads
/// are wrapped, preserving the original text under `raw`.
fn ensure_device_id(payload: &Value, device_id: &str) -> Value {
    match payload {
        Value::Object(map) if map.contains_key("device_id") => payload.clone(),
        Value::Object(map) => {
            let mut out = Map::new();
            out.insert("device_id".to_string(), Value::String(device_id.to_string()));
            out.extend(map.clone());
            Value::Object(out)
        }
        Value::String(raw) => json!({"device_id": device_id, "raw": raw}),
        other => json!({"device_id": device_id, "raw": other.to_string()}),
    }
}
