//! `TelemetrySink` implementations over both backends.

use crate::backend::RequestBackend;
use crate::ingest::{IngestClient, IngestError};
use crate::retention::{RetentionEngine, RetentionError};
use crate::store::{DocumentStoreClient, StoreError};
use aerolink_core::{SinkError, TelemetryRecord, TelemetrySink};
use async_trait::async_trait;

impl From<StoreError> for SinkError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuthFailed => SinkError::Auth,
            StoreError::RequestFailed(status) => SinkError::Request(status),
            StoreError::Transport(kind) => SinkError::Transport(kind),
            StoreError::MalformedResponse => SinkError::Malformed,
        }
    }
}

impl From<RetentionError> for SinkError {
    fn from(err: RetentionError) -> Self {
        SinkError::Retention(err.to_string())
    }
}

impl From<IngestError> for SinkError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Transport(kind) => SinkError::Transport(kind),
            IngestError::Http(status) => SinkError::Request(status),
        }
    }
}

/// Document-tree sink: time-keyed PUTs under one root path, retention
/// through the retention engine.
#[derive(Debug)]
pub struct DocumentStoreSink<B> {
    store: DocumentStoreClient<B>,
    retention: RetentionEngine,
    root_path: String,
}

impl<B: RequestBackend> DocumentStoreSink<B> {
    pub fn new(store: DocumentStoreClient<B>, root_path: impl Into<String>) -> Self {
        let mut root_path = root_path.into();
        while root_path.ends_with('/') {
            root_path.pop();
        }
        Self {
            store,
            retention: RetentionEngine::new(),
            root_path,
        }
    }

    pub fn store_mut(&mut self) -> &mut DocumentStoreClient<B> {
        &mut self.store
    }

    pub fn retention(&self) -> &RetentionEngine {
        &self.retention
    }
}

#[async_trait]
impl<B: RequestBackend> TelemetrySink for DocumentStoreSink<B> {
    async fn ingest(&mut self, key: &str, record: &TelemetryRecord) -> Result<(), SinkError> {
        let value = serde_json::to_value(record).map_err(|_| SinkError::Malformed)?;
        let path = format!("{}/{}", self.root_path, key);
        self.store.put(&path, &value).await?;
        Ok(())
    }

    async fn delete_all(&mut self) -> Result<(), SinkError> {
        let root = self.root_path.clone();
        self.store.delete(&root).await?;
        Ok(())
    }

    async fn trim_oldest(&mut self, batch_size: u32) -> Result<usize, SinkError> {
        let root = self.root_path.clone();
        let removed = self
            .retention
            .trim_oldest_batch(&mut self.store, &root, batch_size)
            .await?;
        Ok(removed)
    }
}

/// Fixed-endpoint sink over the SQL-backed ingest API.
#[derive(Debug)]
pub struct IngestApiSink<B> {
    client: IngestClient<B>,
}

impl<B: RequestBackend> IngestApiSink<B> {
    pub fn new(client: IngestClient<B>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<B: RequestBackend> TelemetrySink for IngestApiSink<B> {
    /// The ingest endpoint orders rows server-side, so the storage key
    /// is not part of its wire shape.
    async fn ingest(&mut self, _key: &str, record: &TelemetryRecord) -> Result<(), SinkError> {
        let value = serde_json::to_value(record).map_err(|_| SinkError::Malformed)?;
        self.client.ingest(&value).await?;
        Ok(())
    }

    async fn delete_all(&mut self) -> Result<(), SinkError> {
        self.client.delete_all_for_device(None).await?;
        Ok(())
    }

    /// The admin endpoint does not echo a removed-count; a successful
    /// trim is assumed to have removed the full batch.
    async fn trim_oldest(&mut self, batch_size: u32) -> Result<usize, SinkError> {
        self.client.trim_oldest_batch(None, batch_size).await?;
        Ok(batch_size as usize)
    }
}
