//! Storage-bounded retention over the document tree.
//!
//! Two independent strategies, both idempotent and safe to repeat:
//! date-bucket trimming deletes whole day subtrees one at a time, and
//! oldest-batch trimming bulk-deletes the N oldest records with one
//! null-valued PATCH.

use crate::backend::RequestBackend;
use crate::store::{DocumentStoreClient, StoreError};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Pause between sequential bucket deletions, so a trim pass does not
/// saturate the transport.
const DELETE_PAUSE: Duration = Duration::from_millis(20);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionError {
    /// The child-key listing could not be retrieved; retry at the next
    /// size-threshold crossing.
    #[error("retention listing failed: {0}")]
    ListingFailed(StoreError),
    /// The bulk-delete PATCH was rejected after the listing succeeded.
    #[error("retention patch failed: {0}")]
    PatchFailed(StoreError),
}

#[derive(Debug, Clone)]
pub struct RetentionEngine {
    delete_pause: Duration,
}

impl Default for RetentionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionEngine {
    pub fn new() -> Self {
        Self {
            delete_pause: DELETE_PAUSE,
        }
    }

    pub fn with_delete_pause(mut self, delete_pause: Duration) -> Self {
        self.delete_pause = delete_pause;
        self
    }

    /// Deletes the oldest date buckets under `root_path` until at most
    /// `max_buckets` remain, one subtree at a time. Child keys must
    /// sort lexicographically in chronological order (`YYYY-MM-DD`
    /// style). Returns the number of buckets deleted; a listing that is
    /// not an object, or a count already within bound, is a no-op.
    pub async fn trim_by_date_bucket<B: RequestBackend>(
        &self,
        store: &mut DocumentStoreClient<B>,
        root_path: &str,
        max_buckets: usize,
    ) -> Result<usize, RetentionError> {
        if max_buckets == 0 {
            return Ok(0);
        }
        let listing = store
            .list_shallow(root_path)
            .await
            .map_err(RetentionError::ListingFailed)?;
        let Value::Object(children) = listing else {
            return Ok(0);
        };
        if children.len() <= max_buckets {
            return Ok(0);
        }

        let mut keys: Vec<&String> = children.keys().collect();
        keys.sort();
        let excess = keys.len() - max_buckets;

        let mut deleted = 0;
        for key in &keys[..excess] {
            let child = format!("{}/{}", root_path.trim_end_matches('/'), key);
            info!(bucket = %key, "trimming old date bucket");
            match store.delete(&child).await {
                Ok(()) => deleted += 1,
                // Non-fatal: the bucket stays for the next pass.
                Err(err) => warn!(bucket = %key, %err, "bucket delete failed"),
            }
            tokio::time::sleep(self.delete_pause).await;
        }
        Ok(deleted)
    }

    /// Removes the `batch_size` oldest children of `root_path` with a
    /// single silent PATCH mapping each key to null. Returns the count
    /// removed, `0` when there is nothing to remove.
    pub async fn trim_oldest_batch<B: RequestBackend>(
        &self,
        store: &mut DocumentStoreClient<B>,
        root_path: &str,
        batch_size: u32,
    ) -> Result<usize, RetentionError> {
        if batch_size == 0 {
            return Ok(0);
        }
        let listing = store
            .list_first_keys(root_path, batch_size)
            .await
            .map_err(RetentionError::ListingFailed)?;
        let Value::Object(children) = listing else {
            return Ok(0);
        };
        if children.is_empty() {
            return Ok(0);
        }

        let tombstones = Value::Object(
            children
                .keys()
                .map(|key| (key.clone(), Value::Null))
                .collect(),
        );
        store
            .patch_silent(root_path, &tombstones)
            .await
            .map_err(RetentionError::PatchFailed)?;
        info!(removed = children.len(), root = root_path, "trimmed oldest batch");
        Ok(children.len())
    }
}
