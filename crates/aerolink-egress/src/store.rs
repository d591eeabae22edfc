//! Path-addressed JSON CRUD against the remote document tree.
//!
//! URLs take the form `<base><path>.json?auth=<token>` with
//! per-operation query suffixes. Authorization failures are recovered
//! locally: write verbs force a token refresh and retry once on 401,
//! while GET falls back to one full login — an asymmetry the backend
//! has been observed to require, kept deliberately.

use crate::auth::CredentialManager;
use crate::backend::RequestBackend;
use crate::executor::ResilientExecutor;
use aerolink_core::types::{RequestResult, TransportErrorKind};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Timeout for subtree DELETE; large deletes run long server-side.
const DELETE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Re-authentication failed, or the store rejected the retried
    /// request with 401 again.
    #[error("authentication failed")]
    AuthFailed,
    #[error("request failed with status {0}")]
    RequestFailed(u16),
    #[error("transport failure: {0}")]
    Transport(TransportErrorKind),
    #[error("malformed response")]
    MalformedResponse,
}

/// CRUD client over one document tree, holding the executor and the
/// credential manager it re-authenticates through.
#[derive(Debug)]
pub struct DocumentStoreClient<B> {
    executor: ResilientExecutor<B>,
    credentials: CredentialManager,
    base_url: String,
}

impl<B: RequestBackend> DocumentStoreClient<B> {
    pub fn new(
        executor: ResilientExecutor<B>,
        credentials: CredentialManager,
        base_url: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            executor,
            credentials,
            base_url,
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Timeout the next request will run with. Outside of an in-flight
    /// `delete` this is always the default.
    pub fn current_timeout(&self) -> Duration {
        self.executor.current_timeout()
    }

    /// Performs an initial login (or registration fallback) so that
    /// subsequent operations start with a token.
    pub async fn sign_in(&mut self) -> Result<(), StoreError> {
        if self.credentials.login(&mut self.executor).await.is_ok() {
            return Ok(());
        }
        warn!("login failed, attempting account registration");
        self.credentials
            .register(&mut self.executor)
            .await
            .map_err(|_| StoreError::AuthFailed)
    }

    /// Reads the JSON value at `path`. On failure performs one full
    /// login and retries once; returns `Value::Null` when that also
    /// fails, since the caller treats "no data" and "unreadable data"
    /// identically.
    pub async fn get(&mut self, path: &str) -> Value {
        if self.credentials.ensure_valid(&mut self.executor).await.is_err() {
            warn!(path, "credential check failed before GET");
        }
        let url = format!(
            "{}?auth={}",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let result = self.executor.execute(&url, Method::GET, None).await;
        if result.is_ok_200() {
            debug!(path, "GET succeeded");
            return self.take_json_or_null();
        }

        warn!(
            path,
            status = result.status_code,
            "GET failed, retrying after full login"
        );
        self.executor.clear_buffer();
        if self.credentials.login(&mut self.executor).await.is_err() {
            error!(path, "login retry failed, returning null");
            return Value::Null;
        }
        let url = format!(
            "{}?auth={}",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let result = self.executor.execute(&url, Method::GET, None).await;
        if result.is_ok_200() {
            debug!(path, "GET succeeded after re-login");
            self.take_json_or_null()
        } else {
            error!(
                path,
                status = result.status_code,
                "GET failed after re-login, returning null"
            );
            self.executor.clear_buffer();
            Value::Null
        }
    }

    /// Writes `json` at `path`, replacing whatever was there. Keys
    /// derived from the record timestamp make repeated PUTs idempotent.
    pub async fn put(&mut self, path: &str, json: &Value) -> Result<(), StoreError> {
        self.write(path, Method::PUT, json).await
    }

    /// Appends `json` under a server-assigned key at `path`.
    pub async fn post(&mut self, path: &str, json: &Value) -> Result<(), StoreError> {
        self.write(path, Method::POST, json).await
    }

    /// Merges `json` into the node at `path`.
    pub async fn patch(&mut self, path: &str, json: &Value) -> Result<(), StoreError> {
        self.write(path, Method::PATCH, json).await
    }

    async fn write(&mut self, path: &str, method: Method, json: &Value) -> Result<(), StoreError> {
        self.credentials
            .ensure_valid(&mut self.executor)
            .await
            .map_err(|_| StoreError::AuthFailed)?;
        let body = json.to_string();
        let url = format!(
            "{}?auth={}",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let mut result = self
            .executor
            .execute(&url, method.clone(), Some(body.as_str()))
            .await;

        if !result.is_ok_200() && result.status_code == 401 {
            warn!(path, %method, "store rejected token, refreshing and retrying once");
            self.executor.clear_buffer();
            self.credentials
                .force_refresh(&mut self.executor)
                .await
                .map_err(|_| StoreError::AuthFailed)?;
            let url = format!(
                "{}?auth={}",
                node_url(&self.base_url, path),
                self.credentials.access_token()
            );
            result = self
                .executor
                .execute(&url, method.clone(), Some(body.as_str()))
                .await;
        }

        self.executor.clear_buffer();
        if result.is_ok_200() {
            debug!(path, %method, "write succeeded");
            Ok(())
        } else if result.status_code == 401 {
            error!(path, %method, "write still unauthorized after refresh");
            Err(StoreError::AuthFailed)
        } else {
            error!(path, %method, status = result.status_code, "write failed");
            Err(failure_error(result))
        }
    }

    /// Deletes the subtree at `path`. Runs with a 10-minute timeout for
    /// this call only; the default timeout is restored on every exit
    /// path, including failures before any network attempt.
    pub async fn delete(&mut self, path: &str) -> Result<(), StoreError> {
        let mut exec = self.executor.override_timeout(DELETE_TIMEOUT);
        self.credentials
            .ensure_valid(&mut exec)
            .await
            .map_err(|_| StoreError::AuthFailed)?;
        let url = format!(
            "{}?writeSizeLimit=unlimited&auth={}",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let mut result = exec.execute(&url, Method::DELETE, None).await;

        if !result.is_success() && result.status_code == 401 {
            warn!(path, "DELETE rejected token, refreshing and retrying once");
            exec.clear_buffer();
            self.credentials
                .force_refresh(&mut exec)
                .await
                .map_err(|_| StoreError::AuthFailed)?;
            let url = format!(
                "{}?writeSizeLimit=unlimited&auth={}",
                node_url(&self.base_url, path),
                self.credentials.access_token()
            );
            result = exec.execute(&url, Method::DELETE, None).await;
        }

        exec.clear_buffer();
        drop(exec);

        // A subtree delete may legitimately answer 204, so the whole
        // 2xx range counts as success here.
        if result.is_success() {
            info!(path, status = result.status_code, "DELETE succeeded");
            Ok(())
        } else if result.status_code == 401 {
            error!(path, "DELETE still unauthorized after refresh");
            Err(StoreError::AuthFailed)
        } else {
            error!(path, status = result.status_code, "DELETE failed");
            Err(failure_error(result))
        }
    }

    /// Shallow listing: the immediate child keys of `path`, values
    /// elided. Listing operations are retention plumbing and do not
    /// re-authenticate; the next size-threshold crossing retries them.
    pub async fn list_shallow(&mut self, path: &str) -> Result<Value, StoreError> {
        let url = format!(
            "{}?shallow=true&auth={}",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let result = self.executor.execute(&url, Method::GET, None).await;
        if !result.is_ok_200() {
            warn!(path, status = result.status_code, "shallow listing failed");
            self.executor.clear_buffer();
            return Err(failure_error(result));
        }
        self.take_json()
    }

    /// The first `limit` children of `path` in key order.
    pub async fn list_first_keys(&mut self, path: &str, limit: u32) -> Result<Value, StoreError> {
        // The store expects the quotes around $key, percent-encoded.
        let url = format!(
            "{}?orderBy=%22%24key%22&limitToFirst={}&auth={}",
            node_url(&self.base_url, path),
            limit,
            self.credentials.access_token()
        );
        let result = self.executor.execute(&url, Method::GET, None).await;
        if !result.is_ok_200() {
            warn!(path, status = result.status_code, "key-ordered listing failed");
            self.executor.clear_buffer();
            return Err(failure_error(result));
        }
        self.take_json()
    }

    /// PATCH with the silent-write flag: the server skips echoing the
    /// written value, so any 2xx counts.
    pub async fn patch_silent(&mut self, path: &str, json: &Value) -> Result<(), StoreError> {
        let url = format!(
            "{}?auth={}&print=silent",
            node_url(&self.base_url, path),
            self.credentials.access_token()
        );
        let body = json.to_string();
        let result = self
            .executor
            .execute(&url, Method::PATCH, Some(body.as_str()))
            .await;
        self.executor.clear_buffer();
        if result.is_success() {
            debug!(path, "silent PATCH succeeded");
            Ok(())
        } else {
            warn!(path, status = result.status_code, "silent PATCH failed");
            Err(failure_error(result))
        }
    }

    fn take_json(&mut self) -> Result<Value, StoreError> {
        let parsed = serde_json::from_str(self.executor.response_text().as_ref());
        self.executor.clear_buffer();
        parsed.map_err(|_| StoreError::MalformedResponse)
    }

    fn take_json_or_null(&mut self) -> Value {
        self.take_json().unwrap_or(Value::Null)
    }
}

fn node_url(base_url: &str, path: &str) -> String {
    let sep = if path.starts_with('/') { "" } else { "/" };
    format!("{base_url}{sep}{path}.json")
}

fn failure_error(result: RequestResult) -> StoreError {
    match result.transport_error {
        Some(kind) => StoreError::Transport(kind),
        None => StoreError::RequestFailed(result.status_code),
    }
}
