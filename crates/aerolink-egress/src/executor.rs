//! Bounded-retry request execution.
//!
//! `ResilientExecutor` owns one backend and one response buffer, and
//! runs every logical operation of the client: up to `max_attempts`
//! tries with a fixed pause in between, returning the last observed
//! outcome. The same executor type serves the credential manager and
//! the store client (5 attempts) and the ingest client (1 attempt).

use crate::backend::{BackendRequest, DEFAULT_RECV_CAPACITY, RequestBackend, ResponseBuffer};
use aerolink_core::types::RequestResult;
use reqwest::Method;
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Attempt count and the fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Store-facing policy: 5 attempts, 500 ms apart.
    pub fn standard() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(500),
        }
    }

    /// One attempt, no pause. Used where the caller retries on its own
    /// cadence.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Executes logical HTTP operations against one backend with bounded
/// retry, owning the response buffer the backend writes into.
///
/// Not for concurrent use: operations borrow the executor mutably, so
/// a second in-flight request through the same instance cannot exist.
#[derive(Debug)]
pub struct ResilientExecutor<B> {
    backend: B,
    buffer: ResponseBuffer,
    policy: RetryPolicy,
    default_timeout: Duration,
    timeout_override: Option<Duration>,
}

impl<B: RequestBackend> ResilientExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffer: ResponseBuffer::with_capacity(DEFAULT_RECV_CAPACITY),
            policy: RetryPolicy::standard(),
            default_timeout: DEFAULT_TIMEOUT,
            timeout_override: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer = ResponseBuffer::with_capacity(capacity);
        self
    }

    /// Timeout the next request will run with.
    pub fn current_timeout(&self) -> Duration {
        self.timeout_override.unwrap_or(self.default_timeout)
    }

    /// Raises the timeout for the duration of the returned guard. The
    /// default is restored when the guard drops, on every exit path.
    pub fn override_timeout(&mut self, timeout: Duration) -> TimeoutGuard<'_, B> {
        self.timeout_override = Some(timeout);
        TimeoutGuard { executor: self }
    }

    /// Runs one logical operation to completion: attempts until the
    /// transport reports no error and the status is 2xx, pausing
    /// between tries, and returns the last observed outcome.
    pub async fn execute(&mut self, url: &str, method: Method, body: Option<&str>) -> RequestResult {
        self.execute_with_headers(url, method, body, &[]).await
    }

    pub async fn execute_with_headers(
        &mut self,
        url: &str,
        method: Method,
        body: Option<&str>,
        headers: &[(&str, &str)],
    ) -> RequestResult {
        let timeout = self.current_timeout();
        let mut last = RequestResult::status(0);
        for attempt in 1..=self.policy.max_attempts.max(1) {
            if attempt > 1 {
                tokio::time::sleep(self.policy.delay).await;
            }
            // The buffer only ever holds the current attempt's response.
            self.buffer.clear();
            let request = BackendRequest {
                url,
                method: method.clone(),
                body,
                headers,
                timeout,
            };
            last = self.backend.perform(&request, &mut self.buffer).await;
            if last.is_success() {
                return last;
            }
            warn!(
                url,
                %method,
                attempt,
                max_attempts = self.policy.max_attempts,
                status = last.status_code,
                "request attempt failed"
            );
            debug!(body = %self.buffer.text(), "failed attempt response body");
        }
        last
    }

    /// Response body of the most recent request, decoded lossily.
    pub fn response_text(&self) -> Cow<'_, str> {
        self.buffer.text()
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }
}

/// Restores the executor's default timeout when dropped.
pub struct TimeoutGuard<'a, B: RequestBackend> {
    executor: &'a mut ResilientExecutor<B>,
}

impl<B: RequestBackend> Drop for TimeoutGuard<'_, B> {
    fn drop(&mut self) {
        self.executor.timeout_override = None;
    }
}

impl<B: RequestBackend> Deref for TimeoutGuard<'_, B> {
    type Target = ResilientExecutor<B>;

    fn deref(&self) -> &Self::Target {
        self.executor
    }
}

impl<B: RequestBackend> DerefMut for TimeoutGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.executor
    }
}
