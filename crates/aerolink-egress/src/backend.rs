//! Transport boundary: a single-request backend and the bounded
//! response buffer it writes into.

use aerolink_core::types::{RequestResult, TransportErrorKind};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

/// Default capacity of the shared response buffer.
pub const DEFAULT_RECV_CAPACITY: usize = 16 * 1024;

/// Configuration for the reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Connection timeout (per-request timeouts are supplied by the
    /// executor on every call).
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("AeroLink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fixed-capacity receive buffer shared by every request issued through
/// one executor.
///
/// Single-writer discipline: at most one in-flight request writes to
/// the buffer, and the `&mut` receivers make a second concurrent writer
/// unrepresentable. Responses longer than the capacity are truncated,
/// never overrun. Callers copy out what they need and then `clear`.
#[derive(Debug)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    truncated: bool,
}

impl ResponseBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
            truncated: false,
        }
    }

    /// Appends a chunk, silently truncating at capacity.
    pub fn extend_truncating(&mut self, chunk: &[u8]) {
        let space = self.capacity.saturating_sub(self.bytes.len());
        if chunk.len() > space {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(space)]);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.truncated = false;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Buffer contents decoded lossily as UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// One shaped HTTP request handed to a backend.
#[derive(Debug, Clone)]
pub struct BackendRequest<'a> {
    pub url: &'a str,
    pub method: Method,
    /// JSON body for body-carrying verbs; `None` otherwise.
    pub body: Option<&'a str>,
    /// Extra headers, e.g. an API-key header.
    pub headers: &'a [(&'a str, &'a str)],
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Performs a single HTTP request, writing the response body into the
/// caller-supplied buffer. Implementations never retry; retry policy
/// lives in the executor.
#[async_trait]
pub trait RequestBackend: Send {
    async fn perform(
        &mut self,
        request: &BackendRequest<'_>,
        buffer: &mut ResponseBuffer,
    ) -> RequestResult;
}

/// reqwest-backed transport with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: Client,
}

impl ReqwestBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RequestBackend for ReqwestBackend {
    async fn perform(
        &mut self,
        request: &BackendRequest<'_>,
        buffer: &mut ResponseBuffer,
    ) -> RequestResult {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url)
            .timeout(request.timeout);

        builder = match request.body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_owned()),
            // Body-less verbs carry an explicit zero length; some
            // servers reject DELETE/GET without it.
            None => builder.header(CONTENT_LENGTH, "0"),
        };

        for (name, value) in request.headers {
            builder = builder.header(*name, *value);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = request.url, error = %err, "transport failure");
                return RequestResult::transport(classify(&err));
            }
        };

        let status_code = response.status().as_u16();
        match response.bytes().await {
            Ok(bytes) => {
                buffer.extend_truncating(&bytes);
                RequestResult::status(status_code)
            }
            Err(err) => {
                debug!(url = request.url, status_code, error = %err, "body read failure");
                RequestResult {
                    transport_error: Some(classify(&err)),
                    status_code,
                }
            }
        }
    }
}

fn classify(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Request
    }
}
