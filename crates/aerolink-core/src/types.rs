//! Shared value types for the AeroLink data plane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One account identity for the remote document store.
///
/// Set once at startup or when credentials change; there is exactly one
/// account per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
}

impl Account {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Access/refresh token pair with expiry bookkeeping.
///
/// `access_token` stays empty until the first successful login or
/// registration. The whole value is replaced on every successful
/// refresh; fields are never updated piecemeal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which `access_token` was obtained.
    pub obtained_at: i64,
    /// Advertised token lifetime in seconds. Zero or negative means the
    /// server gave no expiry information and the token is trusted
    /// indefinitely.
    pub ttl_seconds: i64,
}

impl TokenState {
    /// True until a login or refresh has produced an access token.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Seconds of validity left at the given unix timestamp.
    pub fn remaining_at(&self, now: i64) -> i64 {
        self.ttl_seconds - (now - self.obtained_at)
    }
}

/// Classification of transport-level failures (connect, TLS, DNS,
/// timeouts). Opaque to this client: retried locally and logged, never
/// matched on for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportErrorKind {
    #[error("connection failure")]
    Connect,
    #[error("request timed out")]
    Timeout,
    #[error("request could not be sent")]
    Request,
    #[error("response body could not be read")]
    Body,
}

/// Outcome of a single network operation. Never retained beyond the
/// call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestResult {
    pub transport_error: Option<TransportErrorKind>,
    /// HTTP status code, or 0 when no response was received.
    pub status_code: u16,
}

impl RequestResult {
    pub fn transport(kind: TransportErrorKind) -> Self {
        Self {
            transport_error: Some(kind),
            status_code: 0,
        }
    }

    pub fn status(status_code: u16) -> Self {
        Self {
            transport_error: None,
            status_code,
        }
    }

    /// Transport completed and the status is in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none() && (200..300).contains(&self.status_code)
    }

    /// Transport completed and the status is exactly 200. GET/PUT/POST/
    /// PATCH against the document store require this; DELETE alone
    /// accepts the full 2xx range.
    pub fn is_ok_200(&self) -> bool {
        self.transport_error.is_none() && self.status_code == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_state_starts_empty() {
        let token = TokenState::default();
        assert!(token.is_empty());
    }

    #[test]
    fn remaining_counts_down_from_obtained_at() {
        let token = TokenState {
            access_token: "t".into(),
            refresh_token: "r".into(),
            obtained_at: 1_000,
            ttl_seconds: 3_600,
        };
        assert_eq!(token.remaining_at(1_000), 3_600);
        assert_eq!(token.remaining_at(4_590), 10);
        assert_eq!(token.remaining_at(5_000), -400);
    }

    #[test]
    fn success_requires_2xx_and_no_transport_error() {
        assert!(RequestResult::status(200).is_success());
        assert!(RequestResult::status(204).is_success());
        assert!(!RequestResult::status(299).is_ok_200());
        assert!(!RequestResult::status(301).is_success());
        assert!(!RequestResult::status(500).is_success());
        assert!(!RequestResult::transport(TransportErrorKind::Connect).is_success());

        let err_with_status = RequestResult {
            transport_error: Some(TransportErrorKind::Body),
            status_code: 200,
        };
        assert!(!err_with_status.is_success());
    }
}
