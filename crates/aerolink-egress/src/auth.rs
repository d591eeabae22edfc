//! Credential lifecycle for the document store account.
//!
//! Login is a two-step exchange: email/password buy a refresh token at
//! the sign-in endpoint, and the refresh token buys a short-lived
//! access token at the token endpoint. The manager keeps exactly one
//! token pair valid and renews it shortly before expiry.

use crate::backend::RequestBackend;
use crate::executor::ResilientExecutor;
use aerolink_core::types::{Account, TokenState};
use chrono::Utc;
use reqwest::Method;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Remaining validity below which the token is renewed.
const RENEW_WINDOW_SECS: i64 = 30;
/// Lifetime assumed when the token endpoint omits an expiry.
const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// An auth endpoint failed at the transport level or returned a
    /// non-200 status.
    #[error("authentication request failed")]
    RequestFailed,
    /// The endpoint answered 200 but the expected fields were absent.
    #[error("authentication response missing expected fields")]
    ParseFailed,
}

/// Identity-provider endpoints and API key.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key: String,
    pub identity_base_url: String,
    pub token_base_url: String,
}

impl AuthConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_base_url: "https://identitytoolkit.googleapis.com".to_string(),
            token_base_url: "https://securetoken.googleapis.com".to_string(),
        }
    }

    /// Point the identity endpoints elsewhere (tests, proxies).
    pub fn with_identity_base_url(mut self, url: impl Into<String>) -> Self {
        self.identity_base_url = url.into();
        self
    }

    pub fn with_token_base_url(mut self, url: impl Into<String>) -> Self {
        self.token_base_url = url.into();
        self
    }

    fn sign_up_url(&self) -> String {
        format!(
            "{}/v1/accounts:signUp?key={}",
            self.identity_base_url, self.api_key
        )
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/v1/accounts:signInWithPassword?key={}",
            self.identity_base_url, self.api_key
        )
    }

    fn token_url(&self) -> String {
        format!("{}/v1/token?key={}", self.token_base_url, self.api_key)
    }
}

/// Owns one account's identity and token state; issues auth requests
/// through the executor it is handed.
#[derive(Debug)]
pub struct CredentialManager {
    config: AuthConfig,
    account: Account,
    token: TokenState,
}

impl CredentialManager {
    pub fn new(config: AuthConfig, account: Account) -> Self {
        Self {
            config,
            account,
            token: TokenState::default(),
        }
    }

    /// Current access token; empty until the first successful login.
    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Full login: password → refresh token → access token.
    pub async fn login<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
    ) -> Result<(), AuthError> {
        let refresh_token = self.obtain_refresh_token(executor, false).await?;
        self.token = self.mint_access_token(executor, refresh_token).await?;
        info!(email = %self.account.email, "logged in");
        Ok(())
    }

    /// Same exchange as `login` against the sign-up endpoint. Used as a
    /// fallback when login fails because the account does not exist.
    pub async fn register<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
    ) -> Result<(), AuthError> {
        let refresh_token = self.obtain_refresh_token(executor, true).await?;
        self.token = self.mint_access_token(executor, refresh_token).await?;
        info!(email = %self.account.email, "account registered");
        Ok(())
    }

    /// Renews the access token if it is missing or about to expire.
    ///
    /// A token without expiry information (`ttl_seconds <= 0`) is
    /// trusted indefinitely; a 401 from the store is the recovery path
    /// in that case.
    pub async fn ensure_valid<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
    ) -> Result<(), AuthError> {
        if self.token.is_empty() {
            warn!("no access token yet, performing full login");
            return self.login(executor).await;
        }
        if self.token.ttl_seconds <= 0 {
            return Ok(());
        }
        let remaining = self.token.remaining_at(Utc::now().timestamp());
        if remaining < RENEW_WINDOW_SECS {
            info!(remaining, "access token about to expire, renewing");
            return self.refresh_or_relogin(executor).await;
        }
        Ok(())
    }

    /// Unconditionally renews the access token. Callers use this after
    /// the store rejected the current token.
    pub async fn force_refresh<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
    ) -> Result<(), AuthError> {
        info!("forcing access token refresh");
        self.refresh_or_relogin(executor).await
    }

    async fn refresh_or_relogin<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
    ) -> Result<(), AuthError> {
        let refresh_token = self.token.refresh_token.clone();
        match self.mint_access_token(executor, refresh_token).await {
            Ok(token) => {
                self.token = token;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "direct token refresh failed, falling back to full login");
                self.login(executor).await
            }
        }
    }

    async fn obtain_refresh_token<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
        register: bool,
    ) -> Result<String, AuthError> {
        let body = json!({
            "email": self.account.email,
            "password": self.account.password,
            "returnSecureToken": true,
        })
        .to_string();
        let url = if register {
            self.config.sign_up_url()
        } else {
            self.config.sign_in_url()
        };

        let data = post_for_json(executor, &url, &body).await?;
        let refresh_token = data
            .get("refreshToken")
            .and_then(Value::as_str)
            .ok_or(AuthError::ParseFailed)?;
        debug!("refresh token obtained");
        Ok(refresh_token.to_string())
    }

    /// Exchanges a refresh token for a whole new `TokenState`.
    async fn mint_access_token<B: RequestBackend>(
        &mut self,
        executor: &mut ResilientExecutor<B>,
        refresh_token: String,
    ) -> Result<TokenState, AuthError> {
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        })
        .to_string();
        let url = self.config.token_url();

        let data = post_for_json(executor, &url, &body).await?;
        let access_token = data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or(AuthError::ParseFailed)?
            .to_string();
        let ttl_seconds = parse_ttl(&data);
        debug!(ttl_seconds, "access token minted");
        Ok(TokenState {
            access_token,
            refresh_token,
            obtained_at: Utc::now().timestamp(),
            ttl_seconds,
        })
    }

    #[cfg(test)]
    pub(crate) fn set_token_state(&mut self, token: TokenState) {
        self.token = token;
    }

    #[cfg(test)]
    pub(crate) fn token_state(&self) -> &TokenState {
        &self.token
    }
}

async fn post_for_json<B: RequestBackend>(
    executor: &mut ResilientExecutor<B>,
    url: &str,
    body: &str,
) -> Result<Value, AuthError> {
    let result = executor.execute(url, Method::POST, Some(body)).await;
    if !result.is_ok_200() {
        warn!(status = result.status_code, "auth endpoint request failed");
        executor.clear_buffer();
        return Err(AuthError::RequestFailed);
    }
    let parsed = serde_json::from_str(executor.response_text().as_ref());
    executor.clear_buffer();
    parsed.map_err(|_| AuthError::ParseFailed)
}

/// The token endpoint reports its expiry as `expires_in` or
/// `expiresIn`, as a string or a number; missing means one hour.
fn parse_ttl(data: &Value) -> i64 {
    match data.get("expires_in").or_else(|| data.get("expiresIn")) {
        Some(Value::String(s)) => s.parse().unwrap_or(DEFAULT_TTL_SECS),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(DEFAULT_TTL_SECS),
        _ => DEFAULT_TTL_SECS,
    }
}
