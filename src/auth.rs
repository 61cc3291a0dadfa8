//! Session-token authentication against the marketplace identity provider.
//!
//! The provider returns session state out-of-band in response headers
//! (`st-access-token`, `st-refresh-token`, `front-token`) rather than in
//! the body or cookies. The access token is a JWT whose `exp` claim is
//! decoded *without* signature verification — the token is self-issued by
//! a trusted provider and only used locally to estimate expiry. That
//! estimate is best-effort, never a security boundary.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{Credentials, SourceConfig};
use crate::error::Error;

/// Refresh this many seconds before the decoded expiry so a token is never
/// used right at the edge of expiry during an in-flight request.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// Fallback lifetime when the token payload cannot be decoded.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

const ACCESS_TOKEN_HEADER: &str = "st-access-token";
const REFRESH_TOKEN_HEADER: &str = "st-refresh-token";
const FRONT_TOKEN_HEADER: &str = "front-token";

/// The current session credential set. Pure data plus an expiry check;
/// held only in process memory and replaced wholesale on every exchange.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub front_token: Option<String>,
    pub expires_at_unix: i64,
}

impl Credential {
    /// True once `now` is within [`EXPIRY_BUFFER_SECS`] of the expiry.
    pub fn is_expiring(&self, now: i64) -> bool {
        now >= self.expires_at_unix - EXPIRY_BUFFER_SECS
    }

    /// Build a credential from exchange response headers, merging over the
    /// previous credential: a missing refresh or front token in the
    /// response preserves the prior value.
    pub fn from_headers(headers: &HeaderMap, prior: Option<&Credential>) -> Result<Self, Error> {
        let access_token = header_value(headers, ACCESS_TOKEN_HEADER)
            .ok_or_else(|| Error::Auth(format!("no {} header in response", ACCESS_TOKEN_HEADER)))?;

        let refresh_token = header_value(headers, REFRESH_TOKEN_HEADER)
            .or_else(|| prior.and_then(|p| p.refresh_token.clone()));
        let front_token = header_value(headers, FRONT_TOKEN_HEADER)
            .or_else(|| prior.and_then(|p| p.front_token.clone()));

        let expires_at_unix = match decode_expiry(&access_token) {
            Ok(exp) => exp,
            Err(err) => {
                tracing::warn!(error = %err, "could not decode token expiry, assuming 1h");
                Utc::now().timestamp() + DEFAULT_TOKEN_LIFETIME_SECS
            }
        };

        Ok(Credential {
            access_token,
            refresh_token,
            front_token,
            expires_at_unix,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read the `exp` claim from the unverified payload segment of a JWT.
pub fn decode_expiry(token: &str) -> Result<i64, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::Decode("token is not a three-part JWT".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::Decode(format!("token payload is not base64url: {}", e)))?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Decode(format!("token payload is not JSON: {}", e)))?;
    claims
        .get("exp")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::Decode("token payload has no exp claim".into()))
}

/// Performs login and refresh exchanges and owns the current [`Credential`].
///
/// Constructed once at startup and shared behind an `Arc`; the credential
/// sits behind a `Mutex` so a refresh in flight is never raced by a second
/// refresh or a read of a half-updated credential.
pub struct AuthSession {
    http: reqwest::Client,
    source: SourceConfig,
    credentials: Credentials,
    current: Mutex<Option<Credential>>,
}

impl AuthSession {
    pub fn new(source: SourceConfig, credentials: Credentials) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(source.timeout_secs))
            .build()?;
        Ok(AuthSession {
            http,
            source,
            credentials,
            current: Mutex::new(None),
        })
    }

    /// Submit the configured identity and secret to the sign-in endpoint
    /// and replace the held credential.
    pub async fn login(&self) -> Result<Credential, Error> {
        let mut guard = self.current.lock().await;
        let credential = self.exchange_login().await?;
        *guard = Some(credential.clone());
        Ok(credential)
    }

    /// Exchange the refresh token for a new credential, falling back to a
    /// full login on any failure. Refresh failure is never fatal on its
    /// own; it only costs an extra sign-in.
    pub async fn refresh(&self) -> Result<Credential, Error> {
        let mut guard = self.current.lock().await;
        let credential = self.refresh_locked(guard.as_ref()).await?;
        *guard = Some(credential.clone());
        Ok(credential)
    }

    /// Return an access token that is not about to expire, logging in or
    /// refreshing as needed.
    pub async fn valid_token(&self) -> Result<String, Error> {
        let mut guard = self.current.lock().await;
        let now = Utc::now().timestamp();
        let credential = match guard.as_ref() {
            Some(cred) if !cred.is_expiring(now) => return Ok(cred.access_token.clone()),
            Some(_) => self.refresh_locked(guard.as_ref()).await?,
            None => self.exchange_login().await?,
        };
        let token = credential.access_token.clone();
        *guard = Some(credential);
        Ok(token)
    }

    async fn exchange_login(&self) -> Result<Credential, Error> {
        tracing::info!("signing in to {}", self.source.signin_url);

        let body = json!({
            "formFields": [
                {"id": "email", "value": self.credentials.email},
                {"id": "password", "value": self.credentials.password},
            ]
        });

        let resp = self
            .http
            .post(&self.source.signin_url)
            .header("Origin", &self.source.origin)
            .header("Referer", format!("{}/", self.source.origin))
            .header("rid", "emailpassword")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("sign-in returned {}: {}", status, text)));
        }

        let headers = resp.headers().clone();
        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("sign-in body unreadable: {}", e)))?;
        if payload.get("status").and_then(|s| s.as_str()) != Some("OK") {
            return Err(Error::Auth(format!("sign-in rejected: {}", payload)));
        }

        let credential = Credential::from_headers(&headers, None)?;
        tracing::info!(expires_at = credential.expires_at_unix, "signed in");
        Ok(credential)
    }

    /// Refresh using the credential in `prior`, with login fallback.
    /// Callers hold the credential lock. Note this conflates an invalid
    /// refresh token with a transient network error — both trigger a full
    /// sign-in, which is wasteful but matches the provider's session model.
    async fn refresh_locked(&self, prior: Option<&Credential>) -> Result<Credential, Error> {
        let Some(refresh_token) = prior.and_then(|c| c.refresh_token.clone()) else {
            tracing::info!("no refresh token held, performing full sign-in");
            return self.exchange_login().await;
        };

        let resp = self
            .http
            .post(&self.source.refresh_url)
            .header("Origin", &self.source.origin)
            .header("Referer", format!("{}/", self.source.origin))
            .header("rid", "session")
            .header("Authorization", format!("Bearer {}", refresh_token))
            .send()
            .await;

        let resp = match resp {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "token refresh rejected, falling back to sign-in");
                return self.exchange_login().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh unreachable, falling back to sign-in");
                return self.exchange_login().await;
            }
        };

        match Credential::from_headers(resp.headers(), prior) {
            Ok(credential) => {
                tracing::debug!(expires_at = credential.expires_at_unix, "token refreshed");
                Ok(credential)
            }
            Err(err) => {
                tracing::warn!(error = %err, "refresh response unusable, falling back to sign-in");
                self.exchange_login().await
            }
        }
    }
}
