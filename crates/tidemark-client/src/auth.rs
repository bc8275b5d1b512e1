//! Bearer credential acquisition and caching.
//!
//! [`AuthManager`] owns the one credential cache in the process. It is
//! held by the orchestrator and passed by reference to everything that
//! needs a token — there is no process-wide singleton. The cache lives
//! behind an async mutex that stays locked across a refresh, so N
//! concurrent callers produce exactly one token request.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use tidemark_types::error::SourceError;

use crate::api::CommerceApi;

/// Seconds subtracted from `expires_at` before a cached token counts as stale.
const TOKEN_SKEW_SECS: i64 = 30;

/// Fallback lifetime when the source omits an expiry.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3_600;

/// A bearer credential. Lives only in process memory; never persisted
/// into connector state, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// The token value for the `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// `true` while the credential is safely inside its validity window.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authentication response envelope.
///
/// The token endpoint has been observed answering in two shapes; both
/// decode through this one untagged union, so new shapes are added here
/// without touching any call site.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TokenEnvelope {
    /// `{"token": {"token": {"value": "...", "validUntil": "..."}}}`
    Nested { token: TokenWrapper },
    /// `{"accessToken": "...", "expiresIn": 3600}`
    Flat {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(rename = "expiresIn")]
        expires_in: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenWrapper {
    pub token: TokenPayload,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPayload {
    pub value: String,
    #[serde(rename = "validUntil")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl TokenEnvelope {
    /// Normalize either envelope shape to a [`Credential`].
    #[must_use]
    pub fn into_credential(self, now: DateTime<Utc>) -> Credential {
        let default_expiry = now + Duration::seconds(DEFAULT_TOKEN_TTL_SECS);
        match self {
            Self::Nested { token } => Credential {
                value: token.token.value,
                issued_at: now,
                expires_at: token.token.valid_until.unwrap_or(default_expiry),
            },
            Self::Flat { access_token, expires_in } => Credential {
                value: access_token,
                issued_at: now,
                expires_at: expires_in
                    .map_or(default_expiry, |secs| now + Duration::seconds(secs)),
            },
        }
    }
}

/// Acquires and caches the bearer credential for one sync run.
pub struct AuthManager {
    api: Arc<dyn CommerceApi>,
    cached: Mutex<Option<Credential>>,
}

impl AuthManager {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>) -> Self {
        Self { api, cached: Mutex::new(None) }
    }

    /// Return the cached token, refreshing it first if stale or absent.
    ///
    /// # Errors
    ///
    /// Returns a fatal `auth` error when acquisition fails after the one
    /// immediate re-attempt.
    pub async fn token(&self) -> Result<String, SourceError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh_at(Utc::now(), Duration::seconds(TOKEN_SKEW_SECS)) {
                return Ok(credential.secret().to_owned());
            }
        }

        let credential = self.acquire().await?;
        let token = credential.secret().to_owned();
        tracing::debug!(expires_at = %credential.expires_at, "credential refreshed");
        *cached = Some(credential);
        Ok(token)
    }

    /// Drop the cached credential. Callers seeing a downstream 401 call
    /// this, then [`token`](Self::token), exactly once before giving up.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// One request plus one immediate re-attempt; the token endpoint is
    /// assumed stable once reachable, so there is no backoff here.
    async fn acquire(&self) -> Result<Credential, SourceError> {
        let envelope = match self.api.request_token().await {
            Ok(envelope) => envelope,
            Err(first) => {
                tracing::warn!(error = %first, "token request failed, re-attempting once");
                self.api
                    .request_token()
                    .await
                    .map_err(SourceError::into_auth_fatal)?
            }
        };
        Ok(envelope.into_credential(Utc::now()))
    }
}
