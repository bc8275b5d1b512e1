//! Typed error model for the extraction connector.
//!
//! Every failure the connector can encounter is a [`SourceError`] carrying
//! a category, a stable code, and retry hints. Category constructors
//! enforce the retryability invariants so call sites cannot produce, say,
//! a retryable auth error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category, ordered roughly by how fatal it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid connector configuration. Fatal, not retryable.
    Config,
    /// Credential acquisition failed. Fatal for the whole run.
    Auth,
    /// Token went stale mid-run. Recovered by one refresh-and-retry.
    AuthExpired,
    /// Source asked us to slow down (429). Retryable with slow backoff.
    RateLimit,
    /// Transient transport or upstream failure (5xx). Retryable.
    TransientNetwork,
    /// Non-retryable upstream rejection (4xx other than 401).
    Permanent,
    /// Malformed payload from the source.
    Data,
    /// Bug or unexpected state on our side.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::AuthExpired => "auth_expired",
            Self::RateLimit => "rate_limit",
            Self::TransientNetwork => "transient_network",
            Self::Permanent => "permanent",
            Self::Data => "data",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Backoff pacing hint for retryable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    Fast,
    Normal,
    Slow,
}

/// A categorized connector failure with retry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub retry_after_ms: Option<u64>,
    pub backoff_class: BackoffClass,
}

impl SourceError {
    fn build(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
        backoff_class: BackoffClass,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable,
            retry_after_ms: None,
            backoff_class,
        }
    }

    /// Configuration error (not retryable).
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::Config, code, message, false, BackoffClass::Normal)
    }

    /// Credential acquisition failure (fatal for the run).
    pub fn auth(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::Auth, code, message, false, BackoffClass::Normal)
    }

    /// Stale token (caller refreshes once and retries the same page).
    pub fn auth_expired(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::AuthExpired, code, message, false, BackoffClass::Normal)
    }

    /// Rate limit (retryable, slow backoff, optional server-specified delay).
    pub fn rate_limit(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err = Self::build(ErrorCategory::RateLimit, code, message, true, BackoffClass::Slow);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Transient transport or upstream 5xx failure (retryable).
    pub fn transient_network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(
            ErrorCategory::TransientNetwork,
            code,
            message,
            true,
            BackoffClass::Normal,
        )
    }

    /// Permanent upstream rejection (not retryable).
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::Permanent, code, message, false, BackoffClass::Normal)
    }

    /// Malformed source payload (not retryable).
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::Data, code, message, false, BackoffClass::Normal)
    }

    /// Internal failure (not retryable).
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorCategory::Internal, code, message, false, BackoffClass::Normal)
    }

    /// `true` when the token should be refreshed and the call retried once.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        self.category == ErrorCategory::AuthExpired
    }

    /// `true` when this failure aborts the whole run, not just one entity.
    #[must_use]
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self.category, ErrorCategory::Auth | ErrorCategory::Config)
    }

    /// Recategorize as a fatal credential-acquisition failure, keeping the
    /// original code and message.
    #[must_use]
    pub fn into_auth_fatal(self) -> Self {
        Self {
            category: ErrorCategory::Auth,
            retryable: false,
            retry_after_ms: None,
            ..self
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.category,
            self.code,
            if self.retryable { "retryable" } else { "fatal" },
            self.message
        )
    }
}

impl std::error::Error for SourceError {}
