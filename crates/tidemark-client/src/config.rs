//! Connector configuration derived from the platform-supplied secrets.

use std::fmt;

use tidemark_types::error::SourceError;
use tidemark_types::protocol::Secrets;

/// Validated endpoints and credentials for the commerce API.
#[derive(Clone)]
pub struct ConnectorConfig {
    pub api_key: String,
    pub api_secret: String,
    pub auth_url: String,
    pub api_url: String,
}

impl ConnectorConfig {
    /// Build and validate a config from the invocation secrets.
    pub fn from_secrets(secrets: &Secrets) -> Result<Self, SourceError> {
        let config = Self {
            api_key: secrets.api_key.clone(),
            api_secret: secrets.api_secret.clone(),
            auth_url: secrets.auth_url.trim_end_matches('/').to_string(),
            api_url: secrets.api_url.trim_end_matches('/').to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.api_key.is_empty() {
            return Err(SourceError::config("MISSING_SECRET", "API_KEY must not be empty"));
        }
        if self.api_secret.is_empty() {
            return Err(SourceError::config("MISSING_SECRET", "API_SECRET must not be empty"));
        }
        for (name, url) in [("AUTH_URL", &self.auth_url), ("API_URL", &self.api_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SourceError::config(
                    "INVALID_URL",
                    format!("{name} must be an http(s) URL, got '{url}'"),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}
