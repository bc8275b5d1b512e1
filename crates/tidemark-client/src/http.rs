//! `reqwest`-backed implementation of [`CommerceApi`].
//!
//! Translates HTTP status codes into the connector's error taxonomy and
//! decodes the two observed list-body shapes. All retry and pagination
//! policy lives above this layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use tidemark_types::error::SourceError;

use crate::api::{CommerceApi, PageRequest, RawPage};
use crate::auth::TokenEnvelope;
use crate::config::ConnectorConfig;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Response header carrying the explicit more-pages flag.
const MORE_PAGES_HEADER: &str = "x-more-pages-available";

/// HTTP client for the commerce platform.
#[derive(Debug)]
pub struct HttpCommerceApi {
    http: reqwest::Client,
    config: ConnectorConfig,
}

impl HttpCommerceApi {
    /// Build a client for the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an `internal` error if the underlying client cannot be built.
    pub fn new(config: ConnectorConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| SourceError::internal("HTTP_CLIENT", e.to_string()))?;
        Ok(Self { http, config })
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.config.auth_url)
    }

    fn entity_url(&self, entity: &str) -> String {
        format!("{}/{}", self.config.api_url, entity)
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceApi {
    async fn request_token(&self) -> Result<TokenEnvelope, SourceError> {
        let response = self
            .http
            .post(self.token_url())
            .json(&serde_json::json!({
                "apiKey": self.config.api_key,
                "secret": self.config.api_secret,
            }))
            .send()
            .await
            .map_err(|e| SourceError::auth("TOKEN_TRANSPORT", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::auth(
                "TOKEN_REJECTED",
                format!("token endpoint returned {status}: {body}"),
            ));
        }

        response
            .json::<TokenEnvelope>()
            .await
            .map_err(|e| SourceError::auth("TOKEN_DECODE", format!("unrecognized token envelope: {e}")))
    }

    async fn fetch_page(&self, request: &PageRequest, token: &str) -> Result<RawPage, SourceError> {
        let mut builder = self
            .http
            .get(self.entity_url(&request.entity))
            .query(&[
                ("page", request.page_number.to_string()),
                ("pagesize", request.page_size.to_string()),
            ])
            .bearer_auth(token);
        if let Some(since) = request.since {
            builder = builder.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Secs, true))]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SourceError::transient_network("TRANSPORT", e.to_string()))?;

        let status = response.status();
        let more_pages = parse_more_pages(response.headers());

        if status == StatusCode::UNAUTHORIZED {
            return Err(SourceError::auth_expired(
                "TOKEN_STALE",
                format!("{} page {} returned 401", request.entity, request.page_number),
            ));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = parse_retry_after(response.headers());
            return Err(SourceError::rate_limit(
                "THROTTLED",
                format!("{} page {} returned 429", request.entity, request.page_number),
                retry_after_ms,
            ));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::transient_network(
                "UPSTREAM_5XX",
                format!("{status}: {body}"),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::permanent(
                "UPSTREAM_4XX",
                format!("{status}: {body}"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::data("BODY_DECODE", e.to_string()))?;
        Ok(RawPage { records: parse_records(body)?, more_pages })
    }
}

/// Parse the explicit more-pages header, when present.
fn parse_more_pages(headers: &HeaderMap) -> Option<bool> {
    let value = headers.get(MORE_PAGES_HEADER)?.to_str().ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// `Retry-After` in seconds, converted to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1_000)
}

/// Accept both observed list-body shapes: a bare array, or `{"result": [...]}`.
fn parse_records(body: Value) -> Result<Vec<Map<String, Value>>, SourceError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("result") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::data(
                    "UNEXPECTED_BODY",
                    "list response is an object without a 'result' array",
                ))
            }
        },
        other => {
            return Err(SourceError::data(
                "UNEXPECTED_BODY",
                format!("list response is not an array or object: {other}"),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(SourceError::data(
                "UNEXPECTED_RECORD",
                format!("record is not an object: {other}"),
            )),
        })
        .collect()
}
