//! The remote surface of the commerce platform.
//!
//! [`CommerceApi`] is the seam between extraction logic and the wire:
//! the production implementation is [`HttpCommerceApi`](crate::http::HttpCommerceApi),
//! tests script an in-memory fake. Implementations translate transport
//! outcomes into [`SourceError`] categories and do nothing else — no
//! retries, no pagination inference, no record validation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use tidemark_types::error::SourceError;

use crate::auth::TokenEnvelope;

/// Request for one page of an entity's record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub entity: String,
    /// 1-based page number.
    pub page_number: u32,
    pub page_size: u32,
    /// Change-timestamp watermark from the stored cursor, when one exists.
    pub since: Option<DateTime<Utc>>,
}

/// One page exactly as the source returned it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    /// Raw field maps in source order.
    pub records: Vec<Map<String, Value>>,
    /// Explicit `x-more-pages-available` header value, when the source
    /// sent one. `None` leaves the caller to infer from the page length.
    pub more_pages: Option<bool>,
}

/// Typed client surface for the commerce platform.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// `POST {AUTH_URL}/token` with the configured key and secret.
    ///
    /// # Errors
    ///
    /// Any failure is a credential-acquisition failure (`auth` category).
    async fn request_token(&self) -> Result<TokenEnvelope, SourceError>;

    /// `GET {API_URL}/{entity}?page=N&pagesize=M` with a bearer token.
    ///
    /// # Errors
    ///
    /// `auth_expired` on 401, `rate_limit` on 429, `transient_network` on
    /// 5xx or transport failure, `permanent` on other 4xx, `data` on an
    /// undecodable body.
    async fn fetch_page(&self, request: &PageRequest, token: &str) -> Result<RawPage, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The seam must stay object-safe; the engine holds `Arc<dyn CommerceApi>`.
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CommerceApi) {}
    }

    #[test]
    fn raw_page_defaults_to_no_records_no_header() {
        let page = RawPage::default();
        assert!(page.records.is_empty());
        assert_eq!(page.more_pages, None);
    }
}
