//! Page fetching with bounded retry and pagination-metadata inference.
//!
//! The [`Paginator`] owns the transient-failure policy: 429 and 5xx
//! responses are retried with exponential backoff before a `PageError`
//! surfaces. Stale-token (401) and permanent 4xx failures are never
//! retried here — those belong to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use tidemark_types::error::{BackoffClass, SourceError};

use crate::api::{CommerceApi, PageRequest};

const BACKOFF_FAST_DIVISOR: u32 = 10;
const BACKOFF_SLOW_MULTIPLIER: u32 = 5;

/// Bounded retry policy for transient page failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Compute the retry delay from error hints and the attempt number.
#[must_use]
pub fn compute_backoff(err: &SourceError, policy: &RetryPolicy, attempt: u32) -> Duration {
    // A server-specified Retry-After wins over our own pacing.
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms).min(policy.max_delay);
    }

    let base = match err.backoff_class {
        BackoffClass::Fast => policy.base_delay / BACKOFF_FAST_DIVISOR,
        BackoffClass::Normal => policy.base_delay,
        BackoffClass::Slow => policy.base_delay.saturating_mul(BACKOFF_SLOW_MULTIPLIER),
    };
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(policy.max_delay)
}

/// One consumed page with resolved pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    /// Records in the order the source provided them.
    pub records: Vec<Map<String, Value>>,
    pub has_more_pages: bool,
    pub page_number: u32,
    pub page_size: u32,
}

/// Fetches one page at a time from an entity endpoint.
pub struct Paginator {
    api: Arc<dyn CommerceApi>,
    retry: RetryPolicy,
}

impl Paginator {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>) -> Self {
        Self::with_retry(api, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_retry(api: Arc<dyn CommerceApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Fetch one page, retrying transient failures with bounded backoff.
    ///
    /// `has_more_pages` comes from the explicit response header when the
    /// source sent one; otherwise it is inferred from a full page. The
    /// inference can promise one page too many — the caller treats an
    /// empty follow-up page as end-of-stream.
    ///
    /// # Errors
    ///
    /// `auth_expired` surfaces immediately so the caller can refresh the
    /// token and retry the same page once; permanent failures surface
    /// immediately; transient failures surface after retries exhaust.
    pub async fn fetch_page(
        &self,
        request: &PageRequest,
        token: &str,
    ) -> Result<PageResponse, SourceError> {
        let mut attempt = 1u32;
        loop {
            match self.api.fetch_page(request, token).await {
                Ok(raw) => {
                    let has_more_pages = raw
                        .more_pages
                        .unwrap_or(raw.records.len() as u32 == request.page_size);
                    return Ok(PageResponse {
                        records: raw.records,
                        has_more_pages,
                        page_number: request.page_number,
                        page_size: request.page_size,
                    });
                }
                Err(err) if err.retryable && attempt < self.retry.max_attempts => {
                    let delay = compute_backoff(&err, &self.retry, attempt);
                    tracing::warn!(
                        entity = %request.entity,
                        page = request.page_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient page failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::api::RawPage;
    use crate::auth::TokenEnvelope;

    fn record(id: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("articleNumber".into(), Value::String(id.into()));
        m
    }

    struct ScriptedApi {
        responses: Mutex<VecDeque<Result<RawPage, SourceError>>>,
        calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(responses: Vec<Result<RawPage, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommerceApi for ScriptedApi {
        async fn request_token(&self) -> Result<TokenEnvelope, SourceError> {
            Ok(TokenEnvelope::Flat { access_token: "t".into(), expires_in: None })
        }

        async fn fetch_page(
            &self,
            _request: &PageRequest,
            _token: &str,
        ) -> Result<RawPage, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::permanent("UNSCRIPTED", "no response scripted")))
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        }
    }

    fn request(page_number: u32, page_size: u32) -> PageRequest {
        PageRequest { entity: "article".into(), page_number, page_size, since: None }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let err = SourceError::transient_network("X", "y");
        let policy = RetryPolicy::default();
        assert_eq!(compute_backoff(&err, &policy, 1), Duration::from_secs(1));
        assert_eq!(compute_backoff(&err, &policy, 2), Duration::from_secs(2));
        assert_eq!(compute_backoff(&err, &policy, 3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_slow_class_scales_base() {
        let err = SourceError::rate_limit("X", "y", None);
        let policy = RetryPolicy::default();
        assert_eq!(compute_backoff(&err, &policy, 1), Duration::from_secs(5));
    }

    #[test]
    fn backoff_respects_retry_after() {
        let err = SourceError::rate_limit("X", "y", Some(7_500));
        let policy = RetryPolicy::default();
        assert_eq!(compute_backoff(&err, &policy, 1), Duration::from_millis(7_500));
        assert_eq!(compute_backoff(&err, &policy, 3), Duration::from_millis(7_500));
    }

    #[test]
    fn backoff_capped_at_max_delay() {
        let err = SourceError::transient_network("X", "y");
        let policy = RetryPolicy::default();
        assert_eq!(compute_backoff(&err, &policy, 20), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn transient_failures_retried_until_success() {
        let api = ScriptedApi::new(vec![
            Err(SourceError::transient_network("UPSTREAM_5XX", "500")),
            Err(SourceError::transient_network("UPSTREAM_5XX", "502")),
            Ok(RawPage { records: vec![record("A1")], more_pages: Some(false) }),
        ]);
        let paginator = Paginator::with_retry(api.clone(), fast_retry());
        let page = paginator.fetch_page(&request(1, 5), "tok").await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_after_max_attempts() {
        let api = ScriptedApi::new(vec![
            Err(SourceError::transient_network("UPSTREAM_5XX", "500")),
            Err(SourceError::transient_network("UPSTREAM_5XX", "500")),
            Err(SourceError::transient_network("UPSTREAM_5XX", "500")),
        ]);
        let paginator = Paginator::with_retry(api.clone(), fast_retry());
        let err = paginator.fetch_page(&request(1, 5), "tok").await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_not_retried() {
        let api = ScriptedApi::new(vec![Err(SourceError::permanent("UPSTREAM_4XX", "404"))]);
        let paginator = Paginator::with_retry(api.clone(), fast_retry());
        let err = paginator.fetch_page(&request(1, 5), "tok").await.unwrap_err();
        assert!(!err.retryable);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn auth_expired_surfaces_without_retry() {
        let api = ScriptedApi::new(vec![Err(SourceError::auth_expired("TOKEN_STALE", "401"))]);
        let paginator = Paginator::with_retry(api.clone(), fast_retry());
        let err = paginator.fetch_page(&request(1, 5), "tok").await.unwrap_err();
        assert!(err.is_auth_expired());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn explicit_header_wins_over_length_heuristic() {
        let api = ScriptedApi::new(vec![Ok(RawPage {
            records: vec![record("A1"), record("A2")],
            more_pages: Some(false),
        })]);
        let paginator = Paginator::with_retry(api, fast_retry());
        // Full page, but the header says this is the last one.
        let page = paginator.fetch_page(&request(1, 2), "tok").await.unwrap();
        assert!(!page.has_more_pages);
    }

    #[tokio::test]
    async fn full_page_without_header_infers_more() {
        let api = ScriptedApi::new(vec![Ok(RawPage {
            records: vec![record("A1"), record("A2")],
            more_pages: None,
        })]);
        let paginator = Paginator::with_retry(api, fast_retry());
        let page = paginator.fetch_page(&request(1, 2), "tok").await.unwrap();
        assert!(page.has_more_pages);
    }

    #[tokio::test]
    async fn partial_page_without_header_infers_end() {
        let api = ScriptedApi::new(vec![Ok(RawPage {
            records: vec![record("A1")],
            more_pages: None,
        })]);
        let paginator = Paginator::with_retry(api, fast_retry());
        let page = paginator.fetch_page(&request(1, 2), "tok").await.unwrap();
        assert!(!page.has_more_pages);
    }
}
