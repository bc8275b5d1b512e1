//! Incremental extraction for one entity.
//!
//! Drives the [`Paginator`] from a stored cursor, validates every record
//! against the [`SchemaCatalog`], and accumulates an [`UpsertBatch`]. The
//! cursor only ever advances past fully consumed pages: a failed page
//! returns whatever accumulated so far with the cursor held at the last
//! good page.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tidemark_client::api::PageRequest;
use tidemark_client::auth::AuthManager;
use tidemark_client::pagination::Paginator;
use tidemark_types::cursor::EntityCursor;
use tidemark_types::error::SourceError;
use tidemark_types::record::{FieldValue, UpsertBatch};

use crate::catalog::SchemaCatalog;
use crate::summary::EntityRunStats;

/// Page and record caps for one entity extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub page_size: u32,
    /// Soft cap checked at page boundaries; a page is always consumed whole.
    pub record_limit: u64,
}

/// Result of one entity extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub batch: UpsertBatch,
    /// Cursor after the last fully consumed page.
    pub cursor: EntityCursor,
    /// `true` when more source data remains for this entity.
    pub has_more: bool,
    pub stats: EntityRunStats,
    /// Page-level failure that stopped the loop early, if any. The
    /// accumulated batch and held cursor are still valid to apply.
    pub error: Option<SourceError>,
}

/// Converts raw pages into typed upsert operations bounded by the catalog.
pub struct IncrementalExtractor {
    paginator: Paginator,
    auth: Arc<AuthManager>,
    catalog: Arc<SchemaCatalog>,
}

impl IncrementalExtractor {
    #[must_use]
    pub fn new(paginator: Paginator, auth: Arc<AuthManager>, catalog: Arc<SchemaCatalog>) -> Self {
        Self { paginator, auth, catalog }
    }

    /// Extract `entity` from its stored cursor until the source is
    /// drained, the record limit is reached, or the deadline passes.
    ///
    /// # Errors
    ///
    /// Only failures fatal to the whole run propagate: credential
    /// acquisition and catalog configuration. Page-level failures are
    /// absorbed into the outcome with the cursor held.
    pub async fn extract(
        &self,
        entity: &str,
        cursor: &EntityCursor,
        limits: &ExtractLimits,
        deadline: Instant,
    ) -> Result<ExtractOutcome, SourceError> {
        let definition = self.catalog.definition_for(entity)?;

        let mut stats = EntityRunStats::default();
        let mut records = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();
        let mut committed = cursor.clone();
        let mut max_seen = cursor.last_seen_change_timestamp;
        let mut last_key = cursor.last_seen_primary_key.clone();
        let mut has_more = false;
        let mut page_error = None;
        let mut page_number = 1u32;

        loop {
            // Cooperative deadline check; an in-flight page always finishes.
            if Instant::now() >= deadline {
                tracing::info!(entity, page = page_number, "deadline reached, stopping before next page");
                has_more = true;
                break;
            }

            let token = self.auth.token().await?;
            let request = PageRequest {
                entity: entity.to_string(),
                page_number,
                page_size: limits.page_size,
                since: cursor.last_seen_change_timestamp,
            };

            let page = match self.paginator.fetch_page(&request, &token).await {
                Ok(page) => page,
                Err(err) if err.is_auth_expired() => {
                    self.auth.invalidate().await;
                    let fresh = self.auth.token().await?;
                    match self.paginator.fetch_page(&request, &fresh).await {
                        Ok(page) => page,
                        Err(err) => {
                            tracing::warn!(
                                entity,
                                page = page_number,
                                error = %err,
                                "page failed after token refresh, holding cursor"
                            );
                            page_error = Some(if err.is_auth_expired() {
                                SourceError::permanent(
                                    "AUTH_RETRY_EXHAUSTED",
                                    format!(
                                        "{entity} page {page_number} still unauthorized after token refresh"
                                    ),
                                )
                            } else {
                                err
                            });
                            has_more = true;
                            break;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(entity, page = page_number, error = %err, "page failed, holding cursor");
                    page_error = Some(err);
                    has_more = true;
                    break;
                }
            };

            stats.pages_fetched += 1;

            // The length heuristic can promise one page too many; an empty
            // page is end-of-stream, not an error.
            if page.records.is_empty() {
                break;
            }

            for raw in &page.records {
                let validated = self.catalog.validate(entity, raw)?;
                stats.fields_dropped += validated.dropped_fields.len() as u64;
                if !validated.dropped_fields.is_empty() {
                    tracing::debug!(entity, fields = ?validated.dropped_fields, "dropped undeclared or mistyped fields");
                }
                let Some(keyed) = validated.record else {
                    stats.records_skipped += 1;
                    continue;
                };

                let change_ts = keyed
                    .record
                    .get(&definition.change_column)
                    .and_then(FieldValue::as_timestamp);

                // Boundary dedup: a record at or before the stored cursor is
                // accepted unless it is the exact record the cursor points at.
                if let (Some(prior_ts), Some(prior_key)) = (
                    cursor.last_seen_change_timestamp,
                    cursor.last_seen_primary_key.as_deref(),
                ) {
                    if let Some(ts) = change_ts {
                        if ts <= prior_ts && keyed.key == prior_key {
                            stats.records_deduped += 1;
                            continue;
                        }
                    }
                }

                match index_by_key.get(&keyed.key) {
                    Some(&at) => records[at] = keyed.record,
                    None => {
                        index_by_key.insert(keyed.key.clone(), records.len());
                        records.push(keyed.record);
                    }
                }
                if let Some(ts) = change_ts {
                    if max_seen.map_or(true, |seen| ts > seen) {
                        max_seen = Some(ts);
                    }
                }
                last_key = Some(keyed.key);
            }

            // Page fully consumed; safe to advance.
            committed.last_seen_change_timestamp = max_seen;
            committed.last_seen_primary_key = last_key.clone();

            if records.len() as u64 >= limits.record_limit {
                has_more = page.has_more_pages;
                if has_more {
                    tracing::info!(entity, records = records.len(), "record limit reached, resuming next run");
                }
                break;
            }
            if !page.has_more_pages {
                break;
            }
            page_number += 1;
        }

        stats.records_extracted = records.len() as u64;
        Ok(ExtractOutcome {
            batch: UpsertBatch { entity: entity.to_string(), records },
            cursor: committed,
            has_more,
            stats,
            error: page_error,
        })
    }
}
