//! Sync orchestration across the configured entities.
//!
//! One [`SyncOrchestrator`] serves one invocation: it owns the single
//! [`AuthManager`] instance, fans entity extractions out over a bounded
//! worker pool, and merges results and updated cursors into one
//! [`SyncResponse`]. Entity-level failures never escalate to run-level
//! failure; only credential acquisition aborts the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use tidemark_client::api::CommerceApi;
use tidemark_client::auth::AuthManager;
use tidemark_client::pagination::{Paginator, RetryPolicy};
use tidemark_types::cursor::SyncState;
use tidemark_types::error::SourceError;
use tidemark_types::protocol::{CheckResponse, SchemaDiscovery, SyncResponse};

use crate::catalog::SchemaCatalog;
use crate::extract::{ExtractLimits, ExtractOutcome, IncrementalExtractor};
use crate::summary::RunSummary;

const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_WORKERS: usize = 4;

/// Tunables for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub page_size: u32,
    /// Concurrent entity extractions.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
        }
    }
}

enum EntityRun {
    Done(Box<ExtractOutcome>),
    /// Deadline passed before extraction started; cursor untouched.
    Skipped,
    /// Run-fatal failure (credential acquisition or configuration).
    Fatal(SourceError),
}

/// Drives one sync invocation end to end.
pub struct SyncOrchestrator {
    catalog: Arc<SchemaCatalog>,
    auth: Arc<AuthManager>,
    extractor: Arc<IncrementalExtractor>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, catalog: SchemaCatalog) -> Self {
        Self::with_options(api, catalog, SyncOptions::default())
    }

    #[must_use]
    pub fn with_options(
        api: Arc<dyn CommerceApi>,
        catalog: SchemaCatalog,
        options: SyncOptions,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let auth = Arc::new(AuthManager::new(api.clone()));
        let extractor = Arc::new(IncrementalExtractor::new(
            Paginator::with_retry(api, options.retry),
            auth.clone(),
            catalog.clone(),
        ));
        Self { catalog, auth, extractor, options }
    }

    /// Run one invocation against `prior` state.
    ///
    /// Entities run in catalog declaration order through a pool of
    /// `workers` concurrent extractions. Once `deadline` passes, no new
    /// entity starts and no extraction fetches another page; whatever
    /// was not reached is reported through `hasMore`.
    pub async fn run(&self, prior: SyncState, limit: u64, deadline: Instant) -> SyncResponse {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let limits = ExtractLimits {
            page_size: self.options.page_size,
            record_limit: limit.max(1),
        };

        let mut join_set: JoinSet<(String, EntityRun)> = JoinSet::new();
        for entity in self.catalog.entities() {
            let semaphore = semaphore.clone();
            let extractor = self.extractor.clone();
            let cursor = prior.cursor(&entity);
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            entity,
                            EntityRun::Fatal(SourceError::internal(
                                "WORKER_POOL",
                                "worker pool closed unexpectedly",
                            )),
                        )
                    }
                };
                if Instant::now() >= deadline {
                    return (entity, EntityRun::Skipped);
                }
                let run = match extractor.extract(&entity, &cursor, &limits, deadline).await {
                    Ok(outcome) => EntityRun::Done(Box::new(outcome)),
                    Err(err) => EntityRun::Fatal(err),
                };
                (entity, run)
            });
        }

        let mut results: BTreeMap<String, EntityRun> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((entity, run)) => {
                    results.insert(entity, run);
                }
                Err(err) => {
                    tracing::error!(error = %err, "entity extraction task panicked");
                }
            }
        }

        let mut state = prior.clone();
        let mut insert = BTreeMap::new();
        let mut has_more = results.len() < self.catalog.entities().len();
        let mut fatal: Option<SourceError> = None;
        let mut summary = RunSummary::default();

        for (entity, run) in results {
            match run {
                EntityRun::Done(outcome) => {
                    if let Some(err) = &outcome.error {
                        summary.entities_failed += 1;
                        tracing::warn!(
                            entity = %entity,
                            error = %err,
                            "entity stopped early; cursor held at last consumed page"
                        );
                    } else {
                        summary.entities_synced += 1;
                    }
                    summary.absorb(&outcome.stats);
                    has_more |= outcome.has_more;
                    state.set_cursor(&entity, outcome.cursor);
                    if !outcome.batch.is_empty() {
                        insert.insert(entity, outcome.batch.records);
                    }
                }
                EntityRun::Skipped => {
                    summary.entities_skipped += 1;
                    has_more = true;
                    tracing::info!(entity = %entity, "deadline reached before start; resuming next invocation");
                }
                EntityRun::Fatal(err) => {
                    fatal.get_or_insert(err);
                }
            }
        }

        if let Some(err) = fatal {
            tracing::error!(error = %err, "run aborted; state returned unchanged");
            return SyncResponse::unchanged(prior);
        }

        tracing::info!(
            entities_synced = summary.entities_synced,
            entities_failed = summary.entities_failed,
            entities_skipped = summary.entities_skipped,
            records = summary.records_extracted,
            records_skipped = summary.records_skipped,
            fields_dropped = summary.fields_dropped,
            pages = summary.pages_fetched,
            has_more,
            "sync run complete"
        );

        SyncResponse { state, insert, delete: BTreeMap::new(), has_more }
    }

    /// Credential smoke test for the platform's connection check.
    pub async fn check(&self) -> CheckResponse {
        match self.auth.token().await {
            Ok(_) => CheckResponse {
                success: true,
                message: "authentication succeeded".to_string(),
            },
            Err(err) => CheckResponse { success: false, message: err.to_string() },
        }
    }

    /// Render the catalog as the schema-discovery document.
    #[must_use]
    pub fn discover(&self) -> SchemaDiscovery {
        self.catalog.discovery()
    }
}
