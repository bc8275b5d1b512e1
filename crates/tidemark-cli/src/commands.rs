//! Subcommand implementations.
//!
//! Each command prints exactly one JSON document on stdout; everything
//! else (logs, errors) goes to stderr.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use tidemark_client::api::CommerceApi;
use tidemark_client::config::ConnectorConfig;
use tidemark_client::http::HttpCommerceApi;
use tidemark_client::pagination::RetryPolicy;
use tidemark_engine::catalog::SchemaCatalog;
use tidemark_engine::orchestrator::{SyncOptions, SyncOrchestrator};
use tidemark_types::protocol::SyncRequest;

use crate::input;

/// Seconds shaved off the invocation budget so the run can finish its
/// current pages and serialize the response before the host kills it.
const SAFETY_MARGIN_SECS: u64 = 45;

fn build_orchestrator(
    request: &SyncRequest,
    page_size: u32,
    workers: usize,
) -> Result<SyncOrchestrator> {
    let config = ConnectorConfig::from_secrets(&request.secrets)?;
    let api: Arc<dyn CommerceApi> = Arc::new(HttpCommerceApi::new(config)?);
    Ok(SyncOrchestrator::with_options(
        api,
        SchemaCatalog::commerce(),
        SyncOptions { page_size, workers, retry: RetryPolicy::default() },
    ))
}

/// Run one sync invocation and print the response document.
pub async fn sync(
    input_path: Option<&Path>,
    budget_secs: u64,
    page_size: u32,
    workers: usize,
) -> Result<()> {
    let request = input::read_invocation(input_path)?;
    let orchestrator = build_orchestrator(&request, page_size, workers)?;

    let effective_secs = budget_secs.saturating_sub(SAFETY_MARGIN_SECS).max(1);
    let deadline = Instant::now() + Duration::from_secs(effective_secs);
    tracing::info!(
        budget_secs,
        effective_secs,
        limit = request.limit,
        "starting sync invocation"
    );

    let response = orchestrator.run(request.state, request.limit, deadline).await;
    println!(
        "{}",
        serde_json::to_string(&response).context("failed to serialize sync response")?
    );
    Ok(())
}

/// Print the schema-discovery document for the shipped catalog.
pub fn discover() -> Result<()> {
    let catalog = SchemaCatalog::commerce();
    println!(
        "{}",
        serde_json::to_string(&catalog.discovery())
            .context("failed to serialize discovery document")?
    );
    Ok(())
}

/// Test credential acquisition and print the check document.
pub async fn check(input_path: Option<&Path>) -> Result<()> {
    let request = input::read_invocation(input_path)?;
    let orchestrator = build_orchestrator(&request, 1, 1)?;
    let response = orchestrator.check().await;
    println!(
        "{}",
        serde_json::to_string(&response).context("failed to serialize check response")?
    );
    Ok(())
}
