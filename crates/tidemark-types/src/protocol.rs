//! Invocation protocol: the JSON contract between the scheduling platform
//! and the connector process.
//!
//! One trigger delivers a [`SyncRequest`]; the connector answers with a
//! [`SyncResponse`] whose `state` the platform persists verbatim and feeds
//! back on the next invocation. Schema discovery and the credential check
//! have their own output documents.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cursor::SyncState;
use crate::record::TypedRecord;

/// Record cap applied per entity when the platform does not send one.
pub const DEFAULT_RECORD_LIMIT: u64 = 100_000;

/// Credentials and endpoints supplied by the platform's secret store.
///
/// `Serialize` is deliberately not derived; secrets flow into the
/// connector, never out of it.
#[derive(Clone, Deserialize)]
pub struct Secrets {
    #[serde(rename = "API_KEY")]
    pub api_key: String,
    #[serde(rename = "API_SECRET")]
    pub api_secret: String,
    #[serde(rename = "AUTH_URL")]
    pub auth_url: String,
    #[serde(rename = "API_URL")]
    pub api_url: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// One sync invocation as delivered by the trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    /// Cursor state returned by the previous invocation; empty on first sync.
    #[serde(default)]
    pub state: SyncState,
    /// Per-entity record cap for this invocation.
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub secrets: Secrets,
}

fn default_limit() -> u64 {
    DEFAULT_RECORD_LIMIT
}

/// Connector output for one invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub state: SyncState,
    /// Upsert rows per entity; entities with nothing to upsert are omitted.
    pub insert: BTreeMap<String, Vec<TypedRecord>>,
    /// Deletions per entity. The source defines no tombstones, so this is
    /// emitted for contract completeness and stays empty.
    pub delete: BTreeMap<String, Vec<String>>,
    pub has_more: bool,
}

impl SyncResponse {
    /// Response for an aborted run: prior state untouched, nothing synced,
    /// `hasMore` set so the platform schedules a retry.
    #[must_use]
    pub fn unchanged(state: SyncState) -> Self {
        Self {
            state,
            insert: BTreeMap::new(),
            delete: BTreeMap::new(),
            has_more: true,
        }
    }
}

/// Schema-discovery document: `{"tables": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDiscovery {
    pub tables: BTreeMap<String, TableSchema>,
}

/// Target-schema declaration for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub primary_key: Vec<String>,
    /// Column name to declared type (`string`, `decimal(p,s)`, `timestamp`).
    pub columns: BTreeMap<String, String>,
}

/// Output of the credential check operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub success: bool,
    pub message: String,
}
