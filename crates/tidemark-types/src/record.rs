//! Typed records and upsert batches.
//!
//! After schema validation every record is a [`TypedRecord`] holding only
//! declared columns with coerced values. Records serialize as flat JSON
//! objects with all values rendered as strings, which keeps decimal
//! precision intact across the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// A single coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    /// Canonical textual rendering of the source decimal.
    Decimal(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Timestamp value, if this field holds one.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Rendering used when this value participates in a composite key.
    #[must_use]
    pub fn as_key_part(&self) -> String {
        match self {
            Self::Text(v) | Self::Decimal(v) => v.clone(),
            Self::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(v) | Self::Decimal(v) => serializer.serialize_str(v),
            Self::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

/// One validated row, keyed by the entity's primary key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TypedRecord {
    pub values: BTreeMap<String, FieldValue>,
}

impl TypedRecord {
    /// Value of `column`, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    /// Composite primary key rendered as a single string, `/`-joined in
    /// key-column order. `None` when any key column is missing.
    #[must_use]
    pub fn primary_key(&self, key_columns: &[String]) -> Option<String> {
        let mut parts = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            parts.push(self.values.get(column)?.as_key_part());
        }
        Some(parts.join("/"))
    }
}

/// Per-entity batch of upsert rows produced by one run.
///
/// Idempotent by construction: each primary key appears at most once, so
/// re-applying the batch is a no-op for the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertBatch {
    pub entity: String,
    pub records: Vec<TypedRecord>,
}

impl UpsertBatch {
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self { entity: entity.into(), records: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
