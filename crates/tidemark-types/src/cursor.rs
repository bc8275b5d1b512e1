//! Cursor types for incremental extraction position tracking.
//!
//! An [`EntityCursor`] marks how far extraction has progressed for one
//! entity so the next invocation can resume where the previous one left
//! off. Together the cursors form the [`SyncState`], the only data the
//! connector persists between invocations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resume position for one entity.
///
/// The timestamp is the watermark; the primary key is the tie-break used
/// to absorb equal-timestamp batches at the cursor boundary. Both start
/// as `None` on the first sync of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCursor {
    /// Maximum change timestamp among records accepted so far.
    pub last_seen_change_timestamp: Option<DateTime<Utc>>,
    /// Primary key of the last record accepted.
    pub last_seen_primary_key: Option<String>,
}

impl EntityCursor {
    /// `true` when no sync has completed for this entity yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen_change_timestamp.is_none() && self.last_seen_primary_key.is_none()
    }
}

/// Mapping from entity name to its cursor.
///
/// Opaque to the platform that stores it; returned verbatim at the end of
/// a run and fed back in on the next invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(pub BTreeMap<String, EntityCursor>);

impl SyncState {
    /// Cursor for `entity`, or an empty cursor if none has been persisted.
    #[must_use]
    pub fn cursor(&self, entity: &str) -> EntityCursor {
        self.0.get(entity).cloned().unwrap_or_default()
    }

    /// Replace the cursor slot for `entity`.
    pub fn set_cursor(&mut self, entity: impl Into<String>, cursor: EntityCursor) {
        self.0.insert(entity.into(), cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cursor_wire_format_is_camel_case_with_nulls() {
        let cursor = EntityCursor::default();
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lastSeenChangeTimestamp": null,
                "lastSeenPrimaryKey": null,
            })
        );
    }

    #[test]
    fn cursor_roundtrip_with_values() {
        let cursor = EntityCursor {
            last_seen_change_timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            last_seen_primary_key: Some("ART0010".into()),
        };
        let json = serde_json::to_string(&cursor).unwrap();
        let back: EntityCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(cursor, back);
    }

    #[test]
    fn cursor_parses_platform_wire_shape() {
        let json = r#"{"lastSeenChangeTimestamp": "2024-01-01T00:00:00Z", "lastSeenPrimaryKey": "ART0010"}"#;
        let cursor: EntityCursor = serde_json::from_str(json).unwrap();
        assert_eq!(
            cursor.last_seen_change_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(cursor.last_seen_primary_key.as_deref(), Some("ART0010"));
    }

    #[test]
    fn empty_cursor_is_empty() {
        assert!(EntityCursor::default().is_empty());
        let cursor = EntityCursor {
            last_seen_change_timestamp: None,
            last_seen_primary_key: Some("C-1".into()),
        };
        assert!(!cursor.is_empty());
    }

    #[test]
    fn state_defaults_missing_entities() {
        let state = SyncState::default();
        assert!(state.cursor("article").is_empty());
    }

    #[test]
    fn state_serializes_as_plain_map() {
        let mut state = SyncState::default();
        state.set_cursor("article", EntityCursor::default());
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("article").is_some());
    }

    #[test]
    fn state_set_cursor_replaces_slot() {
        let mut state = SyncState::default();
        state.set_cursor("customer", EntityCursor::default());
        let updated = EntityCursor {
            last_seen_change_timestamp: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            last_seen_primary_key: Some("C-42".into()),
        };
        state.set_cursor("customer", updated.clone());
        assert_eq!(state.cursor("customer"), updated);
    }
}
