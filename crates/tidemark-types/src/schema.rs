//! Schema declarations for source entities.
//!
//! A [`SchemaDefinition`] bounds what the extractor will accept for one
//! entity: the composite primary key, the change-tracking column, and the
//! declared column types. Definitions are immutable and loaded once at
//! process start.

use std::fmt;

/// Declared type of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Decimal { precision: u8, scale: u8 },
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::Timestamp => f.write_str("timestamp"),
        }
    }
}

/// Immutable schema declaration for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    /// Entity name as it appears in the source API path.
    pub entity: String,
    /// Ordered column names forming the composite primary key.
    pub primary_key: Vec<String>,
    /// Column carrying the record's change timestamp.
    pub change_column: String,
    /// Declared columns in declaration order.
    pub columns: Vec<(String, ColumnType)>,
}

impl SchemaDefinition {
    /// Declared type of `column`, if it exists.
    #[must_use]
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }

    /// `true` when `column` is part of the primary key.
    #[must_use]
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> SchemaDefinition {
        SchemaDefinition {
            entity: "article".into(),
            primary_key: vec!["articleNumber".into()],
            change_column: "lastChange".into(),
            columns: vec![
                ("articleNumber".into(), ColumnType::String),
                ("salesPrice".into(), ColumnType::Decimal { precision: 15, scale: 2 }),
                ("lastChange".into(), ColumnType::Timestamp),
            ],
        }
    }

    #[test]
    fn column_type_display() {
        assert_eq!(ColumnType::String.to_string(), "string");
        assert_eq!(
            ColumnType::Decimal { precision: 15, scale: 2 }.to_string(),
            "decimal(15,2)"
        );
        assert_eq!(ColumnType::Timestamp.to_string(), "timestamp");
    }

    #[test]
    fn column_lookup() {
        let def = article();
        assert_eq!(
            def.column_type("salesPrice"),
            Some(ColumnType::Decimal { precision: 15, scale: 2 })
        );
        assert_eq!(def.column_type("unknown"), None);
    }

    #[test]
    fn primary_key_membership() {
        let def = article();
        assert!(def.is_primary_key("articleNumber"));
        assert!(!def.is_primary_key("salesPrice"));
    }
}
