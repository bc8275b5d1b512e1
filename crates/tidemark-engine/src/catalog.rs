//! Static schema catalog for the commerce entities.
//!
//! The catalog is the closed set of entities this connector replicates.
//! It is built once at process start; asking for an undeclared entity is
//! a configuration error, not a runtime one.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use tidemark_types::error::SourceError;
use tidemark_types::protocol::{SchemaDiscovery, TableSchema};
use tidemark_types::record::{FieldValue, TypedRecord};
use tidemark_types::schema::{ColumnType, SchemaDefinition};

/// Column carrying the change timestamp on every entity.
const CHANGE_COLUMN: &str = "lastChange";

/// A record that passed validation, together with its rendered key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub key: String,
    pub record: TypedRecord,
}

/// Outcome of validating one raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// `None` when the record is missing a primary-key field and was
    /// rejected entirely.
    pub record: Option<KeyedRecord>,
    /// Unknown or mistyped fields dropped from the record.
    pub dropped_fields: Vec<String>,
}

/// Closed map of entity name to schema declaration, in declaration order.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    definitions: Vec<SchemaDefinition>,
}

impl SchemaCatalog {
    /// The commerce catalog this connector ships with.
    #[must_use]
    pub fn commerce() -> Self {
        let string = ColumnType::String;
        let money = ColumnType::Decimal { precision: 15, scale: 2 };
        let quantity = ColumnType::Decimal { precision: 15, scale: 4 };
        let timestamp = ColumnType::Timestamp;

        Self {
            definitions: vec![
                declare(
                    "article",
                    &["articleNumber"],
                    &[
                        ("articleNumber", string),
                        ("name", string),
                        ("ean", string),
                        ("unit", string),
                        ("salesPrice", money),
                        ("lastChange", timestamp),
                    ],
                ),
                declare(
                    "customer",
                    &["customerNumber"],
                    &[
                        ("customerNumber", string),
                        ("name", string),
                        ("email", string),
                        ("city", string),
                        ("country", string),
                        ("creditLimit", money),
                        ("lastChange", timestamp),
                    ],
                ),
                declare(
                    "salesOrder",
                    &["orderNumber"],
                    &[
                        ("orderNumber", string),
                        ("customerNumber", string),
                        ("status", string),
                        ("currency", string),
                        ("orderDate", timestamp),
                        ("totalNet", money),
                        ("totalGross", money),
                        ("lastChange", timestamp),
                    ],
                ),
                declare(
                    "salesOrderPosition",
                    &["orderNumber", "positionNumber"],
                    &[
                        ("orderNumber", string),
                        ("positionNumber", string),
                        ("articleNumber", string),
                        ("quantity", quantity),
                        ("unitPrice", money),
                        ("lastChange", timestamp),
                    ],
                ),
                declare(
                    "stockLevel",
                    &["warehouseCode", "articleNumber"],
                    &[
                        ("warehouseCode", string),
                        ("articleNumber", string),
                        ("quantity", quantity),
                        ("reserved", quantity),
                        ("lastChange", timestamp),
                    ],
                ),
            ],
        }
    }

    /// Entity names in declaration order.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.entity.clone()).collect()
    }

    /// Schema declaration for `entity`.
    ///
    /// # Errors
    ///
    /// Returns a `config` error for an undeclared entity.
    pub fn definition_for(&self, entity: &str) -> Result<&SchemaDefinition, SourceError> {
        self.definitions
            .iter()
            .find(|d| d.entity == entity)
            .ok_or_else(|| {
                SourceError::config(
                    "UNDECLARED_ENTITY",
                    format!("entity '{entity}' is not declared in the schema catalog"),
                )
            })
    }

    /// Coerce a raw field map against the entity's declared schema.
    ///
    /// Unknown and mistyped fields are dropped (reported, not raised);
    /// a record missing any primary-key field is rejected entirely.
    ///
    /// # Errors
    ///
    /// Returns a `config` error for an undeclared entity.
    pub fn validate(
        &self,
        entity: &str,
        raw: &Map<String, Value>,
    ) -> Result<Validated, SourceError> {
        let definition = self.definition_for(entity)?;

        let mut record = TypedRecord::default();
        let mut dropped_fields = Vec::new();
        for (name, value) in raw {
            let Some(column_type) = definition.column_type(name) else {
                dropped_fields.push(name.clone());
                continue;
            };
            if value.is_null() {
                continue;
            }
            match coerce(value, column_type) {
                Some(field) => {
                    record.values.insert(name.clone(), field);
                }
                None => dropped_fields.push(name.clone()),
            }
        }

        let record = record
            .primary_key(&definition.primary_key)
            .map(|key| KeyedRecord { key, record });
        Ok(Validated { record, dropped_fields })
    }

    /// Render the catalog as the schema-discovery document.
    #[must_use]
    pub fn discovery(&self) -> SchemaDiscovery {
        let tables = self
            .definitions
            .iter()
            .map(|definition| {
                (
                    definition.entity.clone(),
                    TableSchema {
                        primary_key: definition.primary_key.clone(),
                        columns: definition
                            .columns
                            .iter()
                            .map(|(name, ty)| (name.clone(), ty.to_string()))
                            .collect(),
                    },
                )
            })
            .collect();
        SchemaDiscovery { tables }
    }
}

fn declare(entity: &str, primary_key: &[&str], columns: &[(&str, ColumnType)]) -> SchemaDefinition {
    SchemaDefinition {
        entity: entity.to_string(),
        primary_key: primary_key.iter().map(ToString::to_string).collect(),
        change_column: CHANGE_COLUMN.to_string(),
        columns: columns
            .iter()
            .map(|(name, ty)| ((*name).to_string(), *ty))
            .collect(),
    }
}

fn coerce(value: &Value, column_type: ColumnType) -> Option<FieldValue> {
    match column_type {
        ColumnType::String => match value {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            _ => None,
        },
        ColumnType::Decimal { .. } => match value {
            // serde_json preserves the source digits, so passing the
            // textual form through keeps precision.
            Value::Number(n) => Some(FieldValue::Decimal(n.to_string())),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|_| FieldValue::Decimal(trimmed.to_string()))
            }
            _ => None,
        },
        ColumnType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(FieldValue::Timestamp),
    }
}

/// RFC 3339 first, then the source's zone-less variant (assumed UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tidemark_types::error::ErrorCategory;

    fn raw(json: Value) -> Map<String, Value> {
        match json {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn catalog_declaration_order_is_stable() {
        let catalog = SchemaCatalog::commerce();
        assert_eq!(
            catalog.entities(),
            vec!["article", "customer", "salesOrder", "salesOrderPosition", "stockLevel"]
        );
    }

    #[test]
    fn undeclared_entity_is_config_error() {
        let catalog = SchemaCatalog::commerce();
        let err = catalog.definition_for("invoice").unwrap_err();
        assert_eq!(err.category, ErrorCategory::Config);
        assert!(err.is_fatal_for_run());
    }

    #[test]
    fn valid_record_coerced_and_keyed() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate(
                "article",
                &raw(serde_json::json!({
                    "articleNumber": "ART0010",
                    "name": "Widget",
                    "salesPrice": 19.9,
                    "lastChange": "2024-03-01T08:30:00Z",
                })),
            )
            .unwrap();
        assert!(validated.dropped_fields.is_empty());
        let keyed = validated.record.unwrap();
        assert_eq!(keyed.key, "ART0010");
        assert_eq!(
            keyed.record.get("salesPrice"),
            Some(&FieldValue::Decimal("19.9".into()))
        );
        assert_eq!(
            keyed.record.get("lastChange").and_then(FieldValue::as_timestamp),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn unknown_fields_dropped_not_raised() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate(
                "article",
                &raw(serde_json::json!({
                    "articleNumber": "ART0010",
                    "color": "red",
                    "internalFlags": {"a": 1},
                })),
            )
            .unwrap();
        assert!(validated.record.is_some());
        assert_eq!(validated.dropped_fields, vec!["color", "internalFlags"]);
    }

    #[test]
    fn mistyped_field_dropped_record_kept() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate(
                "article",
                &raw(serde_json::json!({
                    "articleNumber": "ART0010",
                    "salesPrice": "not a number",
                    "lastChange": "yesterday",
                })),
            )
            .unwrap();
        let keyed = validated.record.unwrap();
        assert_eq!(keyed.record.get("salesPrice"), None);
        assert_eq!(
            validated.dropped_fields,
            vec!["lastChange", "salesPrice"]
        );
    }

    #[test]
    fn missing_primary_key_rejects_record() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate("article", &raw(serde_json::json!({"name": "Widget"})))
            .unwrap();
        assert!(validated.record.is_none());
    }

    #[test]
    fn null_primary_key_rejects_record() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate(
                "article",
                &raw(serde_json::json!({"articleNumber": null, "name": "Widget"})),
            )
            .unwrap();
        assert!(validated.record.is_none());
    }

    #[test]
    fn composite_key_requires_every_part() {
        let catalog = SchemaCatalog::commerce();
        let complete = catalog
            .validate(
                "salesOrderPosition",
                &raw(serde_json::json!({"orderNumber": "SO-1", "positionNumber": 3})),
            )
            .unwrap();
        assert_eq!(complete.record.unwrap().key, "SO-1/3");

        let partial = catalog
            .validate(
                "salesOrderPosition",
                &raw(serde_json::json!({"orderNumber": "SO-1"})),
            )
            .unwrap();
        assert!(partial.record.is_none());
    }

    #[test]
    fn decimal_accepts_numeric_strings() {
        let catalog = SchemaCatalog::commerce();
        let validated = catalog
            .validate(
                "article",
                &raw(serde_json::json!({"articleNumber": "A1", "salesPrice": " 12.50 "})),
            )
            .unwrap();
        assert_eq!(
            validated.record.unwrap().record.get("salesPrice"),
            Some(&FieldValue::Decimal("12.50".into()))
        );
    }

    #[test]
    fn timestamp_accepts_zoneless_format() {
        assert_eq!(
            parse_timestamp("2024-03-01T08:30:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp("03/01/2024"), None);
    }

    #[test]
    fn discovery_covers_every_entity() {
        let catalog = SchemaCatalog::commerce();
        let discovery = catalog.discovery();
        assert_eq!(discovery.tables.len(), 5);
        let article = &discovery.tables["article"];
        assert_eq!(article.primary_key, vec!["articleNumber"]);
        assert_eq!(article.columns["salesPrice"], "decimal(15,2)");
        assert_eq!(article.columns["lastChange"], "timestamp");
        let positions = &discovery.tables["salesOrderPosition"];
        assert_eq!(positions.primary_key, vec!["orderNumber", "positionNumber"]);
    }
}
