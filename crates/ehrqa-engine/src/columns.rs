//! Schema-to-dataset column resolution.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use ehrqa_model::{AuditError, FieldSchema, Result};

/// Maps every schema field to its dataset column, matched
/// case-insensitively. Building the map doubles as the schema/dataset
/// consistency check: a field without a column aborts the run before any
/// finding is produced.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: BTreeMap<String, String>,
}

impl ColumnMap {
    pub fn resolve(dataset: &DataFrame, schema: &FieldSchema) -> Result<Self> {
        let mut by_upper: BTreeMap<String, String> = BTreeMap::new();
        for name in dataset.get_column_names_owned() {
            let name = name.to_string();
            by_upper.entry(name.to_ascii_uppercase()).or_insert(name);
        }

        let mut columns = BTreeMap::new();
        for (field, _) in schema.fields() {
            match by_upper.get(&field.to_ascii_uppercase()) {
                Some(column) => {
                    columns.insert(field.to_string(), column.clone());
                }
                None => {
                    return Err(AuditError::UnknownField {
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Dataset column backing a schema field. Always present for fields of
    /// the schema this map was resolved against.
    pub fn column(&self, field: &str) -> Option<&str> {
        self.columns.get(field).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrqa_model::{FieldRule, FieldType};
    use polars::prelude::df;

    #[test]
    fn resolves_case_insensitively() {
        let dataset = df! { "HeartRate" => [60.0, 72.0] }.unwrap();
        let schema = FieldSchema::new().with_field("heartrate", FieldRule::new(FieldType::Numeric));

        let map = ColumnMap::resolve(&dataset, &schema).unwrap();
        assert_eq!(map.column("heartrate"), Some("HeartRate"));
    }

    #[test]
    fn unknown_field_is_fatal() {
        let dataset = df! { "age" => [40.0] }.unwrap();
        let schema = FieldSchema::new().with_field("bp", FieldRule::new(FieldType::Numeric));

        let err = ColumnMap::resolve(&dataset, &schema).unwrap_err();
        assert!(matches!(err, AuditError::UnknownField { field } if field == "bp"));
    }
}
