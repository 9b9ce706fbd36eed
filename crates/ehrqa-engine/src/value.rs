//! Raw value extraction and missingness.
//!
//! Detectors read cells as Polars `AnyValue`s. These helpers give every
//! detector the same notion of the raw string form (embedded in findings so
//! reports are self-describing), numeric parsing, and what counts as
//! missing for a given field.

use polars::prelude::AnyValue;

use ehrqa_model::config::AuditConfig;
use ehrqa_model::schema::FieldRule;

/// The value as it will appear in a finding. Empty for null.
pub fn raw_value(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
        AnyValue::Int8(v) => v.to_string(),
        AnyValue::Int16(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::UInt8(v) => v.to_string(),
        AnyValue::UInt16(v) => v.to_string(),
        AnyValue::UInt32(v) => v.to_string(),
        AnyValue::UInt64(v) => v.to_string(),
        AnyValue::Float32(v) => format_numeric(f64::from(*v)),
        AnyValue::Float64(v) => format_numeric(*v),
        other => other.to_string(),
    }
}

/// Formats a float without spurious trailing digits, so sentinel matching
/// sees "0" for 0.0.
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Numeric reading of a cell, parsing string columns on the fly.
/// None for null or non-numeric text.
pub fn numeric_value(value: &AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(*v)),
        AnyValue::Int16(v) => Some(f64::from(*v)),
        AnyValue::Int32(v) => Some(f64::from(*v)),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(f64::from(*v)),
        AnyValue::UInt16(v) => Some(f64::from(*v)),
        AnyValue::UInt32(v) => Some(f64::from(*v)),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::Float32(v) => Some(f64::from(*v)),
        AnyValue::Float64(v) => Some(*v),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(s),
        _ => None,
    }
}

fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Null or blank text, before any sentinel is considered.
pub fn is_null_or_blank(value: &AnyValue<'_>) -> bool {
    match value {
        AnyValue::Null => true,
        AnyValue::String(s) => s.trim().is_empty(),
        AnyValue::StringOwned(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Whether a cell counts as missing for this field: null/blank, or its
/// trimmed string form equals a per-field or global sentinel.
pub fn is_missing(value: &AnyValue<'_>, rule: &FieldRule, config: &AuditConfig) -> bool {
    if is_null_or_blank(value) {
        return true;
    }
    let text = raw_value(value);
    let trimmed = text.trim();
    rule.missing_sentinels.contains(trimmed) || config.global_missing_sentinels.contains(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrqa_model::schema::FieldType;

    #[test]
    fn raw_value_formats_floats_without_trailing_zeros() {
        assert_eq!(raw_value(&AnyValue::Float64(0.0)), "0");
        assert_eq!(raw_value(&AnyValue::Float64(72.5)), "72.5");
        assert_eq!(raw_value(&AnyValue::Int64(400)), "400");
        assert_eq!(raw_value(&AnyValue::Null), "");
    }

    #[test]
    fn numeric_value_parses_strings() {
        assert_eq!(numeric_value(&AnyValue::String(" 42.5 ")), Some(42.5));
        assert_eq!(numeric_value(&AnyValue::String("abc")), None);
        assert_eq!(numeric_value(&AnyValue::Null), None);
        assert_eq!(numeric_value(&AnyValue::Int32(7)), Some(7.0));
    }

    #[test]
    fn sentinel_matching_uses_string_form() {
        let config = AuditConfig::default();
        let rule = FieldRule::new(FieldType::Numeric).with_sentinel("0");

        assert!(is_missing(&AnyValue::Float64(0.0), &rule, &config));
        assert!(is_missing(&AnyValue::Int64(0), &rule, &config));
        assert!(!is_missing(&AnyValue::Float64(60.0), &rule, &config));
        assert!(is_missing(&AnyValue::Null, &rule, &config));
    }

    #[test]
    fn global_sentinels_apply_to_every_field() {
        let config = AuditConfig::default();
        let rule = FieldRule::new(FieldType::Text);

        assert!(is_missing(&AnyValue::String("N/A"), &rule, &config));
        assert!(is_missing(&AnyValue::String("Unknown"), &rule, &config));
        assert!(is_missing(&AnyValue::String("  "), &rule, &config));
        assert!(!is_missing(&AnyValue::String("recorded"), &rule, &config));
    }
}
