//! Pattern-based format validation for identifiers, dates, and codes.

use std::collections::BTreeMap;

use polars::prelude::AnyValue;
use regex::Regex;

use ehrqa_model::error::AuditError;
use ehrqa_model::finding::Finding;
use ehrqa_model::schema::{DetectorKind, FieldSchema};
use ehrqa_model::Result;

use crate::value::{is_missing, raw_value};

use super::{Detector, DetectorContext, DetectorOutput};

/// Flags non-missing values whose trimmed text does not match the field's
/// configured pattern. Missing values are never format-checked; completeness
/// already covers them.
#[derive(Debug)]
pub struct FormatValidator {
    patterns: BTreeMap<String, Regex>,
}

impl FormatValidator {
    /// Compile every configured pattern up front. Patterns match the whole
    /// value. A pattern that fails to compile is a configuration defect and
    /// aborts the run before any scoring.
    pub fn from_schema(schema: &FieldSchema) -> Result<Self> {
        let mut patterns = BTreeMap::new();
        for (field, rule) in schema.fields_enabling(DetectorKind::Format) {
            if let Some(pattern) = &rule.format_pattern {
                let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
                    AuditError::InvalidPattern {
                        field: field.to_string(),
                        message: err.to_string(),
                    }
                })?;
                patterns.insert(field.to_string(), regex);
            }
        }
        Ok(Self { patterns })
    }
}

impl Detector for FormatValidator {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Format
    }

    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::new();

        for (field, rule) in ctx.schema.fields_enabling(self.kind()) {
            let Some(regex) = self.patterns.get(field) else {
                out.skip_field(
                    self.kind(),
                    field,
                    "format detector enabled but no pattern configured".to_string(),
                );
                continue;
            };
            let Some(column) = ctx.columns.column(field) else {
                continue;
            };
            let series = match ctx.dataset.column(column) {
                Ok(series) => series,
                Err(err) => {
                    out.fail_field(self.kind(), field, err.to_string());
                    continue;
                }
            };

            let pattern = rule.format_pattern.as_deref().unwrap_or_default();
            for idx in 0..ctx.height() {
                let value = series.get(idx).unwrap_or(AnyValue::Null);
                if is_missing(&value, rule, ctx.config) {
                    continue;
                }
                let text = raw_value(&value);
                let trimmed = text.trim();
                if !regex.is_match(trimmed) {
                    out.findings.push(Finding::new(
                        idx,
                        field,
                        self.kind(),
                        trimmed,
                        ctx.config.format_weight,
                        format!("value \"{trimmed}\" does not match pattern {pattern}"),
                    ));
                }
            }
        }
        out
    }
}
