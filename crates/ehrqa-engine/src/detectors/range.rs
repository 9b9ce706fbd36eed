//! Clinical range and allowed-set validation.

use std::collections::BTreeSet;

use polars::prelude::AnyValue;

use ehrqa_model::finding::Finding;
use ehrqa_model::schema::{DetectorKind, ValidRange};

use crate::value::{format_numeric, is_missing, numeric_value, raw_value};

use super::{Detector, DetectorContext, DetectorOutput};

/// Flags values violating configured clinical bounds or allowed sets. These
/// findings always force the field classification to at least `error`: a
/// clinical range violation must never be diluted by other passing
/// detectors on the same field.
pub struct RangeValidator;

impl Detector for RangeValidator {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Range
    }

    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::new();

        for (field, rule) in ctx.schema.fields_enabling(self.kind()) {
            let Some(range) = &rule.valid_range else {
                out.skip_field(
                    self.kind(),
                    field,
                    "range detector enabled but no valid range configured".to_string(),
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

            match range {
                ValidRange::Numeric { min, max } => {
                    let mut unparsable = 0usize;
                    for idx in 0..ctx.height() {
                        let value = series.get(idx).unwrap_or(AnyValue::Null);
                        if is_missing(&value, rule, ctx.config) {
                            continue;
                        }
                        match numeric_value(&value) {
                            Some(v) if v > *max => out.findings.push(Finding::new(
                                idx,
                                field,
                                self.kind(),
                                raw_value(&value),
                                ctx.config.range_weight,
                                format!(
                                    "value {} above maximum {}",
                                    format_numeric(v),
                                    format_numeric(*max)
                                ),
                            )),
                            Some(v) if v < *min => out.findings.push(Finding::new(
                                idx,
                                field,
                                self.kind(),
                                raw_value(&value),
                                ctx.config.range_weight,
                                format!(
                                    "value {} below minimum {}",
                                    format_numeric(v),
                                    format_numeric(*min)
                                ),
                            )),
                            Some(_) => {}
                            None => {
                                // Malformed cell: pessimistic synthetic
                                // finding, the run continues.
                                let text = raw_value(&value);
                                out.findings.push(Finding::failure(
                                    idx,
                                    field,
                                    self.kind(),
                                    text.trim(),
                                    ctx.config.failure_weight,
                                    format!(
                                        "could not check range: value \"{}\" is not numeric",
                                        text.trim()
                                    ),
                                ));
                                unparsable += 1;
                            }
                        }
                    }
                    if unparsable > 0 {
                        out.fail_field(
                            self.kind(),
                            field,
                            format!("{unparsable} value(s) could not be parsed as numeric"),
                        );
                    }
                }
                ValidRange::AllowedSet(allowed) => {
                    let normalized: BTreeSet<String> =
                        allowed.iter().map(|v| v.trim().to_uppercase()).collect();
                    let display = allowed
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    for idx in 0..ctx.height() {
                        let value = series.get(idx).unwrap_or(AnyValue::Null);
                        if is_missing(&value, rule, ctx.config) {
                            continue;
                        }
                        let text = raw_value(&value);
                        let trimmed = text.trim();
                        if !normalized.contains(&trimmed.to_uppercase()) {
                            out.findings.push(Finding::new(
                                idx,
                                field,
                                self.kind(),
                                trimmed,
                                ctx.config.range_weight,
                                format!("value \"{trimmed}\" not in allowed set [{display}]"),
                            ));
                        }
                    }
                }
            }
        }
        out
    }
}
