//! Per-field statistical outlier detection via interquartile range.

use polars::prelude::AnyValue;

use ehrqa_model::finding::Finding;
use ehrqa_model::schema::DetectorKind;

use crate::stats;
use crate::value::{format_numeric, is_missing, numeric_value, raw_value};

use super::{Detector, DetectorContext, DetectorOutput};

/// Flags values outside [Q1 - k*IQR, Q3 + k*IQR], with severity scaled by
/// how far past the bound the value sits. A whole-dataset statistic: the
/// full column is consumed before any record is flagged.
pub struct IqrOutlierDetector;

impl Detector for IqrOutlierDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Iqr
    }

    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::new();
        let k = ctx.config.iqr_multiplier;

        for (field, rule) in ctx.schema.fields_enabling(self.kind()) {
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

            // Cell values paired with their row index; missing and
            // unparsable cells take no part in the statistics.
            let mut cells: Vec<(usize, f64)> = Vec::new();
            for idx in 0..ctx.height() {
                let value = series.get(idx).unwrap_or(AnyValue::Null);
                if is_missing(&value, rule, ctx.config) {
                    continue;
                }
                if let Some(v) = numeric_value(&value) {
                    cells.push((idx, v));
                }
            }

            if cells.len() < ctx.config.min_samples_for_iqr {
                out.skip_field(
                    self.kind(),
                    field,
                    format!(
                        "{} non-missing sample(s), need {}",
                        cells.len(),
                        ctx.config.min_samples_for_iqr
                    ),
                );
                continue;
            }

            let values = stats::sorted(cells.iter().map(|(_, v)| *v).collect());
            let (Some(q1), Some(q3)) = (
                stats::quantile(&values, 0.25),
                stats::quantile(&values, 0.75),
            ) else {
                continue;
            };
            let iqr = q3 - q1;
            if iqr <= 0.0 {
                out.skip_field(
                    self.kind(),
                    field,
                    "constant distribution, IQR is zero".to_string(),
                );
                continue;
            }

            let lower = q1 - k * iqr;
            let upper = q3 + k * iqr;
            let span = k * iqr;

            for (idx, v) in cells {
                // Boundary inclusive: a value exactly at a bound is in range.
                if v >= lower && v <= upper {
                    continue;
                }
                let distance = if v < lower { lower - v } else { v - upper };
                let weight = (distance / span).min(1.0);
                out.findings.push(Finding::new(
                    idx,
                    field,
                    self.kind(),
                    raw_value(&series.get(idx).unwrap_or(AnyValue::Null)),
                    weight,
                    format!(
                        "value {} outside IQR bounds [{}, {}]",
                        format_numeric(v),
                        format_numeric(lower),
                        format_numeric(upper)
                    ),
                ));
            }
        }
        out
    }
}
