//! Missing-value detection, including sentinel-as-missing values.

use polars::prelude::AnyValue;

use ehrqa_model::finding::Finding;
use ehrqa_model::schema::DetectorKind;

use crate::value::{is_null_or_blank, raw_value};

use super::{Detector, DetectorContext, DetectorOutput};

/// Flags null/blank values and configured sentinels (e.g. 0 for a field
/// where zero is clinically impossible). No statistical state; fully
/// deterministic.
pub struct CompletenessAnalyzer;

impl Detector for CompletenessAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Completeness
    }

    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput {
        let mut out = DetectorOutput::new();
        let weight = ctx.config.completeness_weight;

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

            for idx in 0..ctx.height() {
                let value = series.get(idx).unwrap_or(AnyValue::Null);
                if is_null_or_blank(&value) {
                    out.findings.push(Finding::new(
                        idx,
                        field,
                        self.kind(),
                        "",
                        weight,
                        "value is null or blank",
                    ));
                    continue;
                }
                let text = raw_value(&value);
                let trimmed = text.trim();
                if rule.missing_sentinels.contains(trimmed)
                    || ctx.config.global_missing_sentinels.contains(trimmed)
                {
                    out.findings.push(Finding::new(
                        idx,
                        field,
                        self.kind(),
                        trimmed,
                        weight,
                        format!("value matches missing sentinel \"{trimmed}\""),
                    ));
                }
            }
        }
        out
    }
}
