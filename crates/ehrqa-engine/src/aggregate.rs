//! Report aggregation: pure rollups over scored records, no new judgments.

use polars::prelude::{AnyValue, DataFrame};

use ehrqa_model::config::AuditConfig;
use ehrqa_model::report::{
    ClassificationCounts, DatasetSummary, DetectorCounts, FieldMissingSummary,
    FieldNumericSummary, QualityReport, RunEvent,
};
use ehrqa_model::schema::FieldSchema;
use ehrqa_model::score::RecordScore;

use crate::columns::ColumnMap;
use crate::stats;
use crate::value::{is_missing, numeric_value};

/// One pass over the dataset computing per-field missing counts and each
/// record's completeness (share of schema fields with a present,
/// non-sentinel value). Used by the scorer and the summary alike.
pub fn missing_profile(
    dataset: &DataFrame,
    schema: &FieldSchema,
    config: &AuditConfig,
    columns: &ColumnMap,
) -> (Vec<f64>, Vec<FieldMissingSummary>) {
    let height = dataset.height();
    let field_count = schema.len();
    let mut per_record_missing = vec![0usize; height];
    let mut summaries = Vec::with_capacity(field_count);

    for (field, rule) in schema.fields() {
        let Some(series) = columns
            .column(field)
            .and_then(|column| dataset.column(column).ok())
        else {
            continue;
        };
        let mut missing = 0usize;
        for idx in 0..height {
            let value = series.get(idx).unwrap_or(AnyValue::Null);
            if is_missing(&value, rule, config) {
                missing += 1;
                per_record_missing[idx] += 1;
            }
        }
        summaries.push(FieldMissingSummary {
            field: field.to_string(),
            missing_count: missing,
            missing_pct: 100.0 * missing as f64 / height as f64,
        });
    }

    let completeness = per_record_missing
        .into_iter()
        .map(|missing| {
            if field_count == 0 {
                1.0
            } else {
                1.0 - missing as f64 / field_count as f64
            }
        })
        .collect();
    (completeness, summaries)
}

/// Basic statistics per numeric field, over non-missing parsable values.
fn numeric_summaries(
    dataset: &DataFrame,
    schema: &FieldSchema,
    config: &AuditConfig,
    columns: &ColumnMap,
) -> Vec<FieldNumericSummary> {
    let mut summaries = Vec::new();
    for (field, rule) in schema.fields() {
        if !rule.is_numeric() {
            continue;
        }
        let Some(series) = columns
            .column(field)
            .and_then(|column| dataset.column(column).ok())
        else {
            continue;
        };
        let mut values = Vec::new();
        for idx in 0..dataset.height() {
            let value = series.get(idx).unwrap_or(AnyValue::Null);
            if is_missing(&value, rule, config) {
                continue;
            }
            if let Some(v) = numeric_value(&value) {
                values.push(v);
            }
        }
        let values = stats::sorted(values);
        let (Some(mean), Some(median)) = (stats::mean(&values), stats::median(&values)) else {
            continue;
        };
        summaries.push(FieldNumericSummary {
            field: field.to_string(),
            mean,
            median,
            min: values[0],
            max: values[values.len() - 1],
        });
    }
    summaries
}

/// Assemble the final report from scored records and run metadata.
pub fn build_report(
    dataset: &DataFrame,
    schema: &FieldSchema,
    config: &AuditConfig,
    columns: &ColumnMap,
    records: Vec<RecordScore>,
    events: Vec<RunEvent>,
    missing_values: Vec<FieldMissingSummary>,
) -> QualityReport {
    let mut classifications = ClassificationCounts::default();
    let mut detector_counts = DetectorCounts::default();
    let mut failure_count = 0usize;
    let mut clean_record_count = 0usize;
    let mut score_sum = 0.0;
    let mut completeness_sum = 0.0;

    for record in &records {
        classifications.increment(record.classification);
        score_sum += record.composite_score;
        completeness_sum += record.completeness;
        if record.findings.is_empty() {
            clean_record_count += 1;
        }
        for finding in &record.findings {
            if finding.detector_failed {
                failure_count += 1;
            } else {
                detector_counts.increment(finding.detector);
            }
        }
    }

    let record_count = records.len();
    let divisor = record_count.max(1) as f64;
    let summary = DatasetSummary {
        record_count,
        field_count: schema.len(),
        mean_composite_score: score_sum / divisor,
        mean_completeness: completeness_sum / divisor,
        clean_record_count,
        classifications,
        detector_counts,
        failure_count,
        missing_values,
        numeric_stats: numeric_summaries(dataset, schema, config, columns),
    };

    QualityReport {
        summary,
        records,
        events,
    }
}
