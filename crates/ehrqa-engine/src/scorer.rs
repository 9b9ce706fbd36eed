//! Deterministic fusion of detector findings into field and record scores.
//!
//! Findings compound rather than take-the-worst: several simultaneous
//! defects on one value are worse than one, so a field's composite score is
//! 1 minus the capped sum of its finding weights. Range and completeness
//! findings additionally force the field classification to at least `error`
//! regardless of the numeric score. A record is the weighted mean of its
//! field scores, classified no better than its worst field.

use std::collections::{BTreeMap, BTreeSet};

use ehrqa_model::config::AuditConfig;
use ehrqa_model::finding::{Finding, MULTIVARIATE_FIELD};
use ehrqa_model::report::{RunEvent, RunEventKind};
use ehrqa_model::schema::{DetectorKind, FieldSchema};
use ehrqa_model::score::{Classification, FieldScore, RecordScore};

pub struct QualityScorer<'a> {
    config: &'a AuditConfig,
    schema: &'a FieldSchema,
}

impl<'a> QualityScorer<'a> {
    pub fn new(config: &'a AuditConfig, schema: &'a FieldSchema) -> Self {
        Self { config, schema }
    }

    /// Fuse all findings of the run into one score per record.
    /// `completeness[i]` is record i's share of present schema fields.
    pub fn score(
        &self,
        record_count: usize,
        findings: Vec<Finding>,
        events: &[RunEvent],
        completeness: &[f64],
    ) -> Vec<RecordScore> {
        let covered = self.covered_fields(events);

        let mut per_record: Vec<Vec<Finding>> = vec![Vec::new(); record_count];
        for finding in findings {
            if let Some(bucket) = per_record.get_mut(finding.record_index) {
                bucket.push(finding);
            }
        }

        per_record
            .into_iter()
            .enumerate()
            .map(|(idx, record_findings)| {
                self.score_record(
                    idx,
                    record_findings,
                    &covered,
                    completeness.get(idx).copied().unwrap_or(1.0),
                )
            })
            .collect()
    }

    /// Fields over which at least one enabled detector actually ran. A field
    /// whose every enabled detector was skipped has no defined score. The
    /// isolation forest never covers individual fields; its joint signal is
    /// scored under the synthetic multivariate marker instead.
    fn covered_fields(&self, events: &[RunEvent]) -> BTreeSet<String> {
        let skipped: BTreeSet<(&str, DetectorKind)> = events
            .iter()
            .filter(|event| event.kind == RunEventKind::Skipped)
            .filter_map(|event| event.field.as_deref().map(|field| (field, event.detector)))
            .collect();

        let mut covered = BTreeSet::new();
        for (field, rule) in self.schema.fields() {
            let ran = rule.detectors.iter().any(|kind| {
                *kind != DetectorKind::IsolationForest && !skipped.contains(&(field, *kind))
            });
            if ran {
                covered.insert(field.to_string());
            }
        }
        covered
    }

    fn score_record(
        &self,
        record_index: usize,
        findings: Vec<Finding>,
        covered: &BTreeSet<String>,
        completeness: f64,
    ) -> RecordScore {
        let mut by_field: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
        for finding in &findings {
            by_field
                .entry(finding.field.as_str())
                .or_default()
                .push(finding);
        }

        let mut field_scores = Vec::with_capacity(covered.len() + 1);
        for field in covered {
            let field_findings = by_field
                .get(field.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            field_scores.push(self.score_field(record_index, field, field_findings));
        }
        // The joint anomaly signal participates like a field, but only
        // materializes for records the forest actually flagged.
        if let Some(multivariate) = by_field.get(MULTIVARIATE_FIELD) {
            field_scores.push(self.score_field(record_index, MULTIVARIATE_FIELD, multivariate));
        }

        let mut weight_sum = 0.0;
        let mut score_sum = 0.0;
        for field_score in &field_scores {
            let weight = self.config.field_weight(&field_score.field);
            weight_sum += weight;
            score_sum += weight * field_score.composite_score;
        }
        let composite_score = if weight_sum > 0.0 {
            score_sum / weight_sum
        } else {
            1.0
        };

        let worst_field = field_scores
            .iter()
            .map(|field_score| field_score.classification)
            .max()
            .unwrap_or(Classification::Ok);
        let classification = self
            .config
            .thresholds
            .classify(composite_score)
            .worst(worst_field);

        RecordScore {
            record_index,
            composite_score,
            classification,
            completeness,
            field_scores,
            findings,
        }
    }

    fn score_field(&self, record_index: usize, field: &str, findings: &[&Finding]) -> FieldScore {
        let total: f64 = findings
            .iter()
            .map(|finding| finding.severity_weight)
            .sum();
        let composite_score = 1.0 - total.min(1.0);

        let mut classification = self.config.thresholds.classify(composite_score);
        if findings.iter().any(|finding| finding.forces_error()) {
            classification = classification.worst(Classification::Error);
        }

        FieldScore {
            record_index,
            field: field.to_string(),
            composite_score,
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrqa_model::schema::{FieldRule, FieldType};

    fn schema() -> FieldSchema {
        FieldSchema::new()
            .with_field(
                "age",
                FieldRule::new(FieldType::Numeric)
                    .with_detector(DetectorKind::Completeness)
                    .with_numeric_range(0.0, 120.0),
            )
            .with_field(
                "heart_rate",
                FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Completeness),
            )
    }

    fn finding(field: &str, detector: DetectorKind, weight: f64) -> Finding {
        Finding::new(0, field, detector, "x", weight, "test")
    }

    #[test]
    fn clean_record_scores_one() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        let records = scorer.score(1, Vec::new(), &[], &[1.0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].composite_score, 1.0);
        assert_eq!(records[0].classification, Classification::Ok);
        assert_eq!(records[0].field_scores.len(), 2);
    }

    #[test]
    fn findings_compound_and_cap_at_one() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        let findings = vec![
            finding("age", DetectorKind::Range, 0.8),
            finding("age", DetectorKind::Iqr, 0.9),
        ];
        let records = scorer.score(1, findings, &[], &[1.0]);
        let age = records[0].score_for("age").expect("age score");
        assert_eq!(age.composite_score, 0.0);
        assert_eq!(age.classification, Classification::Critical);
    }

    #[test]
    fn range_finding_forces_at_least_error() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        // Weight small enough that the score stays in the ok band.
        let findings = vec![finding("age", DetectorKind::Range, 0.05)];
        let records = scorer.score(1, findings, &[], &[1.0]);
        let age = records[0].score_for("age").expect("age score");
        assert!(age.composite_score >= 0.9);
        assert_eq!(age.classification, Classification::Error);
        assert_eq!(records[0].classification, Classification::Error);
    }

    #[test]
    fn failure_finding_does_not_force_error() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        let findings = vec![Finding::failure(
            0,
            "age",
            DetectorKind::Range,
            "abc",
            0.05,
            "not numeric",
        )];
        let records = scorer.score(1, findings, &[], &[1.0]);
        let age = records[0].score_for("age").expect("age score");
        assert_eq!(age.classification, Classification::Ok);
    }

    #[test]
    fn record_classification_is_never_better_than_worst_field() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        // One critical field among an otherwise clean record.
        let findings = vec![finding("age", DetectorKind::Range, 1.0)];
        let records = scorer.score(1, findings, &[], &[1.0]);
        // Weighted mean (0.0 + 1.0) / 2 = 0.5 would classify as error on
        // its own; the critical field drags the record down.
        assert_eq!(records[0].classification, Classification::Critical);
    }

    #[test]
    fn field_with_all_detectors_skipped_has_no_score() {
        let config = AuditConfig::default();
        let schema = FieldSchema::new().with_field(
            "glucose",
            FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Iqr),
        );
        let scorer = QualityScorer::new(&config, &schema);

        let events = vec![RunEvent::skipped(
            DetectorKind::Iqr,
            Some("glucose".to_string()),
            "constant distribution",
        )];
        let records = scorer.score(1, Vec::new(), &events, &[1.0]);
        assert!(records[0].field_scores.is_empty());
        assert_eq!(records[0].composite_score, 1.0);
    }

    #[test]
    fn multivariate_findings_participate_as_a_field() {
        let config = AuditConfig::default();
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        let findings = vec![Finding::new(
            0,
            MULTIVARIATE_FIELD,
            DetectorKind::IsolationForest,
            "age=3, heart_rate=190",
            0.7,
            "anomalous",
        )];
        let records = scorer.score(1, findings, &[], &[1.0]);
        let joint = records[0]
            .score_for(MULTIVARIATE_FIELD)
            .expect("multivariate score");
        assert!((joint.composite_score - 0.3).abs() < 1e-12);
        assert_eq!(records[0].field_scores.len(), 3);
    }

    #[test]
    fn field_weights_shift_the_record_mean() {
        let config = AuditConfig::default().with_field_weight("age", 3.0);
        let schema = schema();
        let scorer = QualityScorer::new(&config, &schema);

        let findings = vec![finding("age", DetectorKind::Completeness, 0.6)];
        let records = scorer.score(1, findings, &[], &[0.5]);
        // age scores 0.4 with weight 3, heart_rate 1.0 with weight 1.
        let expected = (3.0 * 0.4 + 1.0) / 4.0;
        assert!((records[0].composite_score - expected).abs() < 1e-12);
        assert!((records[0].completeness - 0.5).abs() < 1e-12);
    }
}
