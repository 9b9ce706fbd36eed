//! End-to-end audit runs over small clinical datasets.

use ehrqa_engine::AuditEngine;
use ehrqa_model::{
    AuditConfig, AuditError, Classification, DetectorKind, FieldRule, FieldSchema, FieldType,
    MULTIVARIATE_FIELD, RunEventKind,
};
use polars::prelude::df;

fn engine() -> AuditEngine {
    AuditEngine::new(AuditConfig::default())
}

#[test]
fn sentinel_zero_is_a_completeness_finding() {
    // Ten heart-rate readings, one recorded as 0, with 0 configured as a
    // sentinel: that record alone gets a completeness finding.
    let dataset = df! {
        "heart_rate" => [72.0, 68.0, 75.0, 80.0, 0.0, 71.0, 69.0, 77.0, 74.0, 70.0]
    }
    .unwrap();
    let schema = FieldSchema::new().with_field(
        "heart_rate",
        FieldRule::new(FieldType::Numeric)
            .with_detector(DetectorKind::Completeness)
            .with_sentinel("0"),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    assert_eq!(report.records.len(), 10);

    let flagged = report.record(4).unwrap();
    assert_eq!(flagged.findings.len(), 1);
    let finding = &flagged.findings[0];
    assert_eq!(finding.detector, DetectorKind::Completeness);
    assert_eq!(finding.raw_value, "0");
    assert!(finding.explanation.contains("sentinel"));

    // Field score is 1 minus the completeness weight.
    let config = AuditConfig::default();
    let field = flagged.score_for("heart_rate").unwrap();
    assert!((field.composite_score - (1.0 - config.completeness_weight)).abs() < 1e-12);
    assert_eq!(field.classification, Classification::Error);
    assert!((flagged.completeness - 0.0).abs() < 1e-12);

    // Every other record is clean.
    for idx in (0..10).filter(|idx| *idx != 4) {
        let record = report.record(idx).unwrap();
        assert!(record.findings.is_empty());
        assert_eq!(record.classification, Classification::Ok);
    }
    assert_eq!(report.summary.clean_record_count, 9);
}

#[test]
fn extreme_age_triggers_iqr_and_range_and_classifies_critical() {
    // Twenty ages clustered 20-77 plus one impossible 400, with clinical
    // range [0, 120].
    let mut ages: Vec<f64> = (0..20).map(|i| 20.0 + 3.0 * f64::from(i)).collect();
    ages.push(400.0);
    let dataset = df! { "age" => ages }.unwrap();
    let schema = FieldSchema::new().with_field(
        "age",
        FieldRule::new(FieldType::Numeric)
            .with_detector(DetectorKind::Iqr)
            .with_numeric_range(0.0, 120.0),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    let flagged = report.record(20).unwrap();

    let detectors: Vec<DetectorKind> = flagged
        .findings
        .iter()
        .map(|finding| finding.detector)
        .collect();
    assert!(detectors.contains(&DetectorKind::Iqr));
    assert!(detectors.contains(&DetectorKind::Range));

    let range_finding = flagged
        .findings
        .iter()
        .find(|finding| finding.detector == DetectorKind::Range)
        .unwrap();
    assert!(range_finding.explanation.contains("above maximum 120"));
    assert_eq!(range_finding.raw_value, "400");

    // Both findings compound past the cap: field score 0, record critical.
    let field = flagged.score_for("age").unwrap();
    assert_eq!(field.composite_score, 0.0);
    assert_eq!(flagged.classification, Classification::Critical);
}

#[test]
fn joint_anomaly_is_flagged_by_the_forest_alone() {
    // Two strongly correlated vitals; one record sits far off the diagonal
    // while each coordinate stays well inside its marginal IQR bounds.
    let mut x: Vec<f64> = (0..25).map(|i| f64::from(i) * 4.0).collect();
    let mut y = x.clone();
    x.push(0.0);
    y.push(96.0);
    let dataset = df! { "systolic" => x, "diastolic" => y }.unwrap();

    let rule = || {
        FieldRule::new(FieldType::Numeric)
            .with_detectors([DetectorKind::Iqr, DetectorKind::IsolationForest])
    };
    let schema = FieldSchema::new()
        .with_field("systolic", rule())
        .with_field("diastolic", rule());

    // Contamination wide enough that the handful of most-isolated records
    // (the planted anomaly and at most a couple of hull points) all clear
    // the threshold.
    let engine = AuditEngine::new(AuditConfig::default().with_contamination(0.15));
    let report = engine.run(&dataset, &schema).unwrap();
    let anomalous = report.record(25).unwrap();

    let forest_findings = anomalous.findings_for(MULTIVARIATE_FIELD);
    assert_eq!(forest_findings.len(), 1);
    assert_eq!(forest_findings[0].detector, DetectorKind::IsolationForest);
    assert!(forest_findings[0].raw_value.contains("systolic=0"));
    assert!(forest_findings[0].raw_value.contains("diastolic=96"));

    // IQR contributes nothing for that record.
    assert!(
        anomalous
            .findings
            .iter()
            .all(|finding| finding.detector != DetectorKind::Iqr)
    );
    assert!(anomalous.score_for(MULTIVARIATE_FIELD).is_some());
}

#[test]
fn schema_field_absent_from_dataset_aborts_the_run() {
    let dataset = df! { "age" => [40.0, 50.0] }.unwrap();
    let schema = FieldSchema::new()
        .with_field("age", FieldRule::new(FieldType::Numeric))
        .with_field(
            "bp",
            FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Completeness),
        );

    let err = engine().run(&dataset, &schema).unwrap_err();
    assert!(matches!(err, AuditError::UnknownField { field } if field == "bp"));
}

#[test]
fn empty_inputs_are_fatal() {
    let dataset = df! { "age" => Vec::<f64>::new() }.unwrap();
    let schema = FieldSchema::new().with_field("age", FieldRule::new(FieldType::Numeric));
    assert!(matches!(
        engine().run(&dataset, &schema),
        Err(AuditError::EmptyDataset)
    ));

    let dataset = df! { "age" => [40.0] }.unwrap();
    assert!(matches!(
        engine().run(&dataset, &FieldSchema::new()),
        Err(AuditError::EmptySchema)
    ));
}

#[test]
fn same_seed_yields_bit_identical_reports() {
    let mut x: Vec<f64> = (0..30).map(|i| 50.0 + f64::from(i)).collect();
    let mut y: Vec<f64> = (0..30).map(|i| 90.0 - f64::from(i)).collect();
    x.push(50.0);
    y.push(90.0);
    x.push(500.0);
    y.push(-40.0);
    let dataset = df! { "glucose" => x, "bmi" => y }.unwrap();

    let rule = || {
        FieldRule::new(FieldType::Numeric)
            .with_detectors([
                DetectorKind::Completeness,
                DetectorKind::Iqr,
                DetectorKind::IsolationForest,
            ])
            .with_numeric_range(-100.0, 400.0)
    };
    let schema = FieldSchema::new()
        .with_field("glucose", rule())
        .with_field("bmi", rule());

    let first = engine().run(&dataset, &schema).unwrap();
    let second = engine().run(&dataset, &schema).unwrap();

    let first_json = serde_json::to_string(&first).unwrap();
    let second_json = serde_json::to_string(&second).unwrap();
    assert_eq!(first_json, second_json);
}

#[test]
fn null_values_always_produce_completeness_findings() {
    let dataset = df! {
        "weight" => [Some(70.5), None, Some(82.0), None]
    }
    .unwrap();
    let schema = FieldSchema::new().with_field(
        "weight",
        FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Completeness),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    for idx in [1, 3] {
        let record = report.record(idx).unwrap();
        assert_eq!(record.findings.len(), 1);
        assert_eq!(record.findings[0].detector, DetectorKind::Completeness);
        assert_eq!(record.findings[0].raw_value, "");
    }
    for idx in [0, 2] {
        assert!(report.record(idx).unwrap().findings.is_empty());
    }
}

#[test]
fn global_sentinels_count_as_missing() {
    let dataset = df! { "smoker" => ["yes", "N/A", "no", "Unknown"] }.unwrap();
    let schema = FieldSchema::new().with_field(
        "smoker",
        FieldRule::new(FieldType::Categorical).with_detector(DetectorKind::Completeness),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    assert_eq!(report.summary.detector_counts.completeness, 2);
    assert_eq!(report.summary.missing_values[0].missing_count, 2);
    assert!((report.summary.missing_values[0].missing_pct - 50.0).abs() < 1e-12);
}

#[test]
fn degenerate_statistics_are_skipped_not_errored() {
    // Constant column: IQR is zero. Single numeric field: the forest has
    // nothing multivariate to model. Both are skips, never errors.
    let dataset = df! { "temp" => [37.0, 37.0, 37.0, 37.0, 37.0, 37.0] }.unwrap();
    let schema = FieldSchema::new().with_field(
        "temp",
        FieldRule::new(FieldType::Numeric)
            .with_detectors([DetectorKind::Iqr, DetectorKind::IsolationForest]),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    assert_eq!(report.records.len(), 6);
    assert!(report.records.iter().all(|record| record.findings.is_empty()));

    let skips = report.skipped_events();
    assert_eq!(skips.len(), 2);
    assert!(
        skips
            .iter()
            .any(|event| event.detector == DetectorKind::Iqr
                && event.field.as_deref() == Some("temp"))
    );
    assert!(
        skips
            .iter()
            .any(|event| event.detector == DetectorKind::IsolationForest && event.field.is_none())
    );

    // Every enabled detector was skipped, so the field has no defined score.
    assert!(report.records[0].field_scores.is_empty());
}

#[test]
fn malformed_value_is_recovered_as_failure_finding() {
    let dataset = df! { "age" => ["50", "abc", "61", "70", "44"] }.unwrap();
    let schema = FieldSchema::new().with_field(
        "age",
        FieldRule::new(FieldType::Numeric).with_numeric_range(0.0, 120.0),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    assert_eq!(report.records.len(), 5);

    let broken = report.record(1).unwrap();
    assert_eq!(broken.findings.len(), 1);
    assert!(broken.findings[0].detector_failed);
    assert_eq!(broken.findings[0].raw_value, "abc");

    assert_eq!(report.summary.failure_count, 1);
    assert_eq!(report.summary.detector_counts.range, 0);
    let failures = report.failed_events();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, RunEventKind::Failed);
    assert_eq!(failures[0].field.as_deref(), Some("age"));
}

#[test]
fn format_mismatches_are_flagged_per_pattern() {
    let dataset = df! {
        "patient_id" => ["P0001", "P0002", "bad-id", "P0404"]
    }
    .unwrap();
    let schema = FieldSchema::new().with_field(
        "patient_id",
        FieldRule::new(FieldType::Text).with_pattern(r"P\d{4}"),
    );

    let report = engine().run(&dataset, &schema).unwrap();
    let flagged = report.record(2).unwrap();
    assert_eq!(flagged.findings.len(), 1);
    assert_eq!(flagged.findings[0].detector, DetectorKind::Format);
    assert_eq!(flagged.findings[0].raw_value, "bad-id");
    assert_eq!(flagged.classification, Classification::Warning);
}

#[test]
fn invalid_pattern_aborts_before_scoring() {
    let dataset = df! { "patient_id" => ["P0001"] }.unwrap();
    let schema = FieldSchema::new().with_field(
        "patient_id",
        FieldRule::new(FieldType::Text).with_pattern(r"P[0-9"),
    );

    assert!(matches!(
        engine().run(&dataset, &schema),
        Err(AuditError::InvalidPattern { .. })
    ));
}

#[test]
fn summary_rollups_are_consistent() {
    let dataset = df! {
        "age" => [Some(40.0), Some(400.0), None, Some(51.0), Some(62.0), Some(45.0)],
        "sex" => [Some("M"), Some("F"), Some("F"), Some("X"), Some("M"), None]
    }
    .unwrap();
    let schema = FieldSchema::new()
        .with_field(
            "age",
            FieldRule::new(FieldType::Numeric)
                .with_detector(DetectorKind::Completeness)
                .with_numeric_range(0.0, 120.0),
        )
        .with_field(
            "sex",
            FieldRule::new(FieldType::Categorical)
                .with_detector(DetectorKind::Completeness)
                .with_allowed_set(["M", "F"]),
        );

    let report = engine().run(&dataset, &schema).unwrap();
    let summary = &report.summary;
    assert_eq!(summary.record_count, 6);
    assert_eq!(summary.field_count, 2);
    assert_eq!(summary.classifications.total(), 6);

    let mut by_detector = 0usize;
    for record in &report.records {
        by_detector += record
            .findings
            .iter()
            .filter(|finding| !finding.detector_failed)
            .count();
    }
    assert_eq!(summary.detector_counts.total(), by_detector);
    // 400 out of range, "X" outside the allowed set, two nulls.
    assert_eq!(summary.detector_counts.range, 2);
    assert_eq!(summary.detector_counts.completeness, 2);
    assert_eq!(summary.clean_record_count, 2);

    let age_stats = summary
        .numeric_stats
        .iter()
        .find(|stats| stats.field == "age")
        .unwrap();
    assert_eq!(age_stats.min, 40.0);
    assert_eq!(age_stats.max, 400.0);

    let mean = report
        .records
        .iter()
        .map(|record| record.composite_score)
        .sum::<f64>()
        / 6.0;
    assert!((summary.mean_composite_score - mean).abs() < 1e-12);
}

#[test]
fn range_violation_never_classifies_better_than_error() {
    // A record whose only defect is a mild range violation with an
    // otherwise perfect score still classifies at least error.
    let dataset = df! {
        "age" => [50.0, 130.0],
        "heart_rate" => [70.0, 72.0],
        "bmi" => [22.0, 23.5]
    }
    .unwrap();
    let schema = FieldSchema::new()
        .with_field(
            "age",
            FieldRule::new(FieldType::Numeric).with_numeric_range(0.0, 120.0),
        )
        .with_field(
            "heart_rate",
            FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Completeness),
        )
        .with_field(
            "bmi",
            FieldRule::new(FieldType::Numeric).with_detector(DetectorKind::Completeness),
        );

    let report = engine().run(&dataset, &schema).unwrap();
    let flagged = report.record(1).unwrap();
    assert!(flagged.classification >= Classification::Error);
    assert_eq!(report.record(0).unwrap().classification, Classification::Ok);
}

#[test]
fn adding_a_second_defect_never_raises_the_record_score() {
    let values = vec!["52", "61", "999", "48", "57"];
    let dataset = df! { "age" => values }.unwrap();

    let range_only = FieldSchema::new().with_field(
        "age",
        FieldRule::new(FieldType::Numeric).with_numeric_range(0.0, 120.0),
    );
    let range_and_format = FieldSchema::new().with_field(
        "age",
        FieldRule::new(FieldType::Numeric)
            .with_numeric_range(0.0, 120.0)
            .with_pattern(r"\d{2}"),
    );

    let first = engine().run(&dataset, &range_only).unwrap();
    let second = engine().run(&dataset, &range_and_format).unwrap();

    for (a, b) in first.records.iter().zip(&second.records) {
        assert!(b.composite_score <= a.composite_score + 1e-12);
    }
    // The 999 record accumulates both range and format findings.
    assert_eq!(second.record(2).unwrap().findings.len(), 2);
}
