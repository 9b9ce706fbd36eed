//! Quality assessment engine for tabular EHR datasets.
//!
//! Given an in-memory dataset (a Polars `DataFrame`), a [`FieldSchema`]
//! describing each column's rules, and an [`AuditConfig`], one run detects
//! missing values, statistical (IQR) and model-based (isolation forest)
//! outliers, clinical range violations, and format mismatches, then fuses
//! the findings into composite scores and severity classifications per
//! field and record. The result is a self-describing
//! [`QualityReport`](ehrqa_model::QualityReport): every flagged value is
//! embedded alongside the score it caused, and anything a detector skipped
//! or failed on is listed as run metadata rather than silently dropped.
//!
//! Ingestion, configuration loading, visualization, and report export live
//! in separate layers; this crate is the in-process library boundary
//! between them.
//!
//! # Example
//!
//! ```no_run
//! use ehrqa_engine::AuditEngine;
//! use ehrqa_model::{AuditConfig, DetectorKind, FieldRule, FieldSchema, FieldType};
//! use polars::prelude::df;
//!
//! let dataset = df! { "heart_rate" => [72.0, 0.0, 68.0] }?;
//! let schema = FieldSchema::new().with_field(
//!     "heart_rate",
//!     FieldRule::new(FieldType::Numeric)
//!         .with_detector(DetectorKind::Completeness)
//!         .with_sentinel("0"),
//! );
//!
//! let report = AuditEngine::new(AuditConfig::default()).run(&dataset, &schema)?;
//! println!("mean score {}", report.summary.mean_composite_score);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod aggregate;
mod columns;
mod detectors;
mod scorer;
mod stats;
mod value;

pub use columns::ColumnMap;
pub use detectors::{
    CompletenessAnalyzer, Detector, DetectorContext, DetectorOutput, FormatValidator,
    IqrOutlierDetector, IsolationForestDetector, RangeValidator,
};
pub use scorer::QualityScorer;

use polars::prelude::DataFrame;

use ehrqa_model::config::AuditConfig;
use ehrqa_model::error::AuditError;
use ehrqa_model::report::{QualityReport, RunEvent};
use ehrqa_model::schema::FieldSchema;
use ehrqa_model::Result;

/// One engine per configuration. Schema and dataset are passed per run, so
/// a single engine can audit any number of datasets, concurrently if the
/// caller wishes; nothing is shared between runs.
#[derive(Debug, Clone, Default)]
pub struct AuditEngine {
    config: AuditConfig,
}

impl AuditEngine {
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Run one audit. Fails fast on configuration defects (unknown fields,
    /// invalid thresholds, bad patterns) and on empty inputs; otherwise
    /// always returns a report covering every record.
    pub fn run(&self, dataset: &DataFrame, schema: &FieldSchema) -> Result<QualityReport> {
        self.config.validate()?;
        if schema.is_empty() {
            return Err(AuditError::EmptySchema);
        }
        if dataset.height() == 0 {
            return Err(AuditError::EmptyDataset);
        }

        let columns = ColumnMap::resolve(dataset, schema)?;
        let detectors = detectors::build_detectors(schema)?;
        let ctx = DetectorContext {
            dataset,
            schema,
            config: &self.config,
            columns: &columns,
        };

        let mut findings = Vec::new();
        let mut events = Vec::new();
        for output in run_detectors(&detectors, &ctx) {
            findings.extend(output.findings);
            events.extend(output.events);
        }

        let (completeness, missing_values) =
            aggregate::missing_profile(dataset, schema, &self.config, &columns);
        let records = QualityScorer::new(&self.config, schema).score(
            dataset.height(),
            findings,
            &events,
            &completeness,
        );

        tracing::debug!(
            records = records.len(),
            events = events.len(),
            "audit run complete"
        );
        Ok(aggregate::build_report(
            dataset,
            schema,
            &self.config,
            &columns,
            records,
            events,
            missing_values,
        ))
    }
}

/// Fan the detectors out across scoped threads and join at a barrier.
/// Outputs are collected in the detectors' fixed order, so parallel
/// execution never changes the merged result. A panicking detector is
/// downgraded to a failure event instead of poisoning the run.
fn run_detectors(
    detectors: &[Box<dyn Detector>],
    ctx: &DetectorContext<'_>,
) -> Vec<DetectorOutput> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = detectors
            .iter()
            .map(|detector| scope.spawn(move || detector.evaluate(ctx)))
            .collect();
        handles
            .into_iter()
            .zip(detectors)
            .map(|(handle, detector)| {
                handle.join().unwrap_or_else(|_| {
                    let mut output = DetectorOutput::new();
                    output.events.push(RunEvent::failed(
                        detector.kind(),
                        None,
                        "detector panicked".to_string(),
                    ));
                    output
                })
            })
            .collect()
    })
}
