//! The five quality detectors.
//!
//! Each detector shares the same capability: read the dataset and schema,
//! emit findings for the values it flags, and record skip/failure events for
//! anything it could not check. Detectors are mutually independent and
//! read-only over their inputs, which is what lets the engine fan them out
//! across threads and merge at a barrier.

mod completeness;
mod forest;
mod format;
mod iqr;
mod range;

pub use completeness::CompletenessAnalyzer;
pub use forest::IsolationForestDetector;
pub use format::FormatValidator;
pub use iqr::IqrOutlierDetector;
pub use range::RangeValidator;

use polars::prelude::DataFrame;

use ehrqa_model::config::AuditConfig;
use ehrqa_model::finding::Finding;
use ehrqa_model::report::RunEvent;
use ehrqa_model::schema::{DetectorKind, FieldSchema};
use ehrqa_model::Result;

use crate::columns::ColumnMap;

/// Read-only inputs shared by all detectors for one run.
pub struct DetectorContext<'a> {
    pub dataset: &'a DataFrame,
    pub schema: &'a FieldSchema,
    pub config: &'a AuditConfig,
    pub columns: &'a ColumnMap,
}

impl DetectorContext<'_> {
    pub fn height(&self) -> usize {
        self.dataset.height()
    }
}

/// Everything one detector produced over the whole dataset.
#[derive(Debug, Default)]
pub struct DetectorOutput {
    pub findings: Vec<Finding>,
    pub events: Vec<RunEvent>,
}

impl DetectorOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a per-field precondition skip. The field simply lacks this
    /// detector's findings; the run continues.
    pub fn skip_field(&mut self, detector: DetectorKind, field: &str, message: String) {
        tracing::debug!(detector = detector.name(), field, %message, "detector skipped");
        self.events
            .push(RunEvent::skipped(detector, Some(field.to_string()), message));
    }

    /// Record a dataset-wide precondition skip.
    pub fn skip(&mut self, detector: DetectorKind, message: String) {
        tracing::debug!(detector = detector.name(), %message, "detector skipped");
        self.events.push(RunEvent::skipped(detector, None, message));
    }

    /// Record a recovered per-field failure.
    pub fn fail_field(&mut self, detector: DetectorKind, field: &str, message: String) {
        tracing::warn!(detector = detector.name(), field, %message, "detector failed");
        self.events
            .push(RunEvent::failed(detector, Some(field.to_string()), message));
    }
}

/// Common capability of the five detectors.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Evaluate the whole dataset. Must not panic on malformed values:
    /// anything unexpected becomes a synthetic failure finding or an event,
    /// never an abort.
    fn evaluate(&self, ctx: &DetectorContext<'_>) -> DetectorOutput;
}

/// Build the detectors the schema enables, in fixed execution order.
/// Format patterns compile here, so a bad pattern aborts before scoring.
pub fn build_detectors(schema: &FieldSchema) -> Result<Vec<Box<dyn Detector>>> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    if schema.enables(DetectorKind::Completeness) {
        detectors.push(Box::new(CompletenessAnalyzer));
    }
    if schema.enables(DetectorKind::Iqr) {
        detectors.push(Box::new(IqrOutlierDetector));
    }
    if schema.enables(DetectorKind::IsolationForest) {
        detectors.push(Box::new(IsolationForestDetector));
    }
    if schema.enables(DetectorKind::Range) {
        detectors.push(Box::new(RangeValidator));
    }
    if schema.enables(DetectorKind::Format) {
        detectors.push(Box::new(FormatValidator::from_schema(schema)?));
    }
    Ok(detectors)
}
