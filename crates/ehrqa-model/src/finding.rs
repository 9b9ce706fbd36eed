//! Detector findings: one flagged value, traceable to its raw form.

use serde::{Deserialize, Serialize};

use crate::schema::DetectorKind;

/// Synthetic field name carried by isolation-forest findings. A multivariate
/// anomaly is a joint signal over all numeric fields and cannot be pinned to
/// one column.
pub const MULTIVARIATE_FIELD: &str = "_multivariate";

/// A single defect flagged by one detector for one (record, field) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Zero-based row index of the record in the dataset.
    pub record_index: usize,
    pub field: String,
    pub detector: DetectorKind,
    /// The offending value as read from the dataset, so the report can be
    /// interpreted without access to the live dataset. Empty for null.
    pub raw_value: String,
    /// Contribution to the field's defect total, in [0, 1].
    pub severity_weight: f64,
    pub explanation: String,
    /// True for the synthetic finding recorded when a detector failed on
    /// this field instead of evaluating it. Failure findings carry a
    /// pessimistic weight but never trigger classification overrides.
    #[serde(default)]
    pub detector_failed: bool,
}

impl Finding {
    pub fn new(
        record_index: usize,
        field: impl Into<String>,
        detector: DetectorKind,
        raw_value: impl Into<String>,
        severity_weight: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            record_index,
            field: field.into(),
            detector,
            raw_value: raw_value.into(),
            severity_weight,
            explanation: explanation.into(),
            detector_failed: false,
        }
    }

    /// Synthetic finding standing in for a detector that failed on a field.
    pub fn failure(
        record_index: usize,
        field: impl Into<String>,
        detector: DetectorKind,
        raw_value: impl Into<String>,
        severity_weight: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            detector_failed: true,
            ..Self::new(
                record_index,
                field,
                detector,
                raw_value,
                severity_weight,
                explanation,
            )
        }
    }

    /// Whether this finding forces the field classification to at least
    /// `error`, regardless of the composite score.
    pub fn forces_error(&self) -> bool {
        !self.detector_failed
            && matches!(
                self.detector,
                DetectorKind::Range | DetectorKind::Completeness
            )
    }
}
