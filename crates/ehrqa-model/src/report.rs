//! The audit-ready quality report.
//!
//! A [`QualityReport`] is the terminal output of one audit run: dataset-level
//! rollups, every record's score with its contributing findings, and the
//! skip/failure events describing what was not checked. It is fully
//! self-describing; interpreting it never requires the live dataset.

use serde::{Deserialize, Serialize};

use crate::schema::DetectorKind;
use crate::score::{Classification, RecordScore};

/// What happened to a detector that did not evaluate normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    /// Preconditions unmet (degenerate statistics, insufficient
    /// dimensionality); the field simply lacks that detector's finding.
    Skipped,
    /// The detector hit an unexpected error and was replaced by a synthetic
    /// pessimistic finding.
    Failed,
}

/// Skip/failure metadata embedded in the report so consumers can see what
/// was not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub detector: DetectorKind,
    /// None for dataset-wide events (e.g. the isolation forest skipping).
    pub field: Option<String>,
    pub message: String,
}

impl RunEvent {
    pub fn skipped(detector: DetectorKind, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RunEventKind::Skipped,
            detector,
            field,
            message: message.into(),
        }
    }

    pub fn failed(detector: DetectorKind, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RunEventKind::Failed,
            detector,
            field,
            message: message.into(),
        }
    }
}

/// Record counts per classification band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
}

impl ClassificationCounts {
    pub fn increment(&mut self, classification: Classification) {
        match classification {
            Classification::Ok => self.ok += 1,
            Classification::Warning => self.warning += 1,
            Classification::Error => self.error += 1,
            Classification::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.warning + self.error + self.critical
    }
}

/// Finding counts per detector. Synthetic failure findings are excluded;
/// failures are visible through [`RunEvent`]s and `failure_count` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorCounts {
    pub completeness: usize,
    pub iqr: usize,
    pub isolation_forest: usize,
    pub range: usize,
    pub format: usize,
}

impl DetectorCounts {
    pub fn increment(&mut self, detector: DetectorKind) {
        match detector {
            DetectorKind::Completeness => self.completeness += 1,
            DetectorKind::Iqr => self.iqr += 1,
            DetectorKind::IsolationForest => self.isolation_forest += 1,
            DetectorKind::Range => self.range += 1,
            DetectorKind::Format => self.format += 1,
        }
    }

    pub fn get(&self, detector: DetectorKind) -> usize {
        match detector {
            DetectorKind::Completeness => self.completeness,
            DetectorKind::Iqr => self.iqr,
            DetectorKind::IsolationForest => self.isolation_forest,
            DetectorKind::Range => self.range,
            DetectorKind::Format => self.format,
        }
    }

    pub fn total(&self) -> usize {
        self.completeness + self.iqr + self.isolation_forest + self.range + self.format
    }
}

/// Missing-value rollup for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMissingSummary {
    pub field: String,
    pub missing_count: usize,
    pub missing_pct: f64,
}

/// Basic statistics for one numeric field, over non-missing parsable values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNumericSummary {
    pub field: String,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// Dataset-level rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub record_count: usize,
    pub field_count: usize,
    pub mean_composite_score: f64,
    pub mean_completeness: f64,
    /// Records with no findings at all.
    pub clean_record_count: usize,
    pub classifications: ClassificationCounts,
    pub detector_counts: DetectorCounts,
    /// Synthetic detector-failure findings across the run.
    pub failure_count: usize,
    pub missing_values: Vec<FieldMissingSummary>,
    pub numeric_stats: Vec<FieldNumericSummary>,
}

/// Terminal output of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub summary: DatasetSummary,
    pub records: Vec<RecordScore>,
    pub events: Vec<RunEvent>,
}

impl QualityReport {
    pub fn record(&self, record_index: usize) -> Option<&RecordScore> {
        self.records
            .iter()
            .find(|record| record.record_index == record_index)
    }

    pub fn skipped_events(&self) -> Vec<&RunEvent> {
        self.events
            .iter()
            .filter(|event| event.kind == RunEventKind::Skipped)
            .collect()
    }

    pub fn failed_events(&self) -> Vec<&RunEvent> {
        self.events
            .iter()
            .filter(|event| event.kind == RunEventKind::Failed)
            .collect()
    }
}
