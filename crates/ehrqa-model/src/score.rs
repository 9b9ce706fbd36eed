//! Composite scores and severity classifications.

use serde::{Deserialize, Serialize};

use crate::finding::Finding;

/// Discrete severity classification of a field or record.
///
/// Variants are ordered from best to worst so that `max` selects the more
/// severe of two classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Ok,
    Warning,
    Error,
    Critical,
}

impl Classification {
    /// The more severe of two classifications.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Fused quality score for one field of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub record_index: usize,
    pub field: String,
    /// 1.0 minus the capped sum of finding weights; 1.0 means defect-free.
    pub composite_score: f64,
    pub classification: Classification,
}

/// Fused quality score for one record, with the findings that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordScore {
    pub record_index: usize,
    /// Weighted mean of the record's field scores.
    pub composite_score: f64,
    /// Never better than any individual field's classification.
    pub classification: Classification,
    /// Fraction of schema fields with a present, non-sentinel value.
    pub completeness: f64,
    pub field_scores: Vec<FieldScore>,
    pub findings: Vec<Finding>,
}

impl RecordScore {
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn score_for(&self, field: &str) -> Option<&FieldScore> {
        self.field_scores.iter().find(|score| score.field == field)
    }

    pub fn findings_for(&self, field: &str) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|finding| finding.field == field)
            .collect()
    }
}
