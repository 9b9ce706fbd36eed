//! Audit run configuration.
//!
//! The configuration is an immutable value passed explicitly into each run,
//! so concurrent runs over different datasets never interfere.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::score::Classification;

/// Lower composite-score bounds for each classification band.
///
/// A score at or above `ok` classifies as ok, at or above `warning` as
/// warning, at or above `error` as error, and anything below as critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationThresholds {
    pub ok: f64,
    pub warning: f64,
    pub error: f64,
    pub critical: f64,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            ok: 0.9,
            warning: 0.7,
            error: 0.4,
            critical: 0.0,
        }
    }
}

impl ClassificationThresholds {
    pub fn classify(&self, score: f64) -> Classification {
        if score >= self.ok {
            Classification::Ok
        } else if score >= self.warning {
            Classification::Warning
        } else if score >= self.error {
            Classification::Error
        } else {
            Classification::Critical
        }
    }

    fn validate(&self) -> Result<()> {
        let ordered = self.ok > self.warning
            && self.warning > self.error
            && self.error >= self.critical
            && self.critical >= 0.0
            && self.ok <= 1.0;
        if !ordered {
            return Err(AuditError::InvalidConfig(format!(
                "classification thresholds must satisfy 1 >= ok > warning > error >= critical >= 0, \
                 got ok={} warning={} error={} critical={}",
                self.ok, self.warning, self.error, self.critical
            )));
        }
        Ok(())
    }
}

/// Options recognized by the audit engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// IQR multiplier k; outlier bounds are [Q1 - k*IQR, Q3 + k*IQR].
    pub iqr_multiplier: f64,
    /// Minimum non-missing sample count before the IQR detector runs on a
    /// field.
    pub min_samples_for_iqr: usize,
    /// Number of trees in the isolation forest ensemble.
    pub isolation_forest_estimators: usize,
    /// Expected fraction of anomalous records, in [0, 0.5]. The anomaly
    /// threshold is the (1 - contamination) quantile of the run's scores.
    pub isolation_forest_contamination: f64,
    /// Seed for tree construction. Fixed per run so results are
    /// reproducible; varying the seed is an accepted source of run-to-run
    /// variance.
    pub isolation_forest_seed: u64,
    /// Minimum numeric field count before the isolation forest runs.
    pub min_numeric_fields_for_model: usize,
    pub thresholds: ClassificationThresholds,
    /// Per-field weight used in the record-level weighted mean. Fields not
    /// listed weigh 1.0.
    pub field_weights: BTreeMap<String, f64>,
    /// String forms treated as missing in every field, besides null/blank.
    pub global_missing_sentinels: BTreeSet<String>,
    /// Severity weight of a completeness finding.
    pub completeness_weight: f64,
    /// Severity weight of a range-violation finding.
    pub range_weight: f64,
    /// Severity weight of a format-mismatch finding.
    pub format_weight: f64,
    /// Pessimistic severity weight of a synthetic detector-failure finding.
    pub failure_weight: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            min_samples_for_iqr: 5,
            isolation_forest_estimators: 100,
            isolation_forest_contamination: 0.05,
            isolation_forest_seed: 42,
            min_numeric_fields_for_model: 2,
            thresholds: ClassificationThresholds::default(),
            field_weights: BTreeMap::new(),
            global_missing_sentinels: ["", "N/A", "Unknown"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            completeness_weight: 0.6,
            range_weight: 0.8,
            format_weight: 0.3,
            failure_weight: 0.6,
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = multiplier;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.isolation_forest_seed = seed;
        self
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.isolation_forest_contamination = contamination;
        self
    }

    pub fn with_estimators(mut self, estimators: usize) -> Self {
        self.isolation_forest_estimators = estimators;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ClassificationThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_field_weight(mut self, field: impl Into<String>, weight: f64) -> Self {
        self.field_weights.insert(field.into(), weight);
        self
    }

    pub fn with_global_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.global_missing_sentinels.insert(sentinel.into());
        self
    }

    /// Weight used for a field in the record-level mean.
    pub fn field_weight(&self, field: &str) -> f64 {
        self.field_weights.get(field).copied().unwrap_or(1.0)
    }

    /// Check option ranges. Called once at the start of every run.
    pub fn validate(&self) -> Result<()> {
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(AuditError::InvalidConfig(format!(
                "iqr_multiplier must be a positive finite number, got {}",
                self.iqr_multiplier
            )));
        }
        if !(0.0..=0.5).contains(&self.isolation_forest_contamination) {
            return Err(AuditError::InvalidConfig(format!(
                "isolation_forest_contamination must be in [0, 0.5], got {}",
                self.isolation_forest_contamination
            )));
        }
        if self.isolation_forest_estimators == 0 {
            return Err(AuditError::InvalidConfig(
                "isolation_forest_estimators must be at least 1".to_string(),
            ));
        }
        self.thresholds.validate()?;
        for (name, weight) in [
            ("completeness_weight", self.completeness_weight),
            ("range_weight", self.range_weight),
            ("format_weight", self.format_weight),
            ("failure_weight", self.failure_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(AuditError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {weight}"
                )));
            }
        }
        for (field, weight) in &self.field_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(AuditError::InvalidConfig(format!(
                    "field weight for '{field}' must be non-negative, got {weight}"
                )));
            }
        }
        Ok(())
    }
}
