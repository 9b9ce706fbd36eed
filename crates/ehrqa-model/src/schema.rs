//! Field schema: the static description of each dataset column.
//!
//! A [`FieldSchema`] maps field names to the rules the audit engine applies
//! to them: semantic type, missing-value sentinels, valid range or allowed
//! set, format pattern, and the set of enabled detectors. Schemas are built
//! by the configuration-loading layer and are read-only for the lifetime of
//! a run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Numeric,
    Categorical,
    Date,
    Text,
}

/// The five quality detectors a field can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Completeness,
    Iqr,
    IsolationForest,
    Range,
    Format,
}

impl DetectorKind {
    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::Completeness => "completeness",
            DetectorKind::Iqr => "iqr",
            DetectorKind::IsolationForest => "isolation_forest",
            DetectorKind::Range => "range",
            DetectorKind::Format => "format",
        }
    }
}

/// Valid-value constraint for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidRange {
    /// Inclusive numeric bounds.
    Numeric { min: f64, max: f64 },
    /// Allowed categorical values, matched case-insensitively on trimmed text.
    AllowedSet(BTreeSet<String>),
}

/// Audit rules for a single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub field_type: FieldType,
    /// String forms treated as missing besides null/blank (e.g. "0" for a
    /// field where zero is clinically impossible).
    pub missing_sentinels: BTreeSet<String>,
    pub valid_range: Option<ValidRange>,
    /// Regex source matched against the whole trimmed value.
    pub format_pattern: Option<String>,
    pub detectors: BTreeSet<DetectorKind>,
}

impl FieldRule {
    /// Create a rule with no sentinels, constraints, or enabled detectors.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            missing_sentinels: BTreeSet::new(),
            valid_range: None,
            format_pattern: None,
            detectors: BTreeSet::new(),
        }
    }

    pub fn with_detector(mut self, detector: DetectorKind) -> Self {
        self.detectors.insert(detector);
        self
    }

    pub fn with_detectors<I>(mut self, detectors: I) -> Self
    where
        I: IntoIterator<Item = DetectorKind>,
    {
        self.detectors.extend(detectors);
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.missing_sentinels.insert(sentinel.into());
        self
    }

    /// Set inclusive numeric bounds and enable the range detector.
    pub fn with_numeric_range(mut self, min: f64, max: f64) -> Self {
        self.valid_range = Some(ValidRange::Numeric { min, max });
        self.detectors.insert(DetectorKind::Range);
        self
    }

    /// Set the allowed categorical values and enable the range detector.
    pub fn with_allowed_set<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_range = Some(ValidRange::AllowedSet(
            values.into_iter().map(Into::into).collect(),
        ));
        self.detectors.insert(DetectorKind::Range);
        self
    }

    /// Set the format pattern and enable the format detector.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.format_pattern = Some(pattern.into());
        self.detectors.insert(DetectorKind::Format);
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.field_type == FieldType::Numeric
    }

    pub fn enables(&self, detector: DetectorKind) -> bool {
        self.detectors.contains(&detector)
    }
}

/// Ordered mapping from field name to its audit rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: BTreeMap<String, FieldRule>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: FieldRule) {
        self.fields.insert(name.into(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Fields that enable the given detector, in name order.
    pub fn fields_enabling(&self, detector: DetectorKind) -> Vec<(&str, &FieldRule)> {
        self.fields()
            .filter(|(_, rule)| rule.enables(detector))
            .collect()
    }

    /// Whether any field enables the given detector.
    pub fn enables(&self, detector: DetectorKind) -> bool {
        self.fields.values().any(|rule| rule.enables(detector))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
