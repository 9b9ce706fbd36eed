pub mod config;
pub mod error;
pub mod finding;
pub mod report;
pub mod schema;
pub mod score;

pub use config::{AuditConfig, ClassificationThresholds};
pub use error::{AuditError, Result};
pub use finding::{Finding, MULTIVARIATE_FIELD};
pub use report::{
    ClassificationCounts, DatasetSummary, DetectorCounts, FieldMissingSummary,
    FieldNumericSummary, QualityReport, RunEvent, RunEventKind,
};
pub use schema::{DetectorKind, FieldRule, FieldSchema, FieldType, ValidRange};
pub use score::{Classification, FieldScore, RecordScore};
