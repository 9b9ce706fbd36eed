use thiserror::Error;

/// Fatal audit errors. Anything recoverable (skipped or failed detectors)
/// is reported as run metadata instead, never through this type.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The schema names a field the dataset does not contain. Scoring with a
    /// mismatched schema would silently mis-score every record, so this
    /// aborts the run before any finding is produced.
    #[error("schema field '{field}' not found in dataset")]
    UnknownField { field: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid format pattern for field '{field}': {message}")]
    InvalidPattern { field: String, message: String },
    #[error("dataset contains no records")]
    EmptyDataset,
    #[error("schema contains no fields")]
    EmptySchema,
}

pub type Result<T> = std::result::Result<T, AuditError>;
