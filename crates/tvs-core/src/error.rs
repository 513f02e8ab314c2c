use thiserror::Error;

use tvs_model::{ExtDbKey, ModelError, SourceKey};

/// Errors from edit-model operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditError {
    #[error("source {0} is locked and cannot be edited")]
    Locked(SourceKey),
    #[error("source {0} is not in the study")]
    MissingSource(SourceKey),
    #[error("source {key} is a replication of {original}, which is not in the study")]
    MissingOriginal { key: SourceKey, original: SourceKey },
    #[error("source {0} pattern data has not been loaded")]
    PatternsNotLoaded(SourceKey),
    #[error("source {key} cannot be replicated: {reason}")]
    NotReplicable { key: SourceKey, reason: String },
    #[error("service {service} is not a {expected} service")]
    WrongRecordType { service: String, expected: String },
    #[error("scenario {0} is a child scenario and cannot have children")]
    NestedChild(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors from external lookups and lazy pattern loading.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LookupError {
    #[error("station data {ext_db_key} is not available: {message}")]
    Unavailable { ext_db_key: ExtDbKey, message: String },
    #[error("missing data: {0}")]
    MissingData(String),
    #[error("lookup failed: {0}")]
    Backend(String),
}

/// Errors from the save contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistError {
    /// Native database message wrapped in the fixed prefix.
    #[error("Database error: {0}")]
    Sql(String),
    #[error("study data is not valid: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, EditError>;
