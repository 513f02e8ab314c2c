//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;
use tvs_core::{LookupError, PersistError};
use tvs_model::{ExtDbKey, ModelError};

/// Storage operation error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened.
    #[error("Failed to open database: {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// No pooled connection could be checked out.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A statement or query failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row does not describe a valid value.
    #[error("Invalid row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    /// A stored station failed model validation.
    #[error("Invalid station in {table}: {source}")]
    Model {
        table: &'static str,
        #[source]
        source: ModelError,
    },

    /// No dataset with this key, or it was deleted.
    #[error("Station data {0} does not exist")]
    UnknownExtDb(ExtDbKey),

    /// Stored pattern points could not be read back.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Saving the study failed part way.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl StoreError {
    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Open { .. } => {
                Some("Check that the file exists and you have permission to open it.".into())
            }
            Self::Corrupt { .. } | Self::Model { .. } => {
                Some("The database may have been modified by another tool.".into())
            }
            Self::UnknownExtDb(_) => Some("Run `tvstudy ext-dbs` to list available station data.".into()),
            Self::Pool(_) => Some("Check that the station database file is readable.".into()),
            Self::Sqlite(_) | Self::Persist(_) | Self::Lookup(_) => None,
        }
    }
}

impl From<StoreError> for LookupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownExtDb(ext_db_key) => LookupError::Unavailable {
                ext_db_key,
                message: "not found or deleted".to_string(),
            },
            StoreError::Corrupt { .. } | StoreError::Model { .. } => {
                LookupError::MissingData(err.to_string())
            }
            StoreError::Lookup(err) => err,
            other => LookupError::Backend(other.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
