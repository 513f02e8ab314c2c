use thiserror::Error;

use tvs_core::{EditError, LookupError};
use tvs_model::{ModelError, ScenarioKey};

/// Fatal import and export errors. Soft-skipped records are reported through
/// the parser's `ErrorLog` instead.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("Not a study document: root element is <{0}>")]
    NotStudyDocument(String),

    #[error("Unsupported document version {version}: {reason}")]
    UnsupportedVersion { version: i64, reason: &'static str },

    #[error("Unexpected <{element}> inside <{parent}>")]
    UnexpectedElement { element: String, parent: String },

    #[error("Missing required attribute {attribute} in <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Bad value '{value}' for attribute {attribute} in <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("Missing required <{child}> element in <{element}>")]
    MissingElement {
        element: &'static str,
        child: &'static str,
    },

    #[error("Bad pattern data in <{element}>: {message}")]
    Pattern {
        element: &'static str,
        message: String,
    },

    #[error("Invalid record in <{element}>: {source}")]
    Model {
        element: &'static str,
        #[source]
        source: ModelError,
    },

    #[error("Scenario {0} is not a top-level scenario of the study")]
    UnknownScenario(ScenarioKey),

    #[error("Station data lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XmlError>;
