use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown service code: {0}")]
    UnknownService(String),
    #[error("unknown country code: {0}")]
    UnknownCountry(String),
    #[error("invalid record id: {0:?}")]
    InvalidRecordId(String),
    #[error("{kind} pattern has {found} points, at least {required} required")]
    TooFewPoints {
        kind: &'static str,
        found: usize,
        required: usize,
    },
    #[error("{kind} pattern angle {angle} is out of range {min} to {max}")]
    AngleOutOfRange {
        kind: &'static str,
        angle: f64,
        min: f64,
        max: f64,
    },
    #[error("{kind} pattern field value {field} is out of range {min} to {max}")]
    FieldOutOfRange {
        kind: &'static str,
        field: f64,
        min: f64,
        max: f64,
    },
    #[error("{kind} pattern angles are out of order or duplicated at {angle}")]
    AnglesOutOfOrder { kind: &'static str, angle: f64 },
    #[error("parameter {key} value index {index} is out of range, at most {max} values")]
    ParameterIndex { key: i32, index: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
