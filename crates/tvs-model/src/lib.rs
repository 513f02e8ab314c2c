//! Persisted value types for broadcast interference studies.
//!
//! Everything here is an immutable value: station data, antenna patterns,
//! saved `Source` and `Scenario` snapshots, and external dataset records.
//! The mutable edit model lives in `tvs-core`.

pub mod enums;
pub mod error;
pub mod ext;
pub mod ids;
pub mod log;
pub mod pattern;
pub mod scenario;
pub mod service;
pub mod source;
pub mod station;

pub use enums::{
    Country, ExtDbType, FM_CHANNEL_MAX, FM_CHANNEL_MIN, RecordType, ScenarioType, StudyType,
    TV_CHANNEL_MAX, TV_CHANNEL_MIN,
};
pub use error::{ModelError, Result};
pub use ext::{ExtDbInfo, ExtRecord};
pub use ids::{ExtDbKey, RecordId, ScenarioKey, SourceKey};
pub use log::{ErrorLog, LogEntry, Severity};
pub use pattern::{
    AntPattern, FIELD_MAX, FIELD_MIN, MatrixPattern, MatrixSlice, PATTERN_REQUIRED_POINTS,
    PatternKind, PatternPoint,
};
pub use scenario::{MAX_PARAMETER_VALUES, Parameter, Scenario, ScenarioSource};
pub use service::Service;
pub use source::{Provenance, Source};
pub use station::{HorizontalPatternInfo, MatrixPatternInfo, StationData, VerticalPatternInfo};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_counts() {
        let mut log = ErrorLog::new();
        log.report_error("no desired station");
        log.report_warning("record 123 not found");
        log.report_message("imported 2 scenarios");
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);
        assert!(log.has_errors());
        assert_eq!(log.last_error(), Some("no desired station"));
    }

    #[test]
    fn provenance_serializes_tagged() {
        let provenance = Provenance::External {
            ext_db_key: ExtDbKey::new(4),
            record_id: RecordId::new("1234").expect("record id"),
        };
        let json = serde_json::to_string(&provenance).expect("serialize provenance");
        assert_eq!(
            json,
            r#"{"kind":"external","ext_db_key":4,"record_id":"1234"}"#
        );
        let round: Provenance = serde_json::from_str(&json).expect("deserialize provenance");
        assert_eq!(round, provenance);
    }
}
