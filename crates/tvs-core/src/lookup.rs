//! Seams to external station datasets and stored pattern data.

use std::collections::{BTreeMap, BTreeSet};

use tvs_model::{AntPattern, ExtDbKey, ExtRecord, MatrixPattern, RecordId, SourceKey};

use crate::LookupError;

/// Batched record lookup against external station datasets.
///
/// Each call is a blocking query; ids absent from the returned map were not
/// found. An `Err` means the query itself failed.
pub trait ExtDbLookup {
    fn find_records(
        &mut self,
        ext_db_key: ExtDbKey,
        record_ids: &BTreeSet<RecordId>,
    ) -> Result<BTreeMap<RecordId, ExtRecord>, LookupError>;
}

/// Source of pattern points for sources whose patterns were not loaded with
/// the source row.
pub trait PatternStore {
    fn horizontal_pattern(&mut self, key: SourceKey) -> Result<Option<AntPattern>, LookupError>;
    fn vertical_pattern(&mut self, key: SourceKey) -> Result<Option<AntPattern>, LookupError>;
    fn matrix_pattern(&mut self, key: SourceKey) -> Result<Option<MatrixPattern>, LookupError>;
}

/// Reachable by-reference sources of one dataset, used to seed import caches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedSourceIndex {
    /// Record id to the shared source for that record.
    pub sources: BTreeMap<RecordId, SourceKey>,
    /// `(channel, record id)` to the shared replication of that record.
    pub replications: BTreeMap<(i32, RecordId), SourceKey>,
}
